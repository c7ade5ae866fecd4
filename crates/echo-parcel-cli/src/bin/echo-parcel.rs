// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CLI entry point for parcel tooling.

use anyhow::Result;
use echo_parcel_cli::entrypoint;

fn main() -> Result<()> {
    entrypoint()
}
