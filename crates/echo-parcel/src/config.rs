// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Caller-supplied parcel configuration.

use serde::{Deserialize, Serialize};

/// Default cap on the number of entries accepted from a legacy stream.
pub const DEFAULT_MAX_LEGACY_ENTRIES: u32 = 1 << 20;

/// Which encoding `unmarshal` expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Legacy stream when the input parses as a non-empty legacy stream,
    /// native otherwise. Native data whose first word equals the legacy
    /// magic may still be misread; prefer an explicit format.
    Detect,
    /// Raw word-aligned parcel bytes, as produced by `marshal`.
    #[default]
    Native,
    /// Legacy tag-length-value stream.
    Legacy,
}

/// Behavior knobs for a [`crate::Parcel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcelConfig {
    /// Encoding assumed by [`crate::Parcel::unmarshal`].
    pub wire_format: WireFormat,
    /// Legacy streams declaring more entries than this are rejected.
    pub max_legacy_entries: u32,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::Native,
            max_legacy_entries: DEFAULT_MAX_LEGACY_ENTRIES,
        }
    }
}

impl ParcelConfig {
    /// Parse a JSON config blob; missing fields take their defaults.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Same config with a different wire format.
    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }
}
