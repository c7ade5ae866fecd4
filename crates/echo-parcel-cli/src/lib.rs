// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Developer tooling for parcel blobs.
//!
//! `inspect` prints the ledger layout of a marshalled or legacy blob and
//! `convert` rewrites a legacy stream as native marshalled bytes.

mod report;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use echo_parcel::{legacy, Parcel, ParcelConfig, WireFormat};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub use report::Report;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "echo-parcel")]
#[command(about = "Inspect and convert parcel blobs")]
pub struct Cli {
    /// JSON parcel config (`wire_format`, `max_legacy_entries`)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print size, capacity and ledger layout of a blob
    Inspect {
        /// Path to the blob
        file: PathBuf,
        /// Wire format; defaults to the config's, which is native unless set
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a legacy stream as native marshalled bytes
    Convert {
        /// Path to the legacy stream
        input: PathBuf,
        /// Where to write the native bytes
        #[arg(long)]
        out: PathBuf,
    },
}

/// `--format` values.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Legacy when the blob parses as a non-empty legacy stream, native otherwise.
    Detect,
    /// Raw marshalled words.
    Native,
    /// Legacy tag-length-value stream.
    Legacy,
}

impl From<FormatArg> for WireFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Detect => Self::Detect,
            FormatArg::Native => Self::Native,
            FormatArg::Legacy => Self::Legacy,
        }
    }
}

/// Parse arguments, run the subcommand and print its output.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let config = load_config(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Inspect { file, format, json } => {
            let format = format.map_or(config.wire_format, WireFormat::from);
            let report = inspect(&file, config.with_wire_format(format))?;
            if json {
                serde_json::to_writer_pretty(&mut stdout, &report)
                    .context("failed to write report")?;
                writeln!(stdout)?;
            } else {
                report.write_table(&mut stdout)?;
            }
        }
        Commands::Convert { input, out } => {
            let written = convert(&input, &out, config)?;
            writeln!(stdout, "wrote {written} bytes to {}", out.display())?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ParcelConfig> {
    let Some(path) = path else {
        return Ok(ParcelConfig::default());
    };
    let bytes =
        fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
    ParcelConfig::from_json_slice(&bytes)
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Unmarshal the blob at `path` and describe its layout.
pub fn inspect(path: &Path, config: ParcelConfig) -> Result<Report> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = legacy::resolve_format(config.wire_format, &bytes, config.max_legacy_entries);
    let mut parcel = Parcel::with_config(config);
    parcel
        .unmarshal_as(format, &bytes, 0, bytes.len())
        .with_context(|| format!("failed to unmarshal {}", path.display()))?;
    debug!(?format, size = parcel.data_size(), "inspected parcel");
    Ok(Report::new(format, &parcel))
}

/// Transcode the legacy stream at `input` and write native bytes to `out`.
/// Returns the number of bytes written.
pub fn convert(input: &Path, out: &Path, config: ParcelConfig) -> Result<usize> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let mut parcel = Parcel::with_config(config);
    parcel
        .unmarshal_as(WireFormat::Legacy, &bytes, 0, bytes.len())
        .with_context(|| format!("failed to decode legacy stream {}", input.display()))?;
    let native = parcel
        .marshal()
        .context("transcoded parcel does not marshal")?;
    fs::write(out, &native).with_context(|| format!("failed to write {}", out.display()))?;
    info!(input = %input.display(), out = %out.display(), size = native.len(), "converted legacy stream");
    Ok(native.len())
}
