//! Command-line arguments for the `torrentflow` binary.

use std::path::PathBuf;

use clap::Parser;

const MAGNET_PREFIX: &str = "magnet:";
const DEFAULT_SIMULATED_RATE: u64 = 512 * 1024;

/// Run the transfer session manager over the in-memory loopback engine.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "torrentflow",
    version,
    about = "Manage concurrent peer-to-peer transfers and log their progress"
)]
pub struct Cli {
    /// Magnet URIs or `.torrent` files to download.
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<String>,
    /// Local file to publish; repeat to seed several files as one transfer.
    #[arg(long = "seed", value_name = "PATH")]
    pub seed: Vec<PathBuf>,
    /// Override the configured download directory.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// Bytes per second each simulated transfer gains while peers are
    /// connected.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_SIMULATED_RATE)]
    pub simulated_rate: u64,
    /// Stop once every transfer has finished downloading.
    #[arg(long)]
    pub exit_when_done: bool,
    /// Print the Prometheus exposition to stdout before exiting.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Positional argument resolved to the kind of transfer it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `magnet:` URI.
    Magnet(String),
    /// Path to a descriptor file.
    Descriptor(PathBuf),
}

impl Source {
    /// Classify a positional argument. Anything that is not a magnet URI is
    /// treated as a descriptor path.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed
            .get(..MAGNET_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(MAGNET_PREFIX))
        {
            Self::Magnet(trimmed.to_string())
        } else {
            Self::Descriptor(PathBuf::from(raw))
        }
    }
}

impl Cli {
    /// Positional sources in the order given.
    #[must_use]
    pub fn resolved_sources(&self) -> Vec<Source> {
        self.sources.iter().map(|raw| Source::classify(raw)).collect()
    }
}
