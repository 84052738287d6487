#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Binary entrypoint that wires configuration, telemetry, the loopback engine
//! and the session manager together.

use clap::Parser;
use torrentflow_app::{AppResult, Cli, run_app};

/// Parses arguments and runs until Ctrl-C.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app(&Cli::parse()).await
}
