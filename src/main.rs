//! # profilekit command line
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load configuration (file, then PROFILEKIT_* overrides)
//!   ├─> Initialise logging (console + rolling files)
//!   ├─> Install the Ctrl-C handler
//!   └─> Run the subcommand
//! ```
//!
//! ```bash
//! profilekit detect data.csv
//! profilekit run data.csv --engines ydata,sweetviz
//! profilekit config init
//! ```
//!
//! Exit status is 1 when any engine failed or the command errored.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use profilekit::config::ProfilerConfig;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();

    let config = ProfilerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Guards flush the file writers on drop; keep them until exit.
    let _guards = profilekit::logging::init(&config.logging).context("Failed to initialise logging")?;
    tracing::debug!("profilekit {} starting", env!("CARGO_PKG_VERSION"));
    for applied in config.env_overrides() {
        tracing::info!("Applied environment override: {applied}");
    }

    // Children share the terminal's process group and get the signal too; the
    // flag only stops the queue after the current engine returns.
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    cli::run_command(cli.command, &config, interrupt)
}
