//! skye CLI binary entry point.
//!
//! Parses arguments, prunes old log files, installs tracing and dispatches
//! to the selected subcommand via [`Cli::run`].

mod cli;
mod console;
mod logging;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (project, log_name) = cli.log_context();

    // Before tracing starts; failures are only printed.
    logging::cleanup_old_logs(&project);

    let _guard = logging::init_tracing(&project, log_name)?;

    cli.run().await
}
