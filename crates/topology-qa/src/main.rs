//! Topology QA command line tool
//!
//! Runs one check per invocation over WKT feature files and reports a
//! summary of the indicators found. See `topology-qa --help`.

mod cli;
mod error;
mod io;
mod logging;
mod run;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let common = cli.command.common();
    logging::setup_logging(common.verbose);
    topology_qa_lib::geometry::quiet_kernel_panics();
    tracing::info!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        cli.command.name()
    );

    let summary = match run::run(&cli.command) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if common.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                tracing::error!("{}", error::CliError::from(e));
                return ExitCode::FAILURE;
            }
        }
    } else {
        summary.log();
    }
    ExitCode::SUCCESS
}
