//! Harness entry point.

use std::process::ExitCode;

use clap::Parser;
use harness::cli::Cli;
use harness::{Config, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    // 1. Initialize tracing
    telemetry::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = match telemetry::install_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    // 3. Run the command and print its report
    let outcome = match harness::run(cli.command, cli.offline, &config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match serde_json::to_string_pretty(&outcome.output) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    }

    if cli.metrics {
        if let Some(handle) = &metrics_handle {
            println!("{}", handle.render());
        }
    }

    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
