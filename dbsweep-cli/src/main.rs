//! dbsweep entry point.

use dbsweep_cli::app::{self, RunSummary};
use dbsweep_cli::args::{CliArgs, USAGE};
use dbsweep_cli::config::SweepConfig;
use dbsweep_cli::error::CliError;
use dbsweep_cli::telemetry;
use dbsweep_core::SweepError;
use dbsweep_engine::{RunOutcome, CONTEXT_GUIDANCE};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("{}", e);
    }

    let args = match CliArgs::from_env() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let config = match SweepConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dbsweep: {}", e);
            return ExitCode::from(2);
        }
    };

    match app::run(config).await {
        Ok(summary) => {
            report(&summary);
            if summary.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(CliError::Sweep(e @ SweepError::Context(_))) => {
            eprintln!("{}", CONTEXT_GUIDANCE);
            eprintln!("dbsweep: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("dbsweep: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn report(summary: &RunSummary) {
    match &summary.outcome {
        RunOutcome::Tested(report) => {
            println!(
                "Query test: listing {}, items {}",
                status(report.listing_ok),
                report.items_ok.map(status).unwrap_or("not configured")
            );
        }
        RunOutcome::Dispatched { entities } => {
            println!(
                "Processed {} entities ({} completed, {} failed)",
                entities, summary.pool.completed, summary.pool.failed
            );
        }
    }
    for counters in &summary.counters {
        for (check, counts) in &counters.checks {
            println!(
                "\t{}.{}: pass={} fail={} error={} skipped={}",
                counters.group, check, counts.pass, counts.fail, counts.error, counts.skipped
            );
        }
    }
    if !summary.output_details.is_empty() {
        println!("Output:");
        for line in &summary.output_details {
            println!("{}", line);
        }
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAILED"
    }
}
