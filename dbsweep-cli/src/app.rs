//! Wiring from a loaded run file to a finished sweep.

use dbsweep_core::{CounterSnapshot, OutputDirectory, QueryCatalog, SweepResult};
use dbsweep_engine::{
    CheckSet, Configurable, DbSetProcess, PoolSummary, RunContext, RunOutcome, Runnable,
    ShellCheckRunner, WorkerPool,
};
use dbsweep_storage::{NoopContextProvider, PgQuerySource};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SweepConfig;
use crate::error::CliError;

/// Everything a finished run reports back to `main`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub pool: PoolSummary,
    pub counters: Vec<CounterSnapshot>,
    pub output_details: Vec<String>,
}

impl RunSummary {
    /// Whether the run should exit successfully.
    pub fn succeeded(&self) -> bool {
        let tested_ok = match &self.outcome {
            RunOutcome::Tested(report) => report.passed(),
            RunOutcome::Dispatched { .. } => true,
        };
        tested_ok && self.pool.is_clean()
    }
}

pub async fn run(config: SweepConfig) -> Result<RunSummary, CliError> {
    std::fs::create_dir_all(&config.output_directory)?;

    let catalog = Arc::new(QueryCatalog::new(config.queries.iter().cloned()));
    let source = PgQuerySource::from_config(&config.database, catalog)?;

    let mut runner = ShellCheckRunner::new();
    if let Some(secs) = config.check_timeout_secs {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let ctx = RunContext::new(
        Arc::new(source),
        Arc::new(NoopContextProvider),
        Arc::new(runner),
        Arc::new(WorkerPool::new(config.parallelism)),
        Arc::new(OutputDirectory::new(&config.output_directory)),
    );

    let mut process = DbSetProcess::new(config.dbset.clone())?;
    tracing::info!(
        run_id = %ctx.run_id,
        process = %serde_json::to_string(&process.config().public_view()).unwrap_or_default(),
        "Starting sweep"
    );
    process.init(&ctx)?;

    let outcome = process.run().await;
    // Drain the pool on both paths so aborted tasks are reaped before exit.
    let pool = ctx.pool.join_all().await;
    flush_sinks(&process)?;
    let outcome = outcome?;

    tracing::info!(
        completed = pool.completed,
        failed = pool.failed,
        cancelled = pool.cancelled,
        panicked = pool.panicked,
        "Sweep finished"
    );

    Ok(RunSummary {
        outcome,
        pool,
        counters: ctx.counters.snapshots(),
        output_details: process.output_details(),
    })
}

fn flush_sinks(process: &DbSetProcess) -> SweepResult<()> {
    for sink in [process.success_sink(), process.error_sink()].into_iter().flatten() {
        sink.flush()?;
    }
    if let Some(CheckSet::Rules(checks)) = process.checks() {
        for routed in checks {
            routed.success.flush()?;
            routed.error.flush()?;
        }
    }
    Ok(())
}
