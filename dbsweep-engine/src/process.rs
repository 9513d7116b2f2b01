//! Process lifecycle shared by every sweep process.

use async_trait::async_trait;
use dbsweep_core::{CounterRegistry, OutputDirectory, SweepResult};
use dbsweep_storage::{ContextProvider, QuerySource};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::pool::WorkerPool;
use crate::task::CheckRunner;

/// Everything a process borrows from the run that hosts it.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub source: Arc<dyn QuerySource>,
    pub contexts: Arc<dyn ContextProvider>,
    pub runner: Arc<dyn CheckRunner>,
    pub counters: Arc<CounterRegistry>,
    pub pool: Arc<WorkerPool>,
    pub output: Arc<OutputDirectory>,
}

impl RunContext {
    pub fn new(
        source: Arc<dyn QuerySource>,
        contexts: Arc<dyn ContextProvider>,
        runner: Arc<dyn CheckRunner>,
        pool: Arc<WorkerPool>,
        output: Arc<OutputDirectory>,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            source,
            contexts,
            runner,
            counters: Arc::new(CounterRegistry::new()),
            pool,
            output,
        }
    }
}

/// Result of running a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Tasks were submitted for this many entities.
    Dispatched { entities: usize },
    /// Queries were tested; nothing was dispatched.
    Tested(TestReport),
}

/// Per-query result of a query test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub listing_ok: bool,
    /// `None` when no item listing query is configured.
    pub items_ok: Option<bool>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.listing_ok && self.items_ok.unwrap_or(true)
    }
}

/// A process that binds itself to a run before running.
pub trait Configurable {
    /// Open sinks, register counters and resolve check routing.
    fn init(&mut self, ctx: &RunContext) -> SweepResult<()>;
}

#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self) -> SweepResult<RunOutcome>;
}
