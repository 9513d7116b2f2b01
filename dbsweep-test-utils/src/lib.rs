//! dbsweep Test Utilities
//!
//! Shared test infrastructure for the dbsweep workspace:
//! - Check runners with scripted or gated results
//! - Proptest generators for entity names, checks and tables
//! - Fixtures for common sweep setups

// Re-export mocks from their source crate
pub use dbsweep_storage::{MockContextProvider, MockQuerySource, NoopContextProvider};

pub use dbsweep_core::{
    CheckError, CheckOutcome, CheckReport, CommandCheck, DbSetConfig, OutputDirectory,
    ResultTable, SkipCommandCheck, StaticRows, SweepError, SweepResult, TaskState,
};
pub use dbsweep_engine::{CheckRunner, RunContext, WorkerPool};

use async_trait::async_trait;
use dbsweep_storage::ResourceContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

// ============================================================================
// CHECK RUNNERS
// ============================================================================

/// What a [`ScriptedCheckRunner`] answers for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Pass,
    Fail,
    Error,
}

/// One recorded evaluation: check counter, entity, item fields.
pub type Evaluation = (String, String, Vec<String>);

/// Check runner answering from a script keyed by (check counter, entity).
///
/// Unscripted evaluations pass. Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCheckRunner {
    script: HashMap<(String, String), Scripted>,
    calls: Arc<Mutex<Vec<Evaluation>>>,
}

impl ScriptedCheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: &str, entity: &str, result: Scripted) -> Self {
        self.script
            .insert((check.to_string(), entity.to_string()), result);
        self
    }

    pub fn calls(&self) -> Vec<Evaluation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CheckRunner for ScriptedCheckRunner {
    async fn evaluate(
        &self,
        check: &CommandCheck,
        context: &dyn ResourceContext,
        fields: &[String],
    ) -> Result<CheckReport, CheckError> {
        let entity = context.entity().to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((check.counter.clone(), entity.clone(), fields.to_vec()));
        }
        let key = (check.counter.clone(), entity.clone());
        match self.script.get(&key).copied().unwrap_or(Scripted::Pass) {
            Scripted::Pass => Ok(CheckReport::passed("ok")),
            Scripted::Fail => Ok(CheckReport::failed("failed")),
            Scripted::Error => Err(CheckError::Execution {
                check: check.counter.clone(),
                entity,
                reason: "scripted error".to_string(),
            }),
        }
    }
}

/// Check runner that blocks every evaluation until [`open`](Self::open).
#[derive(Debug)]
pub struct GatedCheckRunner {
    gate: watch::Sender<bool>,
}

impl GatedCheckRunner {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self { gate }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

impl Default for GatedCheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckRunner for GatedCheckRunner {
    async fn evaluate(
        &self,
        check: &CommandCheck,
        context: &dyn ResourceContext,
        _fields: &[String],
    ) -> Result<CheckReport, CheckError> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| CheckError::Execution {
                check: check.counter.clone(),
                entity: context.entity().to_string(),
                reason: e.to_string(),
            })?;
        Ok(CheckReport::passed("released"))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for dbsweep types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a database-like entity name.
    pub fn arb_entity_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Generate a list of distinct entity names, in arbitrary order.
    pub fn arb_entity_names(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set(arb_entity_name(), 0..=max)
            .prop_map(|set| set.into_iter().collect())
    }

    /// Generate a rule check with random polarity, routing flags and
    /// display lines.
    pub fn arb_command_check() -> impl Strategy<Value = CommandCheck> {
        (
            "[a-z]{3,10}",
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            proptest::option::of("-- [A-Za-z ]{1,20}"),
            proptest::option::of("[A-Za-z ]{1,30}"),
            proptest::option::of("\\| [a-z]{1,8} \\| [a-z]{1,8} \\|"),
        )
            .prop_map(|(counter, invert, on_success, on_error, title, note, header)| {
                let mut check = CommandCheck::new(counter);
                check.invert_check = invert;
                check.process_on_success = on_success;
                check.process_on_error = on_error;
                check.title = title;
                check.note = note;
                check.header = header;
                check
            })
    }

    /// Generate a single-column text table of entity names.
    pub fn arb_names_table(max: usize) -> impl Strategy<Value = ResultTable> {
        prop::collection::vec(arb_entity_name(), 0..=max)
            .prop_map(|names| fixtures::names_table(&names))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common setups for engine tests.

    use super::*;

    /// Template id used by [`listing_source`].
    pub const DB_LISTING: &str = "db_listing";
    /// Template id for item listings.
    pub const PATH_LISTING: &str = "path_listing";

    /// One `name` column holding `names`.
    pub fn names_table<S: AsRef<str>>(names: &[S]) -> ResultTable {
        let rows: Vec<Vec<&str>> = names.iter().map(|n| vec![n.as_ref()]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        ResultTable::build(&StaticRows::text(&["name"], &rows))
    }

    /// A text table with the given header and rows.
    pub fn text_table(header: &[&str], rows: &[&[&str]]) -> ResultTable {
        ResultTable::build(&StaticRows::text(header, rows))
    }

    /// A query source whose listing query returns `names`.
    pub fn listing_source(names: &[&str]) -> MockQuerySource {
        MockQuerySource::new().with_table(DB_LISTING, names_table(names))
    }

    /// A process config listing entities through [`DB_LISTING`].
    pub fn dbset_config(name: &str) -> DbSetConfig {
        DbSetConfig::new(name, DB_LISTING)
    }

    /// A rule check writing `{entity}` on failure.
    pub fn rule_check(counter: &str) -> CommandCheck {
        let mut check = CommandCheck::new(counter);
        check.title = Some(format!("-- {}", counter));
        check.on_error = Some("{entity}".to_string());
        check
    }

    /// A run context with in-memory sinks and a pool of four workers.
    pub fn memory_run_context(
        source: MockQuerySource,
        contexts: MockContextProvider,
        runner: Arc<dyn CheckRunner>,
    ) -> RunContext {
        RunContext::new(
            Arc::new(source),
            Arc::new(contexts),
            runner,
            Arc::new(WorkerPool::new(4)),
            Arc::new(OutputDirectory::in_memory()),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
