//! Shared run counters.
//!
//! A [`CounterGroup`] is owned by one process and shared with every task it
//! spawns. All increments are atomic adds, so totals do not depend on the
//! order in which tasks finish.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::check::CheckOutcome;
use crate::error::ConfigError;

/// Lifecycle states a task moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Constructed,
    Started,
    Completed,
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Constructed,
        TaskState::Started,
        TaskState::Completed,
        TaskState::Failed,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct CheckTally {
    pass: AtomicU64,
    fail: AtomicU64,
    error: AtomicU64,
    skipped: AtomicU64,
}

impl CheckTally {
    fn bucket(&self, outcome: CheckOutcome) -> &AtomicU64 {
        match outcome {
            CheckOutcome::Pass => &self.pass,
            CheckOutcome::Fail => &self.fail,
            CheckOutcome::Error => &self.error,
            CheckOutcome::Skipped => &self.skipped,
        }
    }

    fn snapshot(&self) -> CheckCounts {
        CheckCounts {
            pass: self.pass.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Per-check outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub pass: u64,
    pub fail: u64,
    pub error: u64,
    pub skipped: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.pass + self.fail + self.error + self.skipped
    }
}

/// Named counters for one process.
#[derive(Debug)]
pub struct CounterGroup {
    name: String,
    task_states: [AtomicU64; 4],
    checks: RwLock<BTreeMap<String, Arc<CheckTally>>>,
}

impl CounterGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_states: Default::default(),
            checks: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `amount` to a lifecycle state and return the new total.
    pub fn add_and_get_task_state(&self, state: TaskState, amount: u64) -> u64 {
        self.task_states[state.slot()].fetch_add(amount, Ordering::SeqCst) + amount
    }

    pub fn task_state(&self, state: TaskState) -> u64 {
        self.task_states[state.slot()].load(Ordering::SeqCst)
    }

    /// Declare a check counter. Registering twice is a no-op.
    pub fn register(&self, key: &str) {
        let mut checks = match self.checks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        checks.entry(key.to_string()).or_default();
    }

    /// Count `amount` passes against a registered check counter.
    pub fn increment(&self, key: &str, amount: u64) -> Result<u64, ConfigError> {
        let tally = self.tally(key)?;
        Ok(tally.pass.fetch_add(amount, Ordering::Relaxed) + amount)
    }

    /// Count one outcome against a registered check counter.
    pub fn record(&self, key: &str, outcome: CheckOutcome) -> Result<(), ConfigError> {
        self.tally(key)?.bucket(outcome).fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn check_counts(&self, key: &str) -> Result<CheckCounts, ConfigError> {
        Ok(self.tally(key)?.snapshot())
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let task_states = TaskState::ALL
            .iter()
            .map(|state| (*state, self.task_state(*state)))
            .collect();
        let checks = match self.checks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
        .iter()
        .map(|(key, tally)| (key.clone(), tally.snapshot()))
        .collect();

        CounterSnapshot {
            group: self.name.clone(),
            task_states,
            checks,
        }
    }

    fn tally(&self, key: &str) -> Result<Arc<CheckTally>, ConfigError> {
        let checks = match self.checks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        checks.get(key).cloned().ok_or_else(|| ConfigError::UnknownCounter {
            group: self.name.clone(),
            key: key.to_string(),
        })
    }
}

/// Point-in-time copy of a [`CounterGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub group: String,
    pub task_states: BTreeMap<TaskState, u64>,
    pub checks: BTreeMap<String, CheckCounts>,
}

/// Registry of counter groups for a whole run.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    groups: RwLock<BTreeMap<String, Arc<CounterGroup>>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the group with `name`, creating it on first use.
    pub fn group(&self, name: &str) -> Arc<CounterGroup> {
        let mut groups = match self.groups.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        groups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CounterGroup::new(name)))
            .clone()
    }

    pub fn register(&self, group: &str, key: &str) {
        self.group(group).register(key);
    }

    pub fn increment(&self, group: &str, key: &str, amount: u64) -> Result<u64, ConfigError> {
        self.existing(group, key)?.increment(key, amount)
    }

    pub fn snapshots(&self) -> Vec<CounterSnapshot> {
        match self.groups.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
        .values()
        .map(|g| g.snapshot())
        .collect()
    }

    fn existing(&self, group: &str, key: &str) -> Result<Arc<CounterGroup>, ConfigError> {
        let groups = match self.groups.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        groups.get(group).cloned().ok_or_else(|| ConfigError::UnknownCounter {
            group: group.to_string(),
            key: key.to_string(),
        })
    }
}
