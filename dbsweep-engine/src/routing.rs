//! Checks bound to their resolved output sinks.

use dbsweep_core::{CommandCheck, OutputSink, SkipCommandCheck};

/// A rule check with its success and error sinks resolved.
#[derive(Debug, Clone)]
pub struct RoutedCheck {
    pub check: CommandCheck,
    pub success: OutputSink,
    pub error: OutputSink,
}

/// The skip check, routed to the process default sinks.
#[derive(Debug, Clone)]
pub struct RoutedSkipCheck {
    pub check: SkipCommandCheck,
    pub success: OutputSink,
    pub error: OutputSink,
}

/// What every entity task of one process evaluates.
#[derive(Debug, Clone)]
pub enum CheckSet {
    Rules(Vec<RoutedCheck>),
    /// No rule checks; records a skipped outcome per target when present.
    Skip(Option<RoutedSkipCheck>),
}

impl CheckSet {
    pub fn has_rules(&self) -> bool {
        matches!(self, CheckSet::Rules(checks) if !checks.is_empty())
    }

    /// Counter keys tasks will write to.
    pub fn counter_keys(&self) -> Vec<&str> {
        match self {
            CheckSet::Rules(checks) => checks.iter().map(|r| r.check.counter.as_str()).collect(),
            CheckSet::Skip(Some(skip)) => vec![skip.check.counter.as_str()],
            CheckSet::Skip(None) => Vec::new(),
        }
    }
}
