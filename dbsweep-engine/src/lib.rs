//! dbsweep Engine - Entity Dispatch
//!
//! Runs database-set processes: resolves the entity list, routes check
//! output to report sinks, and evaluates rule checks per entity on a
//! bounded worker pool.

pub mod dbset;
pub mod pool;
pub mod process;
pub mod routing;
pub mod runner;
pub mod task;

pub use dbset::{DbSetProcess, CHECKS_SKIPPED, CONTEXT_GUIDANCE};
pub use pool::{PoolSummary, TaskSummary, WorkerPool};
pub use process::{Configurable, RunContext, RunOutcome, Runnable, TestReport};
pub use routing::{CheckSet, RoutedCheck, RoutedSkipCheck};
pub use runner::ShellCheckRunner;
pub use task::{CheckRunner, EntityTask, ItemListing};
