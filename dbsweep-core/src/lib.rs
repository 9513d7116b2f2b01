//! dbsweep Core - Data Types
//!
//! Shared building blocks for database-set sweeps: typed result tables,
//! rule check definitions, run counters, report sinks, query templates and
//! per-process configuration. No I/O beyond writing report files.

pub mod check;
pub mod config;
pub mod counter;
pub mod error;
pub mod query;
pub mod sink;
pub mod table;
pub mod value;

pub use check::{
    expand_template, expand_template_with, CheckOutcome, CheckReport, CommandCheck,
    SkipCommandCheck,
};
pub use config::{DbSetConfig, DbSetView};
pub use counter::{CheckCounts, CounterGroup, CounterRegistry, CounterSnapshot, TaskState};
pub use error::{
    CheckError, ConfigError, ContextError, ConversionError, QueryError, SinkError, SweepError,
    SweepResult,
};
pub use query::{
    BoundQuery, ParameterDef, ParameterKind, ParameterOverrides, ParameterValue, QueryCatalog,
    QueryDefinition,
};
pub use sink::{OutputDirectory, OutputSink};
pub use table::{full_match, ResultTable, StaticRows, TypedRows};
pub use value::{render, ColumnKind, ColumnMeta, FieldValue};
