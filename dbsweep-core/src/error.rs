//! Error types for dbsweep operations

use thiserror::Error;

/// Query source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query definition not found: {template}")]
    TemplateNotFound { template: String },

    #[error("Query {template} failed: {reason}")]
    Execution { template: String, reason: String },

    #[error("Unknown parameter {parameter} for query {template}")]
    UnknownParameter { template: String, parameter: String },

    #[error("Parameter {parameter} for query {template} has no value")]
    MissingParameter { template: String, parameter: String },

    #[error("Connection pool error: {reason}")]
    Pool { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Column not found in result: {column}")]
    UnknownColumn { column: String },

    #[error("Row {index} out of range ({count} rows)")]
    RowOutOfRange { index: usize, count: usize },

    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Counter {key} was not registered in group {group}")]
    UnknownCounter { group: String, key: String },
}

/// Output sink errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to write to {sink}: {reason}")]
    Write { sink: String, reason: String },

    #[error("Sink {sink} lock poisoned")]
    LockPoisoned { sink: String },
}

/// Per-entity resource context errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Failed to initialize context for {entity}: {reason}")]
    InitFailed { entity: String, reason: String },
}

/// Failure converting a single field during table construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Column {column} could not be decoded: {reason}")]
    Decode { column: String, reason: String },

    #[error("Column {column} declared {expected} but produced {found}")]
    KindMismatch {
        column: String,
        expected: String,
        found: String,
    },
}

/// Check evaluation errors raised by a check runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("Check {check} could not run for {entity}: {reason}")]
    Execution {
        check: String,
        entity: String,
        reason: String,
    },
}

/// Master error type for all dbsweep errors.
#[derive(Debug, Clone, Error)]
pub enum SweepError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Check error: {0}")]
    Check(#[from] CheckError),

    #[error("Task error: {reason}")]
    Task { reason: String },
}

impl SweepError {
    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SweepError::Query(_) | SweepError::Context(_))
    }
}

/// Result type alias for dbsweep operations.
pub type SweepResult<T> = Result<T, SweepError>;

// =============================================================================
// TESTS
// =============================================================================
