//! Per-process configuration.
//!
//! [`DbSetConfig`] is what a run file declares for one database-set process.
//! [`DbSetView`] is the projection that is safe to print or serialize into a
//! report: it leaves out parameter values and anything resolved at runtime.

use serde::{Deserialize, Serialize};

use crate::check::{CommandCheck, SkipCommandCheck};
use crate::error::ConfigError;
use crate::query::ParameterOverrides;

fn default_entity_column() -> String {
    "name".to_string()
}

fn default_entity_parameter() -> String {
    "dbs".to_string()
}

fn default_success_filename() -> String {
    "success.txt".to_string()
}

fn default_error_filename() -> String {
    "error.txt".to_string()
}

/// Configuration for one database-set process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbSetConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default = "default_success_filename")]
    pub success_filename: String,
    #[serde(default = "default_error_filename")]
    pub error_filename: String,

    /// Query id listing the entities to process.
    pub db_listing_query: String,
    #[serde(default)]
    pub db_listing_parameters: ParameterOverrides,
    /// Column of the listing result holding entity names.
    #[serde(default = "default_entity_column")]
    pub entity_column: String,

    /// Query id listing the items checked inside one entity.
    #[serde(default)]
    pub paths_listing_query: Option<String>,
    #[serde(default)]
    pub path_listing_parameters: ParameterOverrides,
    /// Parameter of the item query that receives the entity name.
    #[serde(default = "default_entity_parameter")]
    pub entity_parameter: String,
    /// Item columns handed to checks as `{0}`, `{1}`, ...; empty means all.
    #[serde(default)]
    pub listing_columns: Vec<String>,

    #[serde(default)]
    pub include_regex: Option<String>,
    #[serde(default)]
    pub exclude_regex: Option<String>,
    #[serde(default)]
    pub dbs_override: Vec<String>,

    #[serde(default)]
    pub command_checks: Vec<CommandCheck>,
    #[serde(default)]
    pub skip_command_check: Option<SkipCommandCheck>,

    #[serde(default)]
    pub test_sql: bool,
}

impl DbSetConfig {
    pub fn new(name: impl Into<String>, db_listing_query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            title: None,
            note: None,
            header: None,
            success_filename: default_success_filename(),
            error_filename: default_error_filename(),
            db_listing_query: db_listing_query.into(),
            db_listing_parameters: ParameterOverrides::new(),
            entity_column: default_entity_column(),
            paths_listing_query: None,
            path_listing_parameters: ParameterOverrides::new(),
            entity_parameter: default_entity_parameter(),
            listing_columns: Vec::new(),
            include_regex: None,
            exclude_regex: None,
            dbs_override: Vec::new(),
            command_checks: Vec::new(),
            skip_command_check: None,
            test_sql: false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn has_checks(&self) -> bool {
        !self.command_checks.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "name".to_string(),
            });
        }
        if self.db_listing_query.trim().is_empty() && self.dbs_override.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "db_listing_query".to_string(),
            });
        }
        if self.entity_column.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "entity_column".to_string(),
                value: self.entity_column.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        for pattern in [&self.include_regex, &self.exclude_regex].into_iter().flatten() {
            crate::table::full_match(pattern)?;
        }
        for check in &self.command_checks {
            if check.counter.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "command_checks.counter".to_string(),
                });
            }
        }
        let mut counters: Vec<&str> = self.command_checks.iter().map(|c| c.counter.as_str()).collect();
        counters.sort_unstable();
        if let Some(pair) = counters.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::InvalidValue {
                field: "command_checks.counter".to_string(),
                value: pair[0].to_string(),
                reason: "counter keys must be unique".to_string(),
            });
        }
        Ok(())
    }

    /// The externally visible projection of this config.
    pub fn public_view(&self) -> DbSetView {
        DbSetView {
            name: self.name.clone(),
            display_name: self.display_name().to_string(),
            title: self.title.clone(),
            note: self.note.clone(),
            db_listing_query: self.db_listing_query.clone(),
            paths_listing_query: self.paths_listing_query.clone(),
            include_regex: self.include_regex.clone(),
            exclude_regex: self.exclude_regex.clone(),
            dbs_override: self.dbs_override.clone(),
            checks: self.command_checks.iter().map(|c| c.counter.clone()).collect(),
            skip_check: self.skip_command_check.as_ref().map(|s| s.counter.clone()),
        }
    }
}

/// Serializable summary of a [`DbSetConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbSetView {
    pub name: String,
    pub display_name: String,
    pub title: Option<String>,
    pub note: Option<String>,
    pub db_listing_query: String,
    pub paths_listing_query: Option<String>,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub dbs_override: Vec<String>,
    pub checks: Vec<String>,
    pub skip_check: Option<String>,
}
