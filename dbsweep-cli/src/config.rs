//! Run file loading.
//!
//! The run file is TOML. Its path comes from `--config` or `DBSWEEP_CONFIG`;
//! database connection settings may be overridden with `DBSWEEP_DB_*`.

use dbsweep_core::{DbSetConfig, QueryCatalog, QueryDefinition};
use dbsweep_storage::DbConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::args::CliArgs;

fn default_parallelism() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default)]
    pub database: DbConfig,
    /// Directory receiving every report file.
    pub output_directory: PathBuf,
    /// Entity tasks running at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Seconds before a check command is killed. Unset means no limit.
    #[serde(default)]
    pub check_timeout_secs: Option<u64>,
    #[serde(default)]
    pub queries: Vec<QueryDefinition>,
    pub dbset: DbSetConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or DBSWEEP_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error(transparent)]
    Process(#[from] dbsweep_core::ConfigError),
}

impl SweepConfig {
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let path = args.config.clone().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.database = config.database.with_env_overrides();
        args.apply(&mut config.dbset);
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output_directory",
                reason: "must not be empty".to_string(),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallelism",
                reason: "must be > 0".to_string(),
            });
        }
        if self.database.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_size",
                reason: "must be > 0".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for query in &self.queries {
            if !ids.insert(query.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "queries.id",
                    reason: format!("duplicate query id {}", query.id),
                });
            }
        }

        self.dbset.validate()?;

        let catalog = QueryCatalog::new(self.queries.iter().cloned());
        let dbset = &self.dbset;
        let listing_needed = dbset.dbs_override.is_empty() || dbset.test_sql;
        if listing_needed && !catalog.contains(&dbset.db_listing_query) {
            return Err(ConfigError::InvalidValue {
                field: "dbset.db_listing_query",
                reason: format!("no query with id {}", dbset.db_listing_query),
            });
        }
        if let Some(paths) = &dbset.paths_listing_query {
            let definition = catalog.get(paths).map_err(|_| ConfigError::InvalidValue {
                field: "dbset.paths_listing_query",
                reason: format!("no query with id {}", paths),
            })?;
            if !definition.declares(&dbset.entity_parameter) {
                return Err(ConfigError::InvalidValue {
                    field: "dbset.entity_parameter",
                    reason: format!(
                        "query {} has no parameter {}",
                        paths, dbset.entity_parameter
                    ),
                });
            }
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("DBSWEEP_CONFIG").ok().map(PathBuf::from)
}
