//! Command line flags.

use dbsweep_core::DbSetConfig;
use std::path::PathBuf;

use crate::config::ConfigError;

pub const USAGE: &str = "\
Usage: dbsweep [--config <path>] [--test-sql] [--dbs <a,b,...>]
               [--include <regex>] [--exclude <regex>]

  --config <path>     run file (defaults to $DBSWEEP_CONFIG)
  --test-sql          run the listing queries once and report, no dispatch
  --dbs <a,b,...>     process exactly these databases
  --include <regex>   keep databases whose name fully matches
  --exclude <regex>   drop databases whose name fully matches
  -h, --help          print this help";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub test_sql: bool,
    pub dbs: Vec<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub help: bool,
}

impl CliArgs {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter().map(Into::<String>::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value(&mut args, "--config")?)),
                "--test-sql" => parsed.test_sql = true,
                "--dbs" => {
                    parsed.dbs = value(&mut args, "--dbs")?
                        .split(',')
                        .map(str::trim)
                        .filter(|db| !db.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "--include" => parsed.include = Some(value(&mut args, "--include")?),
                "--exclude" => parsed.exclude = Some(value(&mut args, "--exclude")?),
                "-h" | "--help" => parsed.help = true,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "arguments",
                        reason: format!("unknown flag {}", other),
                    })
                }
            }
        }
        Ok(parsed)
    }

    /// Apply the flags that override the run file's process settings.
    pub fn apply(&self, config: &mut DbSetConfig) {
        if self.test_sql {
            config.test_sql = true;
        }
        if !self.dbs.is_empty() {
            config.dbs_override = self.dbs.clone();
        }
        if let Some(include) = &self.include {
            config.include_regex = Some(include.clone());
        }
        if let Some(exclude) = &self.exclude {
            config.exclude_regex = Some(exclude.clone());
        }
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<String, ConfigError> {
    args.next().ok_or_else(|| ConfigError::InvalidValue {
        field: flag,
        reason: "expects a value".to_string(),
    })
}
