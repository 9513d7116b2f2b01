//! Postgres Query Source
//!
//! Runs catalog queries through a deadpool-postgres connection pool and
//! converts the typed rows into a [`ResultTable`].
//!
//! `Integer` parameters bind as INT8 and `TextList` parameters as TEXT[];
//! statements comparing against narrower columns should cast explicitly
//! (`$1::int4`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use dbsweep_core::{
    ColumnKind, ColumnMeta, ConversionError, FieldValue, ParameterOverrides, ParameterValue,
    QueryCatalog, QueryError, ResultTable, SweepResult, TypedRows,
};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row};

use crate::source::QuerySource;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "metastore".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_max_size() -> usize {
    16
}

fn default_timeout_secs() -> u64 {
    30
}

/// Database connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Maximum pool size
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: String::new(),
            max_size: default_max_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DbConfig {
    /// Apply `DBSWEEP_DB_*` environment overrides on top of this config.
    ///
    /// Environment variables:
    /// - `DBSWEEP_DB_HOST`, `DBSWEEP_DB_PORT`, `DBSWEEP_DB_NAME`
    /// - `DBSWEEP_DB_USER`, `DBSWEEP_DB_PASSWORD`
    /// - `DBSWEEP_DB_POOL_SIZE`, `DBSWEEP_DB_TIMEOUT`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("DBSWEEP_DB_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("DBSWEEP_DB_PORT").ok().and_then(|s| s.parse().ok()) {
            self.port = port;
        }
        if let Ok(dbname) = std::env::var("DBSWEEP_DB_NAME") {
            self.dbname = dbname;
        }
        if let Ok(user) = std::env::var("DBSWEEP_DB_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("DBSWEEP_DB_PASSWORD") {
            self.password = password;
        }
        if let Some(size) = std::env::var("DBSWEEP_DB_POOL_SIZE").ok().and_then(|s| s.parse().ok()) {
            self.max_size = size;
        }
        if let Some(secs) = std::env::var("DBSWEEP_DB_TIMEOUT").ok().and_then(|s| s.parse().ok()) {
            self.timeout_secs = secs;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, QueryError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| QueryError::Pool {
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

// ============================================================================
// QUERY SOURCE
// ============================================================================

/// [`QuerySource`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgQuerySource {
    pool: Pool,
    catalog: Arc<QueryCatalog>,
}

impl PgQuerySource {
    pub fn new(pool: Pool, catalog: Arc<QueryCatalog>) -> Self {
        Self { pool, catalog }
    }

    pub fn from_config(config: &DbConfig, catalog: Arc<QueryCatalog>) -> Result<Self, QueryError> {
        Ok(Self::new(config.create_pool()?, catalog))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }
}

#[async_trait]
impl QuerySource for PgQuerySource {
    async fn execute(&self, template: &str, overrides: &ParameterOverrides) -> SweepResult<ResultTable> {
        let bound = self.catalog.bind(template, overrides)?;
        tracing::debug!(query = template, statement = %bound.statement, "Executing query");

        let conn = self.pool.get().await.map_err(|e| QueryError::Pool {
            reason: e.to_string(),
        })?;
        let statement = conn
            .prepare(&bound.statement)
            .await
            .map_err(|e| execution_error(template, &e))?;

        let params = to_sql_params(&bound.values);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = conn
            .query(&statement, &param_refs)
            .await
            .map_err(|e| execution_error(template, &e))?;

        let typed = PgRows::new(statement.columns(), &rows);
        let table = ResultTable::build(&typed);
        tracing::debug!(query = template, fetched = rows.len(), kept = table.count(), "Query complete");
        Ok(table)
    }
}

fn execution_error(template: &str, e: &tokio_postgres::Error) -> QueryError {
    let reason = match e.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => e.to_string(),
    };
    QueryError::Execution {
        template: template.to_string(),
        reason,
    }
}

fn to_sql_params(values: &[ParameterValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    values
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                ParameterValue::Boolean(b) => Box::new(*b),
                ParameterValue::Integer(i) => Box::new(*i),
                ParameterValue::Text(s) => Box::new(s.clone()),
                ParameterValue::TextList(list) => Box::new(list.clone()),
            }
        })
        .collect()
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Declared kind for a Postgres column type.
pub fn column_kind(ty: &Type) -> ColumnKind {
    match *ty {
        Type::BOOL => ColumnKind::Bit,
        Type::INT2 | Type::INT4 => ColumnKind::Integer,
        Type::INT8 | Type::OID => ColumnKind::BigInt,
        Type::FLOAT4 => ColumnKind::Float,
        Type::FLOAT8 => ColumnKind::Double,
        Type::NUMERIC => ColumnKind::Decimal,
        Type::DATE => ColumnKind::Date,
        Type::TIME => ColumnKind::Time,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ColumnKind::Timestamp,
        _ => ColumnKind::Text,
    }
}

/// Typed view over the rows of one executed statement.
struct PgRows<'a> {
    columns: Vec<ColumnMeta>,
    types: Vec<Type>,
    rows: &'a [Row],
}

impl<'a> PgRows<'a> {
    fn new(columns: &[tokio_postgres::Column], rows: &'a [Row]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| ColumnMeta::new(c.name(), column_kind(c.type_())))
                .collect(),
            types: columns.iter().map(|c| c.type_().clone()).collect(),
            rows,
        }
    }

    fn get<'r, T>(&self, row: &'r Row, column: usize) -> Result<Option<T>, ConversionError>
    where
        T: tokio_postgres::types::FromSql<'r>,
    {
        row.try_get::<_, Option<T>>(column)
            .map_err(|e| ConversionError::Decode {
                column: self.columns[column].name.clone(),
                reason: e.to_string(),
            })
    }
}

impl TypedRows for PgRows<'_> {
    fn columns(&self) -> Vec<ColumnMeta> {
        self.columns.clone()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn value(&self, row: usize, column: usize) -> Result<FieldValue, ConversionError> {
        let row = &self.rows[row];
        let value = match self.types[column] {
            Type::BOOL => self.get::<bool>(row, column)?.map(|b| FieldValue::Bit(u8::from(b))),
            Type::INT2 => self.get::<i16>(row, column)?.map(|i| FieldValue::Int(i32::from(i))),
            Type::INT4 => self.get::<i32>(row, column)?.map(FieldValue::Int),
            Type::INT8 => self.get::<i64>(row, column)?.map(FieldValue::BigInt),
            Type::OID => self.get::<u32>(row, column)?.map(|o| FieldValue::BigInt(i64::from(o))),
            Type::FLOAT4 => self.get::<f32>(row, column)?.map(FieldValue::Float),
            Type::FLOAT8 => self.get::<f64>(row, column)?.map(FieldValue::Double),
            Type::NUMERIC => self.get::<Decimal>(row, column)?.map(FieldValue::Decimal),
            Type::DATE => self.get::<NaiveDate>(row, column)?.map(FieldValue::Date),
            Type::TIME => self.get::<NaiveTime>(row, column)?.map(FieldValue::Time),
            Type::TIMESTAMP => self.get::<NaiveDateTime>(row, column)?.map(FieldValue::Timestamp),
            Type::TIMESTAMPTZ => self
                .get::<DateTime<Utc>>(row, column)?
                .map(|ts| FieldValue::Timestamp(ts.naive_utc())),
            Type::UUID => self
                .get::<uuid::Uuid>(row, column)?
                .map(|u| FieldValue::Text(u.to_string())),
            Type::JSON | Type::JSONB => self
                .get::<serde_json::Value>(row, column)?
                .map(|v| FieldValue::Text(v.to_string())),
            // Anything else must be readable as text or the row is dropped.
            _ => self.get::<String>(row, column)?.map(FieldValue::Text),
        };
        Ok(value.unwrap_or(FieldValue::Null))
    }
}
