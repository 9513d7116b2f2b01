//! In-memory query source and context provider for tests and dry runs.

use async_trait::async_trait;
use dbsweep_core::{
    ContextError, ParameterOverrides, ParameterValue, QueryError, ResultTable, SweepResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::source::{ContextProvider, EntityContext, QuerySource, ResourceContext};

type Handler = Arc<dyn Fn(&ParameterOverrides) -> SweepResult<ResultTable> + Send + Sync>;

/// [`QuerySource`] answering from registered handlers.
///
/// Every call is recorded, so tests can assert which templates ran and
/// with what overrides.
#[derive(Clone, Default)]
pub struct MockQuerySource {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
    calls: Arc<Mutex<Vec<(String, ParameterOverrides)>>>,
}

impl MockQuerySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `template` with the same table every time.
    pub fn with_table(self, template: &str, table: ResultTable) -> Self {
        self.with_handler(template, move |_| Ok(table.clone()))
    }

    /// Fail every execution of `template`.
    pub fn with_failure(self, template: &str, reason: &str) -> Self {
        let template_id = template.to_string();
        let reason = reason.to_string();
        self.with_handler(template, move |_| {
            Err(QueryError::Execution {
                template: template_id.clone(),
                reason: reason.clone(),
            }
            .into())
        })
    }

    /// Answer `template` with a table chosen by the text value of `parameter`.
    ///
    /// Unknown values produce an empty table with the header of `empty`.
    pub fn with_tables_by(
        self,
        template: &str,
        parameter: &str,
        tables: HashMap<String, ResultTable>,
        empty: ResultTable,
    ) -> Self {
        let parameter = parameter.to_string();
        self.with_handler(template, move |overrides| {
            let key = match overrides.get(&parameter) {
                Some(ParameterValue::Text(s)) => Some(s.clone()),
                Some(ParameterValue::TextList(list)) => list.first().cloned(),
                _ => None,
            };
            Ok(key
                .and_then(|k| tables.get(&k).cloned())
                .unwrap_or_else(|| empty.clone()))
        })
    }

    pub fn with_handler<F>(self, template: &str, handler: F) -> Self
    where
        F: Fn(&ParameterOverrides) -> SweepResult<ResultTable> + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(template.to_string(), Arc::new(handler));
        }
        self
    }

    /// Number of executions of `template` so far.
    pub fn call_count(&self, template: &str) -> usize {
        self.calls().iter().filter(|(t, _)| t == template).count()
    }

    pub fn calls(&self) -> Vec<(String, ParameterOverrides)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuerySource for MockQuerySource {
    async fn execute(&self, template: &str, overrides: &ParameterOverrides) -> SweepResult<ResultTable> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((template.to_string(), overrides.clone()));
        }
        let handler = self
            .handlers
            .read()
            .ok()
            .and_then(|h| h.get(template).cloned())
            .ok_or_else(|| QueryError::TemplateNotFound {
                template: template.to_string(),
            })?;
        handler(overrides)
    }
}

/// [`ContextProvider`] that fails for a configured set of entities.
#[derive(Debug, Clone, Default)]
pub struct MockContextProvider {
    failing: HashSet<String>,
    initialized: Arc<Mutex<Vec<String>>>,
}

impl MockContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, entity: &str) -> Self {
        self.failing.insert(entity.to_string());
        self
    }

    /// Entities whose initialization was attempted, in call order.
    pub fn initialized(&self) -> Vec<String> {
        self.initialized.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ContextProvider for MockContextProvider {
    async fn initialize(&self, entity: &str) -> Result<Arc<dyn ResourceContext>, ContextError> {
        if let Ok(mut initialized) = self.initialized.lock() {
            initialized.push(entity.to_string());
        }
        if self.failing.contains(entity) {
            return Err(ContextError::InitFailed {
                entity: entity.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Arc::new(EntityContext::new(entity)))
    }
}
