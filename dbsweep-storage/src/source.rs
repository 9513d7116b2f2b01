//! Traits for the external collaborators a sweep depends on.

use async_trait::async_trait;
use dbsweep_core::{ContextError, ParameterOverrides, ResultTable, SweepResult};
use std::fmt;
use std::sync::Arc;

/// Executes named query templates.
///
/// Implementations resolve `template` against their query catalog, apply
/// `overrides` on top of the template's parameter defaults, run the
/// statement and return the normalized result.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn execute(&self, template: &str, overrides: &ParameterOverrides) -> SweepResult<ResultTable>;
}

/// Handle to whatever external resource checks need for one entity
/// (a filesystem client, a remote session, ...).
pub trait ResourceContext: Send + Sync + fmt::Debug {
    fn entity(&self) -> &str;
}

/// Creates one [`ResourceContext`] per entity before its task is submitted.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn initialize(&self, entity: &str) -> Result<Arc<dyn ResourceContext>, ContextError>;
}

/// A context carrying nothing but the entity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityContext {
    entity: String,
}

impl EntityContext {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
        }
    }
}

impl ResourceContext for EntityContext {
    fn entity(&self) -> &str {
        &self.entity
    }
}

/// Provider for checks that need no external resource. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContextProvider;

#[async_trait]
impl ContextProvider for NoopContextProvider {
    async fn initialize(&self, entity: &str) -> Result<Arc<dyn ResourceContext>, ContextError> {
        Ok(Arc::new(EntityContext::new(entity)))
    }
}
