//! Per-entity unit of work.
//!
//! An [`EntityTask`] lists the items of one entity (or uses the entity
//! itself as the single item), runs every routed check against each item and
//! records outcomes in the shared counter group. Its return value only feeds
//! the pool summary; reports go to the sinks.

use async_trait::async_trait;
use dbsweep_core::{
    expand_template, CheckError, CheckOutcome, CheckReport, CommandCheck, CounterGroup,
    ParameterOverrides, ParameterValue, SweepResult, TaskState,
};
use dbsweep_storage::{QuerySource, ResourceContext};
use std::sync::Arc;
use tracing::{Instrument, Span};

use crate::pool::TaskSummary;
use crate::routing::{CheckSet, RoutedCheck};

/// Evaluates one rule check against one item of an entity.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    /// Report the raw condition. Inversion is applied by the caller.
    async fn evaluate(
        &self,
        check: &CommandCheck,
        context: &dyn ResourceContext,
        fields: &[String],
    ) -> Result<CheckReport, CheckError>;
}

/// How to list the items inside an entity.
#[derive(Debug, Clone)]
pub struct ItemListing {
    pub template: String,
    pub parameters: ParameterOverrides,
    /// Parameter receiving the entity name.
    pub entity_parameter: String,
    /// Columns handed to checks, in order. Empty means every column.
    pub columns: Vec<String>,
}

pub struct EntityTask {
    entity: String,
    context: Arc<dyn ResourceContext>,
    checks: Arc<CheckSet>,
    listing: Option<Arc<ItemListing>>,
    source: Arc<dyn QuerySource>,
    runner: Arc<dyn CheckRunner>,
    counters: Arc<CounterGroup>,
    span: Span,
}

impl EntityTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity: impl Into<String>,
        context: Arc<dyn ResourceContext>,
        checks: Arc<CheckSet>,
        listing: Option<Arc<ItemListing>>,
        source: Arc<dyn QuerySource>,
        runner: Arc<dyn CheckRunner>,
        counters: Arc<CounterGroup>,
        span: Span,
    ) -> Self {
        Self {
            entity: entity.into(),
            context,
            checks,
            listing,
            source,
            runner,
            counters,
            span,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Run every check for this entity, inside the owning process span.
    pub async fn run(self) -> SweepResult<TaskSummary> {
        let span = self.span.clone();
        async move {
            self.counters.add_and_get_task_state(TaskState::Started, 1);
            match self.process().await {
                Ok(summary) => {
                    self.counters.add_and_get_task_state(TaskState::Completed, 1);
                    tracing::debug!(
                        entity = %self.entity,
                        targets = summary.targets,
                        evaluations = summary.evaluations,
                        "Entity complete"
                    );
                    Ok(summary)
                }
                Err(e) => {
                    self.counters.add_and_get_task_state(TaskState::Failed, 1);
                    tracing::error!(entity = %self.entity, error = %e, "Entity processing failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self) -> SweepResult<TaskSummary> {
        let targets = self.targets().await?;
        let mut evaluations = 0;

        match self.checks.as_ref() {
            CheckSet::Rules(checks) => {
                for fields in &targets {
                    for routed in checks {
                        self.evaluate(routed, fields).await?;
                        evaluations += 1;
                    }
                }
            }
            CheckSet::Skip(Some(skip)) => {
                for _ in &targets {
                    self.counters.record(&skip.check.counter, CheckOutcome::Skipped)?;
                }
            }
            CheckSet::Skip(None) => {}
        }

        Ok(TaskSummary {
            entity: self.entity.clone(),
            targets: targets.len(),
            evaluations,
        })
    }

    /// Items to check, each as its ordered field values.
    async fn targets(&self) -> SweepResult<Vec<Vec<String>>> {
        let Some(listing) = &self.listing else {
            return Ok(vec![vec![self.entity.clone()]]);
        };

        let mut overrides = listing.parameters.clone();
        overrides.insert(
            listing.entity_parameter.clone(),
            ParameterValue::Text(self.entity.clone()),
        );
        let table = self.source.execute(&listing.template, &overrides).await?;

        if listing.columns.is_empty() {
            return Ok(table.rows().to_vec());
        }
        let indexes = listing
            .columns
            .iter()
            .map(|c| table.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(table
            .rows()
            .iter()
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }

    async fn evaluate(&self, routed: &RoutedCheck, fields: &[String]) -> SweepResult<CheckOutcome> {
        let check = &routed.check;
        let outcome = match self.runner.evaluate(check, self.context.as_ref(), fields).await {
            Ok(report) if check.effective_pass(report.passed) => {
                if check.process_on_success {
                    routed
                        .success
                        .println(&self.message(check.on_success.as_deref(), fields, &report.detail))?;
                }
                CheckOutcome::Pass
            }
            Ok(report) => {
                if check.process_on_error {
                    routed
                        .error
                        .println(&self.message(check.on_error.as_deref(), fields, &report.detail))?;
                }
                CheckOutcome::Fail
            }
            Err(e) => {
                tracing::warn!(entity = %self.entity, check = %check.counter, error = %e, "Check could not run");
                routed.error.println(&format!("> Check Issue: {}", e))?;
                CheckOutcome::Error
            }
        };
        self.counters.record(&check.counter, outcome)?;
        Ok(outcome)
    }

    /// Render a report line; without a template the item fields are tab-joined.
    fn message(&self, template: Option<&str>, fields: &[String], detail: &str) -> String {
        match template {
            Some(t) => expand_template(t, &self.entity, fields, detail),
            None => fields.join("\t"),
        }
    }
}
