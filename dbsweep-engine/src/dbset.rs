//! Database-set process.
//!
//! A [`DbSetProcess`] resolves the set of entities (databases) to sweep,
//! primes the report sinks, and submits one [`EntityTask`] per entity to the
//! shared worker pool. Entity outcomes are observed only through the counter
//! group and the sinks.

use async_trait::async_trait;
use dbsweep_core::{
    CounterGroup, DbSetConfig, OutputDirectory, OutputSink, ParameterOverrides, ParameterValue,
    SweepError, SweepResult, TaskState,
};
use dbsweep_storage::{EntityContext, ResourceContext};
use std::sync::Arc;
use tracing::{Instrument, Span};

use crate::process::{Configurable, RunContext, RunOutcome, Runnable, TestReport};
use crate::routing::{CheckSet, RoutedCheck, RoutedSkipCheck};
use crate::task::{EntityTask, ItemListing};

/// Printed when a per-entity context cannot be established while rule
/// checks are configured.
pub const CONTEXT_GUIDANCE: &str = "Issue establishing a connection to the check backend. \
     Check credentials, client configuration, and/or availability of the service. \
     Can you run the backend's command line client successfully?";

/// Written to the success sink when a process has no rule checks and no
/// skip check.
pub const CHECKS_SKIPPED: &str = "Command Checks Skipped.  Rules Processing Skipped.";

/// State bound at [`Configurable::init`].
struct Bound {
    ctx: RunContext,
    counters: Arc<CounterGroup>,
    success: OutputSink,
    error: OutputSink,
    checks: Arc<CheckSet>,
    listing: Option<Arc<ItemListing>>,
}

pub struct DbSetProcess {
    config: DbSetConfig,
    span: Span,
    bound: Option<Bound>,
}

impl DbSetProcess {
    pub fn new(config: DbSetConfig) -> SweepResult<Self> {
        config.validate()?;
        let span = tracing::info_span!(
            "dbset",
            process = %config.name,
            run_id = tracing::field::Empty
        );
        Ok(Self {
            config,
            span,
            bound: None,
        })
    }

    pub fn config(&self) -> &DbSetConfig {
        &self.config
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn success_sink(&self) -> Option<&OutputSink> {
        self.bound.as_ref().map(|b| &b.success)
    }

    pub fn error_sink(&self) -> Option<&OutputSink> {
        self.bound.as_ref().map(|b| &b.error)
    }

    pub fn counters(&self) -> Option<Arc<CounterGroup>> {
        self.bound.as_ref().map(|b| Arc::clone(&b.counters))
    }

    pub fn checks(&self) -> Option<&CheckSet> {
        self.bound.as_ref().map(|b| b.checks.as_ref())
    }

    fn bound(&self) -> SweepResult<&Bound> {
        self.bound.as_ref().ok_or_else(|| SweepError::Task {
            reason: format!("process {} used before init", self.config.name),
        })
    }

    /// Resolve every check's sinks and write the report headers.
    ///
    /// Rule checks get a dedicated file per configured filename, otherwise
    /// the process defaults. Without rule checks the skip check (if any) is
    /// routed to the defaults.
    pub fn prepare_output_routing(
        &self,
        output: &OutputDirectory,
        success: &OutputSink,
        error: &OutputSink,
    ) -> SweepResult<CheckSet> {
        let _entered = self.span.enter();
        let process_lines: Vec<&str> = [&self.config.title, &self.config.note, &self.config.header]
            .into_iter()
            .filter_map(|line| line.as_deref())
            .collect();

        for line in &process_lines {
            success.println(line)?;
        }

        if !self.config.has_checks() {
            let skip = self.config.skip_command_check.clone().map(|check| RoutedSkipCheck {
                check,
                success: success.clone(),
                error: error.clone(),
            });
            return Ok(CheckSet::Skip(skip));
        }

        let mut routed = Vec::with_capacity(self.config.command_checks.len());
        for check in &self.config.command_checks {
            let check_success = match &check.success_filename {
                Some(filename) => output.open(filename)?,
                None => success.clone(),
            };
            let check_error = match &check.error_filename {
                Some(filename) => output.open(filename)?,
                None => error.clone(),
            };

            for line in &process_lines {
                check_success.println(line)?;
                check_error.println(line)?;
            }
            // Same shape for inverted checks; inversion only flips evaluation.
            for line in check.display_lines() {
                if check.process_on_error {
                    check_error.println(line)?;
                }
                if check.process_on_success {
                    check_success.println(line)?;
                }
            }

            tracing::debug!(
                check = %check.counter,
                success = check_success.name(),
                error = check_error.name(),
                "Routed check"
            );
            routed.push(RoutedCheck {
                check: check.clone(),
                success: check_success,
                error: check_error,
            });
        }
        Ok(CheckSet::Rules(routed))
    }

    /// The entities to process: the override list verbatim, or the listing
    /// query filtered by the include (else exclude) pattern.
    pub async fn resolve_entities(&self) -> SweepResult<Vec<String>> {
        let bound = self.bound()?;
        self.list_entities(bound).instrument(self.span.clone()).await
    }

    async fn list_entities(&self, bound: &Bound) -> SweepResult<Vec<String>> {
        let config = &self.config;
        if !config.dbs_override.is_empty() {
            tracing::info!(count = config.dbs_override.len(), "Using entity override list");
            return Ok(config.dbs_override.clone());
        }

        let mut table = bound
            .ctx
            .source
            .execute(&config.db_listing_query, &config.db_listing_parameters)
            .await?;
        let column = table.column_index(&config.entity_column)?;

        if let Some(pattern) = &config.include_regex {
            tracing::info!(pattern = %pattern, "Keeping entities that match");
            table.keep(pattern, column)?;
        } else if let Some(pattern) = &config.exclude_regex {
            tracing::info!(pattern = %pattern, "Dropping entities that match");
            table.remove(pattern, column)?;
        }

        let entities = table.get_column(&config.entity_column)?;
        tracing::info!(
            entities = %entities.join(";"),
            "{} - found {} entities to process",
            config.display_name(),
            entities.len()
        );
        Ok(entities)
    }

    /// Submit one task per entity. Returns the number submitted.
    ///
    /// Fails fast when a resource context cannot be created while rule checks
    /// are configured: tasks already submitted are aborted and nothing further
    /// is submitted.
    pub async fn dispatch(&self, entities: &[String]) -> SweepResult<usize> {
        let bound = self.bound()?;
        self.submit_all(bound, entities).instrument(self.span.clone()).await
    }

    async fn submit_all(&self, bound: &Bound, entities: &[String]) -> SweepResult<usize> {
        bound
            .counters
            .add_and_get_task_state(TaskState::Constructed, entities.len() as u64);
        let has_rules = bound.checks.has_rules();

        for entity in entities {
            let context: Arc<dyn ResourceContext> = match bound.ctx.contexts.initialize(entity).await {
                Ok(context) => context,
                Err(e) if has_rules => {
                    bound.ctx.pool.abort_all();
                    tracing::error!(entity = %entity, error = %e, "{}", CONTEXT_GUIDANCE);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(entity = %entity, error = %e, "Context unavailable, no rule checks to run");
                    Arc::new(EntityContext::new(entity.as_str()))
                }
            };

            let task = EntityTask::new(
                entity.as_str(),
                context,
                Arc::clone(&bound.checks),
                bound.listing.clone(),
                Arc::clone(&bound.ctx.source),
                Arc::clone(&bound.ctx.runner),
                Arc::clone(&bound.counters),
                self.span.clone(),
            );
            tracing::debug!(entity = %entity, "Submitting entity task");
            bound.ctx.pool.submit(task.run());
        }

        if !has_rules {
            self.write_skip_notice(bound)?;
        }
        Ok(entities.len())
    }

    fn write_skip_notice(&self, bound: &Bound) -> SweepResult<()> {
        match &self.config.skip_command_check {
            Some(skip) => {
                for line in [&skip.title, &skip.note].into_iter().flatten() {
                    bound.success.println(line)?;
                }
            }
            None => bound.success.println(CHECKS_SKIPPED)?,
        }
        Ok(())
    }

    /// Run the listing and item queries once each without dispatching. The
    /// item query runs for a sample entity.
    ///
    /// Failures are logged and written to the error sink; they do not fail
    /// the call.
    pub async fn test_mode(&self) -> SweepResult<TestReport> {
        let bound = self.bound()?;
        self.test_queries(bound).instrument(self.span.clone()).await
    }

    async fn test_queries(&self, bound: &Bound) -> SweepResult<TestReport> {
        let listing_ok = self
            .test_query(bound, &self.config.db_listing_query, &self.config.db_listing_parameters)
            .await?;
        let items_ok = match &self.config.paths_listing_query {
            Some(template) => Some(
                self.test_query(bound, template, &self.sample_item_parameters())
                    .await?,
            ),
            None => None,
        };
        Ok(TestReport { listing_ok, items_ok })
    }

    /// Item listing parameters with the entity parameter bound to a sample
    /// entity: the first override, else an empty name.
    fn sample_item_parameters(&self) -> ParameterOverrides {
        let mut parameters = self.config.path_listing_parameters.clone();
        let sample = self.config.dbs_override.first().cloned().unwrap_or_default();
        parameters
            .entry(self.config.entity_parameter.clone())
            .or_insert(ParameterValue::Text(sample));
        parameters
    }

    async fn test_query(
        &self,
        bound: &Bound,
        template: &str,
        parameters: &ParameterOverrides,
    ) -> SweepResult<bool> {
        tracing::info!(template, "Testing query definition");
        match bound.ctx.source.execute(template, parameters).await {
            Ok(table) => {
                tracing::info!(template, rows = table.count(), "Query test passed");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(template, error = %e, "Query test failed");
                bound.error.println(template)?;
                bound.error.println(&format!("> Processing Issue: {}", e))?;
                Ok(false)
            }
        }
    }

    /// Report destinations, one `\t<description> -> <path>` line each.
    pub fn output_details(&self) -> Vec<String> {
        let Some(bound) = &self.bound else {
            return Vec::new();
        };
        let output = &bound.ctx.output;
        let name = self.config.display_name();
        let mut lines = vec![
            format!("\t{} results -> {}", name, output.display_path(&self.config.success_filename)),
            format!("\t{} issues -> {}", name, output.display_path(&self.config.error_filename)),
        ];

        for check in &self.config.command_checks {
            if let Some(filename) = &check.success_filename {
                let description = check.success_description.as_deref().unwrap_or(&check.counter);
                lines.push(format!("\t{} -> {}", description, output.display_path(filename)));
            }
            if let Some(filename) = &check.error_filename {
                let description = check.error_description.as_deref().unwrap_or(&check.counter);
                lines.push(format!("\t{} -> {}", description, output.display_path(filename)));
            }
        }
        lines
    }
}

impl Configurable for DbSetProcess {
    fn init(&mut self, ctx: &RunContext) -> SweepResult<()> {
        self.span.record("run_id", tracing::field::display(ctx.run_id));

        let success = ctx.output.open(&self.config.success_filename)?;
        let error = ctx.output.open(&self.config.error_filename)?;
        let checks = self.prepare_output_routing(&ctx.output, &success, &error)?;

        let counters = ctx.counters.group(&self.config.name);
        for key in checks.counter_keys() {
            counters.register(key);
        }

        let listing = self.config.paths_listing_query.as_ref().map(|template| {
            Arc::new(ItemListing {
                template: template.clone(),
                parameters: self.config.path_listing_parameters.clone(),
                entity_parameter: self.config.entity_parameter.clone(),
                columns: self.config.listing_columns.clone(),
            })
        });

        self.bound = Some(Bound {
            ctx: ctx.clone(),
            counters,
            success,
            error,
            checks: Arc::new(checks),
            listing,
        });
        Ok(())
    }
}

#[async_trait]
impl Runnable for DbSetProcess {
    async fn run(&self) -> SweepResult<RunOutcome> {
        if self.config.test_sql {
            return Ok(RunOutcome::Tested(self.test_mode().await?));
        }
        let entities = self.resolve_entities().await?;
        let entities = self.dispatch(&entities).await?;
        Ok(RunOutcome::Dispatched { entities })
    }
}
