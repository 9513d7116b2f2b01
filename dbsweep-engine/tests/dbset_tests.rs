//! End-to-end tests for database-set processing over in-memory backends.

use dbsweep_core::{
    CommandCheck, ParameterDef, ParameterKind, ParameterValue, QueryCatalog, QueryDefinition,
    SkipCommandCheck, SweepError, TaskState,
};
use dbsweep_engine::{
    Configurable, DbSetProcess, RunContext, RunOutcome, Runnable, CHECKS_SKIPPED,
};
use dbsweep_test_utils::fixtures::{
    dbset_config, listing_source, memory_run_context, names_table, rule_check, text_table,
    DB_LISTING, PATH_LISTING,
};
use dbsweep_test_utils::{
    GatedCheckRunner, MockContextProvider, MockQuerySource, Scripted, ScriptedCheckRunner,
};
use std::collections::HashMap;
use std::sync::Arc;

fn process(config: dbsweep_core::DbSetConfig, ctx: &RunContext) -> DbSetProcess {
    let mut process = DbSetProcess::new(config).unwrap();
    process.init(ctx).unwrap();
    process
}

fn default_context(source: MockQuerySource) -> RunContext {
    memory_run_context(
        source,
        MockContextProvider::new(),
        Arc::new(ScriptedCheckRunner::new()),
    )
}

// ============================================================================
// ENTITY RESOLUTION
// ============================================================================

#[tokio::test]
async fn test_include_pattern_keeps_matching_entities() {
    let ctx = default_context(listing_source(&["db1", "db2", "db3"]));
    let mut config = dbset_config("scan");
    config.include_regex = Some("db[12]".to_string());

    let entities = process(config, &ctx).resolve_entities().await.unwrap();
    assert_eq!(entities, vec!["db1", "db2"]);
}

#[tokio::test]
async fn test_exclude_pattern_drops_matching_entities() {
    let ctx = default_context(listing_source(&["sys", "db1", "sys_audit"]));
    let mut config = dbset_config("scan");
    config.exclude_regex = Some("sys.*".to_string());

    let entities = process(config, &ctx).resolve_entities().await.unwrap();
    assert_eq!(entities, vec!["db1"]);
}

#[tokio::test]
async fn test_include_wins_over_exclude() {
    let ctx = default_context(listing_source(&["db1", "db2"]));
    let mut config = dbset_config("scan");
    config.include_regex = Some("db1".to_string());
    config.exclude_regex = Some("db1".to_string());

    let entities = process(config, &ctx).resolve_entities().await.unwrap();
    assert_eq!(entities, vec!["db1"]);
}

#[tokio::test]
async fn test_override_list_skips_listing_query() {
    let source = listing_source(&["db1"]);
    let ctx = default_context(source.clone());
    let mut config = dbset_config("scan");
    config.dbs_override = vec!["x".to_string(), "y".to_string()];
    config.include_regex = Some("nothing".to_string());

    let entities = process(config, &ctx).resolve_entities().await.unwrap();
    assert_eq!(entities, vec!["x", "y"]);
    assert_eq!(source.call_count(DB_LISTING), 0);
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let ctx = default_context(MockQuerySource::new().with_failure(DB_LISTING, "relation does not exist"));
    let err = process(dbset_config("scan"), &ctx)
        .resolve_entities()
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_entity_column_is_configurable() {
    let table = text_table(&["id", "db_name"], &[&["1", "sales"], &["2", "hr"]]);
    let ctx = default_context(MockQuerySource::new().with_table(DB_LISTING, table));
    let mut config = dbset_config("scan");
    config.entity_column = "DB_NAME".to_string();
    config.include_regex = Some("s.*".to_string());

    let entities = process(config, &ctx).resolve_entities().await.unwrap();
    assert_eq!(entities, vec!["sales"]);
}

#[tokio::test]
async fn test_missing_entity_column_is_reported() {
    let table = text_table(&["id"], &[&["1"]]);
    let ctx = default_context(MockQuerySource::new().with_table(DB_LISTING, table));
    let err = process(dbset_config("scan"), &ctx)
        .resolve_entities()
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::Config(_)));
}

// ============================================================================
// DISPATCH
// ============================================================================

#[tokio::test]
async fn test_constructed_counted_before_any_task_completes() {
    let runner = Arc::new(GatedCheckRunner::new());
    let ctx = memory_run_context(MockQuerySource::new(), MockContextProvider::new(), runner.clone());
    let mut config = dbset_config("scan");
    config.command_checks = vec![rule_check("dirs")];
    let process = process(config, &ctx);
    let counters = process.counters().unwrap();

    let entities = vec!["db1".to_string(), "db2".to_string(), "db3".to_string()];
    assert_eq!(process.dispatch(&entities).await.unwrap(), 3);
    assert_eq!(counters.task_state(TaskState::Constructed), 3);
    assert_eq!(counters.task_state(TaskState::Completed), 0);

    runner.open();
    let summary = ctx.pool.join_all().await;
    assert_eq!(summary.completed, 3);
    assert_eq!(counters.task_state(TaskState::Started), 3);
    assert_eq!(counters.task_state(TaskState::Completed), 3);
    assert_eq!(counters.check_counts("dirs").unwrap().pass, 3);
}

#[tokio::test]
async fn test_skip_check_written_once_after_dispatch() {
    let ctx = default_context(MockQuerySource::new());
    let mut config = dbset_config("scan");
    config.skip_command_check = Some(SkipCommandCheck {
        counter: "skipped".to_string(),
        title: Some("-- Basic listing".to_string()),
        note: Some("No rule checks configured".to_string()),
    });
    let process = process(config, &ctx);

    let entities = vec!["db1".to_string(), "db2".to_string()];
    process.dispatch(&entities).await.unwrap();
    let summary = ctx.pool.join_all().await;
    assert!(summary.is_clean());

    let success = process.success_sink().unwrap();
    assert_eq!(success.lines(), vec!["-- Basic listing", "No rule checks configured"]);
    let counts = process.counters().unwrap().check_counts("skipped").unwrap();
    assert_eq!(counts.skipped, 2);
}

#[tokio::test]
async fn test_no_checks_writes_fallback_line() {
    let ctx = default_context(MockQuerySource::new());
    let process = process(dbset_config("scan"), &ctx);

    process.dispatch(&["db1".to_string()]).await.unwrap();
    ctx.pool.join_all().await;

    assert_eq!(process.success_sink().unwrap().lines(), vec![CHECKS_SKIPPED]);
}

#[tokio::test]
async fn test_context_failure_stops_dispatch() {
    let contexts = MockContextProvider::new().failing_for("db2");
    let ctx = memory_run_context(
        MockQuerySource::new(),
        contexts.clone(),
        Arc::new(ScriptedCheckRunner::new()),
    );
    let mut config = dbset_config("scan");
    config.command_checks = vec![rule_check("dirs")];
    let process = process(config, &ctx);

    let entities = vec!["db1".to_string(), "db2".to_string(), "db3".to_string()];
    let err = process.dispatch(&entities).await.unwrap_err();
    assert!(matches!(err, SweepError::Context(_)));
    assert_eq!(contexts.initialized(), vec!["db1", "db2"]);

    let summary = ctx.pool.join_all().await;
    assert_eq!(summary.total(), 1);
}

#[tokio::test]
async fn test_context_failure_without_checks_continues() {
    let contexts = MockContextProvider::new().failing_for("db2");
    let ctx = memory_run_context(
        MockQuerySource::new(),
        contexts.clone(),
        Arc::new(ScriptedCheckRunner::new()),
    );
    let process = process(dbset_config("scan"), &ctx);

    let entities = vec!["db1".to_string(), "db2".to_string(), "db3".to_string()];
    assert_eq!(process.dispatch(&entities).await.unwrap(), 3);
    assert_eq!(ctx.pool.join_all().await.completed, 3);
}

// ============================================================================
// OUTPUT ROUTING
// ============================================================================

#[tokio::test]
async fn test_headers_follow_routing_flags() {
    let ctx = default_context(MockQuerySource::new());
    let mut config = dbset_config("scan");
    config.title = Some("# Location scan".to_string());

    let mut errors_only = rule_check("missing");
    errors_only.error_filename = Some("missing.txt".to_string());

    let mut inverted = rule_check("present");
    inverted.invert_check = true;
    inverted.process_on_success = true;
    inverted.process_on_error = false;
    inverted.success_filename = Some("present.txt".to_string());

    config.command_checks = vec![errors_only, inverted];
    process(config, &ctx);

    let missing = ctx.output.open("missing.txt").unwrap();
    assert_eq!(missing.lines(), vec!["# Location scan", "-- missing"]);

    let present = ctx.output.open("present.txt").unwrap();
    assert_eq!(present.lines(), vec!["# Location scan", "-- present"]);

    // The inverted check's error side falls back to the process sink and
    // only receives the process header.
    let error = ctx.output.open("error.txt").unwrap();
    assert_eq!(error.lines(), vec!["# Location scan"]);
}

#[tokio::test]
async fn test_check_results_reach_their_sinks() {
    let runner = ScriptedCheckRunner::new()
        .with("missing", "db2", Scripted::Fail)
        .with("missing", "db3", Scripted::Error);
    let ctx = memory_run_context(MockQuerySource::new(), MockContextProvider::new(), Arc::new(runner));
    let mut config = dbset_config("scan");
    let mut check = rule_check("missing");
    check.on_error = Some("{entity} is missing".to_string());
    config.command_checks = vec![check];
    let process = process(config, &ctx);

    let entities: Vec<String> = ["db1", "db2", "db3"].iter().map(|s| s.to_string()).collect();
    process.dispatch(&entities).await.unwrap();
    ctx.pool.join_all().await;

    let lines = process.error_sink().unwrap().lines();
    assert!(lines.contains(&"db2 is missing".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("> Check Issue:")));
    assert!(!lines.iter().any(|l| l.starts_with("db1")));

    let counts = process.counters().unwrap().check_counts("missing").unwrap();
    assert_eq!((counts.pass, counts.fail, counts.error), (1, 1, 1));
}

#[tokio::test]
async fn test_inverted_check_flips_outcome() {
    let runner = ScriptedCheckRunner::new().with("orphans", "db1", Scripted::Fail);
    let ctx = memory_run_context(MockQuerySource::new(), MockContextProvider::new(), Arc::new(runner));
    let mut config = dbset_config("scan");
    let mut check = rule_check("orphans");
    check.invert_check = true;
    config.command_checks = vec![check];
    let process = process(config, &ctx);

    process
        .dispatch(&["db1".to_string(), "db2".to_string()])
        .await
        .unwrap();
    ctx.pool.join_all().await;

    let counts = process.counters().unwrap().check_counts("orphans").unwrap();
    assert_eq!(counts.pass, 1);
    assert_eq!(counts.fail, 1);
    assert_eq!(process.error_sink().unwrap().lines().last().map(String::as_str), Some("db2"));
}

// ============================================================================
// ITEM LISTING
// ============================================================================

#[tokio::test]
async fn test_items_are_listed_per_entity() {
    let mut tables = HashMap::new();
    tables.insert(
        "db1".to_string(),
        text_table(&["tbl", "location"], &[&["t1", "/w/t1"], &["t2", "/w/t2"]]),
    );
    let source = MockQuerySource::new().with_tables_by(
        PATH_LISTING,
        "dbs",
        tables,
        text_table(&["tbl", "location"], &[]),
    );
    let runner = Arc::new(ScriptedCheckRunner::new());
    let ctx = memory_run_context(source.clone(), MockContextProvider::new(), runner.clone());

    let mut config = dbset_config("scan");
    config.paths_listing_query = Some(PATH_LISTING.to_string());
    config.listing_columns = vec!["location".to_string()];
    config.command_checks = vec![rule_check("dirs")];
    let process = process(config, &ctx);

    process
        .dispatch(&["db1".to_string(), "db2".to_string()])
        .await
        .unwrap();
    let summary = ctx.pool.join_all().await;

    let mut targets: Vec<usize> = summary.tasks.iter().map(|t| t.targets).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec![0, 2]);

    let mut fields: Vec<Vec<String>> = runner.calls().into_iter().map(|(_, _, f)| f).collect();
    fields.sort();
    assert_eq!(fields, vec![vec!["/w/t1".to_string()], vec!["/w/t2".to_string()]]);
    assert_eq!(source.call_count(PATH_LISTING), 2);
}

#[tokio::test]
async fn test_item_listing_failure_marks_task_failed() {
    let source = MockQuerySource::new().with_failure(PATH_LISTING, "permission denied");
    let ctx = default_context(source);
    let mut config = dbset_config("scan");
    config.paths_listing_query = Some(PATH_LISTING.to_string());
    config.command_checks = vec![rule_check("dirs")];
    let process = process(config, &ctx);

    process.dispatch(&["db1".to_string()]).await.unwrap();
    let summary = ctx.pool.join_all().await;

    assert_eq!(summary.failed, 1);
    let counters = process.counters().unwrap();
    assert_eq!(counters.task_state(TaskState::Failed), 1);
    assert_eq!(counters.task_state(TaskState::Completed), 0);
}

// ============================================================================
// TEST MODE AND RUN
// ============================================================================

#[tokio::test]
async fn test_query_test_mode_reports_failures() {
    let source = MockQuerySource::new()
        .with_failure(DB_LISTING, "syntax error")
        .with_table(PATH_LISTING, names_table(&["t1"]));
    let ctx = default_context(source);
    let mut config = dbset_config("scan");
    config.paths_listing_query = Some(PATH_LISTING.to_string());
    config.test_sql = true;
    let process = process(config, &ctx);

    let outcome = process.run().await.unwrap();
    let RunOutcome::Tested(report) = outcome else {
        panic!("expected a test report, got {:?}", outcome);
    };
    assert!(!report.listing_ok);
    assert_eq!(report.items_ok, Some(true));
    assert!(!report.passed());

    let lines = process.error_sink().unwrap().lines();
    assert_eq!(lines[0], DB_LISTING);
    assert!(lines[1].starts_with("> Processing Issue: "));
    assert!(lines[1].contains("syntax error"));
    assert_eq!(ctx.pool.in_flight(), 0);
}

fn path_catalog() -> QueryCatalog {
    QueryCatalog::new(vec![QueryDefinition {
        id: PATH_LISTING.to_string(),
        statement: "SELECT tbl_name, location FROM tbls WHERE db_name = ANY($1)".to_string(),
        parameters: vec![ParameterDef {
            name: "dbs".to_string(),
            kind: ParameterKind::TextList,
            default: None,
        }],
    }])
}

#[tokio::test]
async fn test_query_test_mode_binds_entity_parameter() {
    let catalog = path_catalog();
    let source = listing_source(&["db1"]).with_handler(PATH_LISTING, move |overrides| {
        catalog.bind(PATH_LISTING, overrides)?;
        Ok(names_table(&["t1"]))
    });
    let ctx = default_context(source.clone());
    let mut config = dbset_config("scan");
    config.paths_listing_query = Some(PATH_LISTING.to_string());
    config.test_sql = true;
    let process = process(config, &ctx);

    let report = process.test_mode().await.unwrap();
    assert_eq!(report.items_ok, Some(true));
    assert!(report.passed());
    assert!(process.error_sink().unwrap().lines().is_empty());

    let (_, overrides) = source
        .calls()
        .into_iter()
        .find(|(template, _)| template == PATH_LISTING)
        .unwrap();
    assert_eq!(overrides["dbs"], ParameterValue::Text(String::new()));
}

#[tokio::test]
async fn test_query_test_mode_samples_first_override() {
    let source = listing_source(&["db1"]).with_table(PATH_LISTING, names_table(&["t1"]));
    let ctx = default_context(source.clone());
    let mut config = dbset_config("scan");
    config.paths_listing_query = Some(PATH_LISTING.to_string());
    config.dbs_override = vec!["sales".to_string(), "hr".to_string()];
    config.test_sql = true;
    let process = process(config, &ctx);

    process.test_mode().await.unwrap();
    let (_, overrides) = source
        .calls()
        .into_iter()
        .find(|(template, _)| template == PATH_LISTING)
        .unwrap();
    assert_eq!(overrides["dbs"], ParameterValue::Text("sales".to_string()));
}

#[tokio::test]
async fn test_run_resolves_and_dispatches() {
    let ctx = default_context(listing_source(&["db1", "db2"]));
    let mut config = dbset_config("scan");
    config.command_checks = vec![rule_check("dirs")];
    let process = process(config, &ctx);

    assert_eq!(process.run().await.unwrap(), RunOutcome::Dispatched { entities: 2 });
    assert_eq!(ctx.pool.join_all().await.completed, 2);
}

#[tokio::test]
async fn test_uninitialized_process_is_rejected() {
    let process = DbSetProcess::new(dbset_config("scan")).unwrap();
    assert!(matches!(
        process.resolve_entities().await,
        Err(SweepError::Task { .. })
    ));
    assert!(process.output_details().is_empty());
}

#[tokio::test]
async fn test_output_details_list_dedicated_files() {
    let ctx = default_context(MockQuerySource::new());
    let mut config = dbset_config("scan");
    let mut check = CommandCheck::new("missing");
    check.error_filename = Some("missing.txt".to_string());
    check.error_description = Some("Missing locations".to_string());
    config.command_checks = vec![check, CommandCheck::new("other")];
    let process = process(config, &ctx);

    let details = process.output_details();
    assert_eq!(details.len(), 3);
    assert_eq!(details[0], "\tscan results -> success.txt");
    assert_eq!(details[2], "\tMissing locations -> missing.txt");
}

#[tokio::test]
async fn test_outcomes_are_counted_per_check() {
    let runner = ScriptedCheckRunner::new().with("b", "db1", Scripted::Fail);
    let ctx = memory_run_context(MockQuerySource::new(), MockContextProvider::new(), Arc::new(runner));
    let mut config = dbset_config("scan");
    config.command_checks = vec![rule_check("a"), rule_check("b")];
    let process = process(config, &ctx);

    process.dispatch(&["db1".to_string()]).await.unwrap();
    ctx.pool.join_all().await;

    let snapshot = process.counters().unwrap().snapshot();
    assert_eq!(snapshot.checks["a"].pass, 1);
    assert_eq!(snapshot.checks["b"].fail, 1);
    assert_eq!(snapshot.task_states[&TaskState::Completed], 1);
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

mod prop_tests {
    use super::*;
    use dbsweep_test_utils::generators::{
        arb_command_check, arb_entity_names, arb_names_table,
    };
    use proptest::prelude::*;
    use regex::Regex;

    const PROCESS_TITLE: &str = "# Location scan";

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// Route `check` to dedicated files and return (success, error) lines.
    fn routed_lines(mut check: CommandCheck) -> (Vec<String>, Vec<String>) {
        check.success_filename = Some("ok.txt".to_string());
        check.error_filename = Some("err.txt".to_string());
        let ctx = default_context(MockQuerySource::new());
        let mut config = dbset_config("scan");
        config.title = Some(PROCESS_TITLE.to_string());
        config.command_checks = vec![check];
        process(config, &ctx);

        let success = ctx.output.open("ok.txt").unwrap().lines();
        let error = ctx.output.open("err.txt").unwrap().lines();
        (success, error)
    }

    proptest! {
        #[test]
        fn prop_headers_follow_truth_table(check in arb_command_check()) {
            let (success, error) = routed_lines(check.clone());

            let display: Vec<String> = check.display_lines().map(str::to_string).collect();
            let expected = |enabled: bool| {
                let mut lines = vec![PROCESS_TITLE.to_string()];
                if enabled {
                    lines.extend(display.iter().cloned());
                }
                lines
            };
            prop_assert_eq!(success, expected(check.process_on_success));
            prop_assert_eq!(error, expected(check.process_on_error));
        }

        #[test]
        fn prop_inversion_does_not_change_headers(check in arb_command_check()) {
            let mut flipped = check.clone();
            flipped.invert_check = !check.invert_check;
            prop_assert_eq!(routed_lines(check), routed_lines(flipped));
        }

        #[test]
        fn prop_include_keeps_full_matches_in_order(table in arb_names_table(20)) {
            let names = table.get_column("name").unwrap();
            let ctx = default_context(MockQuerySource::new().with_table(DB_LISTING, table));
            let mut config = dbset_config("scan");
            config.include_regex = Some("[a-m].*".to_string());
            let process = process(config, &ctx);

            let entities = runtime().block_on(process.resolve_entities()).unwrap();
            let pattern = Regex::new("^(?:[a-m].*)$").unwrap();
            let expected: Vec<String> = names.into_iter().filter(|n| pattern.is_match(n)).collect();
            prop_assert_eq!(entities, expected);
        }

        #[test]
        fn prop_constructed_counts_every_entity(entities in arb_entity_names(12)) {
            let ctx = default_context(MockQuerySource::new());
            let mut config = dbset_config("scan");
            config.command_checks = vec![rule_check("dirs")];
            let process = process(config, &ctx);
            let counters = process.counters().unwrap();

            let summary = runtime().block_on(async {
                let submitted = process.dispatch(&entities).await.unwrap();
                assert_eq!(counters.task_state(TaskState::Constructed), submitted as u64);
                ctx.pool.join_all().await
            });
            prop_assert_eq!(summary.completed, entities.len());
            prop_assert_eq!(counters.check_counts("dirs").unwrap().pass, entities.len() as u64);
        }
    }
}
