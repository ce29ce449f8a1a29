// crates/pipeline-ledger-store-sqlite/tests/migration_engine.rs
// ============================================================================
// Module: Legacy Migration Engine Tests
// Description: End-to-end migration, validation failure, and rollback.
// Purpose: Validate legacy conversion rules and byte-exact restoration.
// ============================================================================

//! ## Overview
//! Drives [`MigrationEngine`] against stores populated with legacy
//! `executions` and `stage_results` rows:
//! - Full migration converts statuses, payloads, timestamps, and chain order
//! - Orphaned operations fail validation and restore the backup exactly
//! - A step that fails midway writes none of its rows and reports partial
//!   counts
//! - Rollback picks the newest backup when none is named
//! - Missing legacy tables migrate nothing

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::fs;

use pipeline_ledger_core::ExecutionStatus;
use pipeline_ledger_core::ExecutorName;
use pipeline_ledger_core::LedgerQueries;
use pipeline_ledger_core::OperationId;
use pipeline_ledger_core::OperationRepository;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_core::TaskRepository;
use pipeline_ledger_core::TaskStatus;
use pipeline_ledger_core::Timestamp;
use pipeline_ledger_store_sqlite::DEFAULT_PLAN_ID;
use pipeline_ledger_store_sqlite::LedgerStore;
use pipeline_ledger_store_sqlite::MigrationEngine;
use pipeline_ledger_store_sqlite::MigrationError;
use pipeline_ledger_store_sqlite::MigrationState;
use serde_json::json;
use tempfile::TempDir;

use crate::common::LegacyStage;
use crate::common::count;
use crate::common::insert_execution;
use crate::common::insert_stage;
use crate::common::new_operation;
use crate::common::new_task;
use crate::common::open_store;
use crate::common::raw;
use crate::common::store_path;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// 2024-01-01 00:00:00 UTC in unix millis.
const JAN_1: i64 = 1_704_067_200_000;

/// One day in millis.
const DAY: i64 = 86_400_000;

/// Writes three executions (two completed, one failed) and five stage
/// results split three/two between the first two executions.
fn seed_legacy(temp: &TempDir) {
    let conn = raw(&store_path(temp));
    insert_execution(
        &conn,
        "exec-1",
        "completed",
        Some(r#"{"customer_name": "Beta", "customer_website": "https://beta.example", "language": "german"}"#),
        "2024-01-01 00:00:00",
        Some("2024-01-01 00:10:00"),
    );
    insert_execution(
        &conn,
        "exec-2",
        "completed",
        None,
        "2024-01-02 00:00:00",
        Some("2024-01-02 00:05:00"),
    );
    insert_execution(&conn, "exec-3", "failed", Some("{broken"), "2024-01-03 00:00:00", None);

    for stage in [
        LegacyStage {
            id: "s-3",
            execution_id: "exec-1",
            stage_name: "lead_scoring",
            status: "failed",
            output_data: Some(r#"{"partial": true}"#),
            error_message: Some("model timeout"),
            started_at: "2024-01-01 00:03:00",
        },
        LegacyStage {
            id: "s-1",
            execution_id: "exec-1",
            stage_name: "data_acquisition",
            status: "success",
            output_data: Some(r#"{"pages": 4}"#),
            error_message: None,
            started_at: "2024-01-01 00:01:00",
        },
        LegacyStage {
            id: "s-2",
            execution_id: "exec-1",
            stage_name: "data_preparation",
            status: "success",
            output_data: Some("not json"),
            error_message: None,
            started_at: "2024-01-01 00:02:00",
        },
        LegacyStage {
            id: "s-5",
            execution_id: "exec-2",
            stage_name: "data_preparation",
            status: "pending",
            output_data: None,
            error_message: None,
            started_at: "2024-01-02 00:02:00",
        },
        LegacyStage {
            id: "s-4",
            execution_id: "exec-2",
            stage_name: "data_acquisition",
            status: "success",
            output_data: Some("{}"),
            error_message: None,
            started_at: "2024-01-02 00:01:00",
        },
    ] {
        insert_stage(&conn, &stage);
    }
}

fn executors(store: &LedgerStore, task: &str) -> Vec<String> {
    store
        .get_operations_by_task(&TaskId::new(task))
        .unwrap()
        .into_iter()
        .map(|operation| operation.executor_name.as_str().to_string())
        .collect()
}

// ============================================================================
// SECTION: Full Migration
// ============================================================================

#[test]
fn full_migration_converts_legacy_history() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_legacy(&temp);

    let mut engine = MigrationEngine::new(&store);
    assert_eq!(engine.state(), MigrationState::NotStarted);
    let report = engine.execute_full_migration();

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.state, MigrationState::Committed);
    assert_eq!(report.task_count, 3);
    assert_eq!(report.operation_count, 5);
    assert!(report.backup_path.as_ref().unwrap().is_file());

    let first = store.get_task(&TaskId::new("exec-1")).unwrap().unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(first.plan_id, PlanId::new(DEFAULT_PLAN_ID));
    assert_eq!(first.plan_id.as_str(), "569cdcbd-cf6d-4e33-b0b2-d2f6f15a0832");
    assert_eq!(first.created_at, Timestamp::from_unix_millis(JAN_1));
    assert_eq!(first.updated_at, Timestamp::from_unix_millis(JAN_1 + 600_000));
    assert_eq!(
        first.request_body,
        Payload::new(json!({
            "org_id": "org-a",
            "org_name": "Acme",
            "customer_info": "Beta",
            "language": "german",
            "input_website": "https://beta.example",
            "execution_id": "exec-1",
        }))
    );
    let second = store.get_task(&TaskId::new("exec-2")).unwrap().unwrap();
    assert!(second.request_body.is_empty());
    let third = store.get_task(&TaskId::new("exec-3")).unwrap().unwrap();
    assert_eq!(third.status, TaskStatus::Failed);
    assert_eq!(third.created_at, Timestamp::from_unix_millis(JAN_1 + 2 * DAY));
    assert_eq!(third.updated_at, third.created_at);
    assert_eq!(third.request_body, Payload::new(json!({"org_id": "org-a", "org_name": "Acme"})));

    assert_eq!(
        executors(&store, "exec-1"),
        vec!["data_acquisition", "data_preparation", "lead_scoring"]
    );
    assert_eq!(executors(&store, "exec-2"), vec!["data_acquisition", "data_preparation"]);

    let scoring =
        store.get_operation(&OperationId::new("exec-1_lead_scoring_0_2")).unwrap().unwrap();
    assert_eq!(scoring.execution_status, ExecutionStatus::Failed);
    assert_eq!(
        scoring.output_data,
        Payload::new(json!({"partial": true, "error": "model timeout"}))
    );
    assert_eq!(scoring.input_data, Payload::new(json!({"source": "legacy"})));
    let preparation =
        store.get_operation(&OperationId::new("exec-1_data_preparation_0_1")).unwrap().unwrap();
    assert_eq!(preparation.execution_status, ExecutionStatus::Done);
    assert_eq!(preparation.output_data, Payload::new(json!({"raw_output": "not json"})));
    let pending =
        store.get_operation(&OperationId::new("exec-2_data_preparation_0_1")).unwrap().unwrap();
    assert_eq!(pending.execution_status, ExecutionStatus::Running);
    assert!(pending.output_data.is_empty());

    let failures = LedgerQueries::new(&store).recent_failures(None, None, 10).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_summary, "model timeout");

    let conn = raw(&store_path(&temp));
    assert_eq!(count(&conn, "executions"), 3);
    assert_eq!(count(&conn, "stage_results"), 5);
}

#[test]
fn rerunning_migration_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_legacy(&temp);

    assert!(MigrationEngine::new(&store).execute_full_migration().success);
    let report = MigrationEngine::new(&store).execute_full_migration();
    assert!(report.success, "errors: {:?}", report.errors);

    let conn = raw(&store_path(&temp));
    assert_eq!(count(&conn, "tasks"), 3);
    assert_eq!(count(&conn, "operations"), 5);
}

#[test]
fn missing_legacy_tables_migrate_nothing() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    raw(&store_path(&temp))
        .execute_batch("DROP TABLE stage_results; DROP TABLE executions;")
        .unwrap();

    let mut engine = MigrationEngine::new(&store);
    assert_eq!(engine.migrate_executions_to_tasks().unwrap(), 0);
    assert_eq!(engine.migrate_stage_results_to_operations().unwrap(), 0);
    let validation = engine.validate();
    assert!(!validation.is_valid());
    assert!(validation.errors.iter().any(|error| error.contains("executions")));
}

// ============================================================================
// SECTION: Failure and Rollback
// ============================================================================

#[test]
fn orphaned_operation_fails_validation_and_restores_backup() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let store = open_store(&temp);
    seed_legacy(&temp);
    raw(&path)
        .execute_batch(
            "PRAGMA foreign_keys = OFF; INSERT INTO operations (operation_id, task_id, executor_name, runtime_index, \
             chain_index, execution_status, input_data, output_data, date_created, date_updated)
             VALUES ('ghost_follow_up_0_0', 'ghost', 'follow_up', 0, 0, 'done', '{}', '{}', 1, 2);",
        )
        .unwrap();

    let mut engine = MigrationEngine::new(&store);
    let report = engine.execute_full_migration();

    assert!(!report.success);
    assert_eq!(report.state, MigrationState::RolledBack);
    assert_eq!(engine.state(), MigrationState::RolledBack);
    assert!(report.errors.iter().any(|error| error.contains("orphaned")));
    assert!(report.errors.iter().any(|error| error.contains("stage count mismatch")));

    let backup = report.backup_path.unwrap();
    assert_eq!(fs::read(&path).unwrap(), fs::read(&backup).unwrap());
    assert_eq!(count(&raw(&path), "tasks"), 0);
    assert!(!store.registry().is_initialized(store.location()));

    let snapshots = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().contains(".pre_rollback_"))
        .count();
    assert_eq!(snapshots, 1);
}

#[test]
fn failing_operation_step_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    seed_legacy(&temp);
    store.create_operation(&new_operation("exec-1", "follow_up", 0, 1)).unwrap();

    let mut engine = MigrationEngine::new(&store);
    assert_eq!(engine.migrate_executions_to_tasks().unwrap(), 3);
    let Err(err) = engine.migrate_stage_results_to_operations() else {
        panic!("expected occupied slot to fail the operation step");
    };
    assert!(matches!(err, MigrationError::Step { .. }));
    assert_eq!(engine.state(), MigrationState::TasksMigrated);

    assert_eq!(executors(&store, "exec-1"), vec!["follow_up"]);
    assert!(executors(&store, "exec-2").is_empty());
    assert_eq!(count(&raw(&store_path(&temp)), "operations"), 1);
}

#[test]
fn mid_step_failure_reports_partial_counts_and_restores_backup() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let store = open_store(&temp);
    seed_legacy(&temp);
    store.create_operation(&new_operation("exec-1", "follow_up", 0, 1)).unwrap();

    let mut engine = MigrationEngine::new(&store);
    let report = engine.execute_full_migration();

    assert!(!report.success);
    assert_eq!(report.state, MigrationState::RolledBack);
    assert_eq!(report.task_count, 3);
    assert_eq!(report.operation_count, 0);
    assert!(report.errors.iter().any(|error| error.contains("(exec-1, 0, 1) already taken")));

    let backup = report.backup_path.unwrap();
    assert_eq!(fs::read(&path).unwrap(), fs::read(&backup).unwrap());
    assert_eq!(executors(&store, "exec-1"), vec!["follow_up"]);
    assert_eq!(count(&raw(&path), "tasks"), 0);
}

#[test]
fn rollback_without_path_uses_newest_backup() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let mut engine = MigrationEngine::new(&store);
    let older = engine.backup().unwrap();
    let newer = engine.backup().unwrap();
    assert_eq!(engine.state(), MigrationState::BackedUp);
    assert_eq!(engine.list_backups().unwrap(), vec![older, newer.clone()]);

    store.create_task(&new_task("task-after-backup", "org-a")).unwrap();
    let restored = engine.rollback(None).unwrap();

    assert_eq!(restored, newer);
    assert_eq!(engine.state(), MigrationState::RolledBack);
    assert!(store.get_task(&TaskId::new("task-after-backup")).unwrap().is_none());
    assert!(engine.list_backups().unwrap().iter().all(|path| {
        !path.to_string_lossy().contains("pre_rollback")
    }));
}

#[test]
fn rollback_without_backups_reports_no_backup() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let mut engine = MigrationEngine::new(&store);
    let Err(err) = engine.rollback(None) else {
        panic!("expected rollback without backups to fail");
    };
    assert!(matches!(err, MigrationError::NoBackup(_)));
    assert_eq!(engine.state(), MigrationState::NotStarted);
    assert!(store.get_task(&TaskId::new("anything")).unwrap().is_none());
    assert_eq!(
        store.get_operations_by_executor(&ExecutorName::new("lead_scoring"), None, None).unwrap(),
        Vec::new()
    );
}
