// crates/pipeline-ledger-store-sqlite/tests/task_repository.rs
// ============================================================================
// Module: SQLite Task Repository Tests
// Description: Task create/update/append/list behavior over SQLite.
// Purpose: Validate wholesale upsert, message ordering, and lenient decoding.
// ============================================================================

//! ## Overview
//! Exercises [`TaskRepository`] on the `SQLite` ledger store:
//! - Request bodies round-trip exactly
//! - Re-creating a task replaces the row entirely
//! - Messages keep append order with non-decreasing timestamps
//! - Listing filters by organization and status, newest first
//! - Malformed stored JSON degrades to neutral values

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::panic_in_result_fn,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use pipeline_ledger_core::NewTask;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::TaskFilter;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_core::TaskRepository;
use pipeline_ledger_core::TaskStatus;
use proptest::prelude::*;
use rusqlite::params;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use crate::common::new_task;
use crate::common::open_store;
use crate::common::raw;
use crate::common::store_path;

// ============================================================================
// SECTION: Round Trip
// ============================================================================

fn payload_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::from),
    ];
    prop::collection::btree_map("[a-z_]{1,8}", leaf, 0..6)
        .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<String, Value>>()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn request_body_round_trips_exactly(body in payload_strategy()) {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let task = NewTask::running(
            TaskId::new("task-prop"),
            PlanId::new("plan-default-v1"),
            OrgId::new("org-a"),
            Payload::new(body),
        );
        store.create_task(&task).unwrap();
        let loaded = store.get_task(&task.task_id).unwrap().unwrap();
        prop_assert_eq!(loaded.request_body, task.request_body);
    }
}

#[test]
fn get_task_returns_none_when_missing() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    assert!(store.get_task(&TaskId::new("missing")).unwrap().is_none());
}

#[test]
fn create_task_sets_initial_fields() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store.create_task(&new_task("task-1", "org-a")).unwrap();

    let task = store.get_task(&TaskId::new("task-1")).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.current_runtime_index, 0);
    assert!(task.messages.is_empty());
    assert_eq!(task.created_at, task.updated_at);
    assert_eq!(task.request_body.get("language"), Some(&json!("english")));
}

#[test]
fn create_task_overwrites_existing_row_wholesale() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let task_id = TaskId::new("task-1");
    store.create_task(&new_task("task-1", "org-a")).unwrap();
    store.append_task_message(&task_id, "first attempt").unwrap();
    store.update_task_status(&task_id, TaskStatus::Failed, Some(2)).unwrap();

    let mut replacement = new_task("task-1", "org-b");
    replacement.request_body = Payload::new(json!({"language": "german"}));
    store.create_task(&replacement).unwrap();

    let task = store.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.org_id, OrgId::new("org-b"));
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.current_runtime_index, 0);
    assert!(task.messages.is_empty());
    assert_eq!(task.request_body, Payload::new(json!({"language": "german"})));
}

// ============================================================================
// SECTION: Updates
// ============================================================================

#[test]
fn update_task_status_keeps_runtime_index_when_absent() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let task_id = TaskId::new("task-1");
    store.create_task(&new_task("task-1", "org-a")).unwrap();

    assert!(store.update_task_status(&task_id, TaskStatus::Running, Some(2)).unwrap());
    assert!(store.update_task_status(&task_id, TaskStatus::Completed, None).unwrap());

    let task = store.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.current_runtime_index, 2);
    assert!(task.updated_at >= task.created_at);
}

#[test]
fn update_and_append_report_missing_task() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let missing = TaskId::new("missing");
    assert!(!store.update_task_status(&missing, TaskStatus::Completed, None).unwrap());
    assert!(!store.append_task_message(&missing, "note").unwrap());
    assert!(store.get_task(&missing).unwrap().is_none());
}

#[test]
fn appended_messages_keep_order_and_monotonic_timestamps() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let task_id = TaskId::new("task-1");
    store.create_task(&new_task("task-1", "org-a")).unwrap();

    for text in ["queued", "scoring", "outreach sent"] {
        assert!(store.append_task_message(&task_id, text).unwrap());
    }

    let task = store.get_task(&task_id).unwrap().unwrap();
    let texts: Vec<&str> = task.messages.iter().map(|message| message.message.as_str()).collect();
    assert_eq!(texts, vec!["queued", "scoring", "outreach sent"]);
    assert!(task.messages.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

// ============================================================================
// SECTION: Listing
// ============================================================================

#[test]
fn list_tasks_filters_and_orders_newest_first() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store.create_task(&new_task("a-1", "org-a")).unwrap();
    store.create_task(&new_task("b-1", "org-b")).unwrap();
    store.create_task(&new_task("a-2", "org-a")).unwrap();
    store.create_task(&new_task("a-3", "org-a")).unwrap();
    store.update_task_status(&TaskId::new("a-2"), TaskStatus::Completed, None).unwrap();

    let ids = |filter: TaskFilter| -> Vec<String> {
        store
            .list_tasks(&filter)
            .unwrap()
            .into_iter()
            .map(|task| task.task_id.as_str().to_string())
            .collect()
    };

    assert_eq!(ids(TaskFilter::default()), vec!["a-3", "a-2", "b-1", "a-1"]);
    assert_eq!(
        ids(TaskFilter { org_id: Some(OrgId::new("org-a")), ..TaskFilter::default() }),
        vec!["a-3", "a-2", "a-1"]
    );
    assert_eq!(
        ids(TaskFilter { status: Some(TaskStatus::Completed), ..TaskFilter::default() }),
        vec!["a-2"]
    );
    assert_eq!(ids(TaskFilter { limit: 2, ..TaskFilter::default() }), vec!["a-3", "a-2"]);
}

// ============================================================================
// SECTION: Lenient Decoding
// ============================================================================

#[test]
fn malformed_stored_json_degrades_to_neutral_values() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store.create_task(&new_task("task-1", "org-a")).unwrap();
    raw(&store_path(&temp))
        .execute(
            "UPDATE tasks SET messages = 'not json', request_body = '{broken', \
             current_runtime_index = -4 WHERE task_id = ?1",
            params!["task-1"],
        )
        .unwrap();

    let task = store.get_task(&TaskId::new("task-1")).unwrap().unwrap();
    assert!(task.messages.is_empty());
    assert!(task.request_body.is_empty());
    assert_eq!(task.current_runtime_index, 0);

    assert!(store.append_task_message(&TaskId::new("task-1"), "recovered").unwrap());
    let task = store.get_task(&TaskId::new("task-1")).unwrap().unwrap();
    assert_eq!(task.messages.len(), 1);
}
