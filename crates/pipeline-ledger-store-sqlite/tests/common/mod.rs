// crates/pipeline-ledger-store-sqlite/tests/common/mod.rs
// ============================================================================
// Module: Common Store Fixtures
// Description: Shared helpers for SQLite ledger store tests.
// Purpose: Open isolated stores and write legacy rows directly.
// Dependencies: pipeline-ledger-core, pipeline-ledger-store-sqlite, rusqlite
// ============================================================================

//! ## Overview
//! Every helper opens stores through a fresh [`InitRegistry`] so tests never
//! share initialization state through the process-wide registry. Legacy rows
//! are written with raw SQL, matching how the old pipeline stored them.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(clippy::unwrap_used, reason = "Test-only assertions and helpers are permitted.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use pipeline_ledger_core::ExecutorName;
use pipeline_ledger_core::NewOperation;
use pipeline_ledger_core::NewTask;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_store_sqlite::DEFAULT_PLAN_ID;
use pipeline_ledger_store_sqlite::InitRegistry;
use pipeline_ledger_store_sqlite::LedgerStore;
use pipeline_ledger_store_sqlite::SqliteStoreConfig;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Returns the store file path inside `temp`.
pub fn store_path(temp: &TempDir) -> PathBuf {
    temp.path().join("ledger.sqlite")
}

/// Opens a store at `path` through its own registry.
pub fn open_at(path: &Path) -> LedgerStore {
    LedgerStore::open_with_registry(SqliteStoreConfig::new(path), Arc::new(InitRegistry::new()))
        .unwrap()
}

/// Opens a store in `temp` through its own registry.
pub fn open_store(temp: &TempDir) -> LedgerStore {
    open_at(&store_path(temp))
}

/// Opens a raw connection for fixture writes and assertions.
pub fn raw(path: &Path) -> Connection {
    Connection::open(path).unwrap()
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Builds a running task request for `org`.
pub fn new_task(task: &str, org: &str) -> NewTask {
    NewTask::running(
        TaskId::new(task),
        PlanId::new(DEFAULT_PLAN_ID),
        OrgId::new(org),
        Payload::new(json!({"org_id": org, "language": "english"})),
    )
}

/// Builds an operation request with a small input payload.
pub fn new_operation(task: &str, executor: &str, runtime: u32, chain: u32) -> NewOperation {
    NewOperation {
        task_id: TaskId::new(task),
        executor_name: ExecutorName::new(executor),
        runtime_index: runtime,
        chain_index: chain,
        input_data: Payload::new(json!({"step": executor})),
    }
}

// ============================================================================
// SECTION: Legacy Rows
// ============================================================================

/// Inserts a legacy execution row; timestamps are `YYYY-MM-DD HH:MM:SS` text.
pub fn insert_execution(
    connection: &Connection,
    execution_id: &str,
    status: &str,
    config_json: Option<&str>,
    started_at: &str,
    completed_at: Option<&str>,
) {
    connection
        .execute(
            "INSERT INTO executions (execution_id, org_id, org_name, customer_website, \
             customer_name, status, started_at, completed_at, config_json)
             VALUES (?1, 'org-a', 'Acme', 'https://acme.example', 'Acme Buyer', ?2, ?3, ?4, ?5)",
            params![execution_id, status, started_at, completed_at, config_json],
        )
        .unwrap();
}

/// Legacy stage result fixture.
pub struct LegacyStage<'a> {
    /// Row identifier.
    pub id: &'a str,
    /// Owning execution.
    pub execution_id: &'a str,
    /// Stage name.
    pub stage_name: &'a str,
    /// Legacy status label.
    pub status: &'a str,
    /// Output text, stored verbatim.
    pub output_data: Option<&'a str>,
    /// Error message.
    pub error_message: Option<&'a str>,
    /// Start time text.
    pub started_at: &'a str,
}

/// Inserts a legacy stage result row.
pub fn insert_stage(connection: &Connection, stage: &LegacyStage<'_>) {
    connection
        .execute(
            "INSERT INTO stage_results (id, execution_id, stage_name, status, input_data, \
             output_data, started_at, completed_at, error_message)
             VALUES (?1, ?2, ?3, ?4, '{\"source\": \"legacy\"}', ?5, ?6, ?6, ?7)",
            params![
                stage.id,
                stage.execution_id,
                stage.stage_name,
                stage.status,
                stage.output_data,
                stage.started_at,
                stage.error_message
            ],
        )
        .unwrap();
}

/// Counts rows in `table`.
pub fn count(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), params![], |row| row.get(0))
        .unwrap()
}
