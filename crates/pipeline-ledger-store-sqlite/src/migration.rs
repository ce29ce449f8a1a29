// crates/pipeline-ledger-store-sqlite/src/migration.rs
// ============================================================================
// Module: Legacy Migration Engine
// Description: Converts legacy execution tables into tasks and operations.
// Purpose: Move history to the current schema with backup, validation, and rollback.
// Dependencies: pipeline-ledger-core, rusqlite, serde_json, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! A full migration walks `NotStarted -> BackedUp -> TasksMigrated ->
//! OperationsMigrated -> Validated -> Committed`. Every step after the backup
//! runs in a single transaction, so a crash mid-step leaves no half-written
//! rows. Any failure restores the file from the backup taken at the start,
//! after snapshotting the failed state next to it; the restored file is
//! byte-for-byte the backup.
//!
//! Legacy `stage_results` rows carry no attempt indices: every migrated
//! operation gets `runtime_index = 0` and a `chain_index` counting arrival
//! order within its execution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use pipeline_ledger_core::ExecutionStatus;
use pipeline_ledger_core::ExecutorName;
use pipeline_ledger_core::NewTask;
use pipeline_ledger_core::OperationId;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_core::TaskStatus;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::operations::OperationWrite;
use crate::operations::upsert_operation;
use crate::reference::DEFAULT_PLAN_ID;
use crate::schema::table_exists;
use crate::store::LedgerStore;
use crate::store::SqliteStoreError;
use crate::store::SqliteStoreMode;
use crate::store::unix_millis;
use crate::tasks::TaskWrite;
use crate::tasks::upsert_task;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// UTC timestamp format used in backup and snapshot file names.
const FILE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Length of a rendered [`FILE_STAMP`].
const FILE_STAMP_LEN: usize = 15;

/// File-name marker for pre-migration backups.
const BACKUP_MARKER: &str = "backup";

/// File-name marker for snapshots taken before a rollback.
const PRE_ROLLBACK_MARKER: &str = "pre_rollback";

/// Number of migrated rows whose payloads are re-parsed during validation.
const VALIDATION_SAMPLE: i64 = 10;

/// Converts `julianday` values to unix milliseconds in SQL.
const JULIAN_TO_MILLIS: &str = "CAST(ROUND((julianday({}) - 2440587.5) * 86400000.0) AS INTEGER)";

/// Step label for the task migration.
const TASKS_STEP: &str = "executions_to_tasks";

/// Step label for the operation migration.
const OPERATIONS_STEP: &str = "stage_results_to_operations";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Position of the engine in the migration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Nothing has run.
    NotStarted,
    /// The store file was copied to a backup.
    BackedUp,
    /// Legacy executions were written as tasks.
    TasksMigrated,
    /// Legacy stage results were written as operations.
    OperationsMigrated,
    /// Post-migration validation passed.
    Validated,
    /// The migration finished and its results stand.
    Committed,
    /// The store file was restored from a backup.
    RolledBack,
}

/// Migration engine errors.
#[derive(Debug, Error, Clone)]
pub enum MigrationError {
    /// The backup could not be written; nothing was mutated.
    #[error("migration backup failed: {0}")]
    Backup(String),
    /// A migration step failed.
    #[error("migration step {step} failed: {message}")]
    Step {
        /// Step label.
        step: &'static str,
        /// Failure description.
        message: String,
    },
    /// Post-migration validation found problems.
    #[error("migration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Restoring from a backup failed.
    #[error("migration rollback failed: {0}")]
    Rollback(String),
    /// No backup exists to roll back to.
    #[error("no migration backup found for {0}")]
    NoBackup(String),
}

impl From<MigrationError> for SqliteStoreError {
    fn from(error: MigrationError) -> Self {
        Self::Migration(error.to_string())
    }
}

/// Problems found by [`MigrationEngine::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Every violation found; empty when validation passed.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns true when no violation was found.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of [`MigrationEngine::execute_full_migration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// True when the migration committed.
    pub success: bool,
    /// State the engine finished in.
    pub state: MigrationState,
    /// Tasks written before completion or failure.
    pub task_count: usize,
    /// Operations written before completion or failure.
    pub operation_count: usize,
    /// Backup taken at the start, if any.
    pub backup_path: Option<PathBuf>,
    /// Failure descriptions; empty on success.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Legacy Rows
// ============================================================================

/// Legacy `executions` row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LegacyExecution {
    /// Execution identifier; becomes the task identifier.
    execution_id: String,
    /// Organization identifier.
    org_id: String,
    /// Organization display name.
    org_name: Option<String>,
    /// Customer website.
    customer_website: Option<String>,
    /// Customer name.
    customer_name: Option<String>,
    /// Legacy status label.
    status: Option<String>,
    /// Legacy configuration JSON.
    config_json: Option<String>,
    /// Start time in unix millis.
    started_at: Option<i64>,
    /// Completion time in unix millis.
    completed_at: Option<i64>,
}

/// Legacy `stage_results` row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LegacyStageResult {
    /// Owning execution identifier.
    execution_id: String,
    /// Stage name; becomes the executor name.
    stage_name: String,
    /// Legacy status label.
    status: Option<String>,
    /// Input JSON text.
    input_data: Option<String>,
    /// Output JSON text.
    output_data: Option<String>,
    /// Error message recorded for failed stages.
    error_message: Option<String>,
    /// Start time in unix millis.
    started_at: Option<i64>,
    /// Completion time in unix millis.
    completed_at: Option<i64>,
}

/// Builds a task request body from a legacy execution.
///
/// Parsable configuration yields the full pipeline input shape; unparsable
/// configuration keeps only the organization; absent configuration is empty.
fn legacy_request_body(row: &LegacyExecution) -> Payload {
    let Some(config) = row.config_json.as_deref().filter(|text| !text.trim().is_empty()) else {
        return Payload::empty();
    };
    let Ok(config) = serde_json::from_str::<Value>(config) else {
        return Payload::new(json!({"org_id": row.org_id, "org_name": row.org_name}));
    };
    let text = |key: &str, fallback: Option<&String>| {
        config
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| fallback.cloned())
            .unwrap_or_default()
    };
    Payload::new(json!({
        "org_id": row.org_id,
        "org_name": row.org_name,
        "customer_info": text("customer_name", row.customer_name.as_ref()),
        "language": config.get("language").and_then(Value::as_str).unwrap_or("english"),
        "input_website": text("customer_website", row.customer_website.as_ref()),
        "execution_id": row.execution_id,
    }))
}

/// Parses legacy JSON text, wrapping invalid text under `wrap_key`.
fn legacy_payload(text: Option<&str>, wrap_key: &str) -> Payload {
    let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
        return Payload::empty();
    };
    Payload::from_json_str(text).unwrap_or_else(|_| Payload::new(json!({ wrap_key: text })))
}

/// Records a legacy error message in the output payload.
fn fold_error(output: Payload, message: &str) -> Payload {
    match output.into_value() {
        Value::Object(mut map) => {
            map.insert("error".to_string(), Value::String(message.to_string()));
            Payload::new(Value::Object(map))
        }
        Value::Null => Payload::new(json!({"error": message})),
        other => Payload::new(json!({"output": other, "error": message})),
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Migration engine bound to one store.
///
/// # Invariants
/// - `state` reflects the last step that completed.
#[derive(Debug)]
pub struct MigrationEngine<'a> {
    /// Store being migrated.
    store: &'a LedgerStore,
    /// Current state.
    state: MigrationState,
}

impl<'a> MigrationEngine<'a> {
    /// Creates an engine in [`MigrationState::NotStarted`].
    #[must_use]
    pub const fn new(store: &'a LedgerStore) -> Self {
        Self { store, state: MigrationState::NotStarted }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> MigrationState {
        self.state
    }

    /// Copies the store file to `<store>.backup_<timestamp>`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Backup`] when the copy fails.
    pub fn backup(&mut self) -> Result<PathBuf, MigrationError> {
        if self.store.config().journal_mode == SqliteStoreMode::Wal {
            let connection =
                self.store.connect().map_err(|err| MigrationError::Backup(err.to_string()))?;
            connection
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", params![], |_| Ok(()))
                .map_err(|err| MigrationError::Backup(err.to_string()))?;
        }
        let target = unique_sibling(self.store.path(), BACKUP_MARKER)
            .map_err(|err| MigrationError::Backup(err.to_string()))?;
        fs::copy(self.store.path(), &target)
            .map_err(|err| MigrationError::Backup(err.to_string()))?;
        self.state = MigrationState::BackedUp;
        info!(backup = %target.display(), "ledger backup written");
        Ok(target)
    }

    /// Upserts every legacy execution as a task. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Step`] when reading or writing fails; the
    /// step's transaction is rolled back.
    pub fn migrate_executions_to_tasks(&mut self) -> Result<usize, MigrationError> {
        let mut connection = self.store.connect().map_err(|err| step_error(TASKS_STEP, &err))?;
        let has_legacy =
            table_exists(&connection, "executions").map_err(|err| step_error(TASKS_STEP, &err))?;
        if !has_legacy {
            info!("no legacy executions table; skipping task migration");
            return Ok(0);
        }
        let tx = connection.transaction().map_err(|err| step_error(TASKS_STEP, &err))?;
        let rows = read_legacy_executions(&tx).map_err(|err| step_error(TASKS_STEP, &err))?;
        let now = unix_millis();
        for row in &rows {
            let task = NewTask {
                task_id: TaskId::new(row.execution_id.as_str()),
                plan_id: PlanId::new(DEFAULT_PLAN_ID),
                org_id: OrgId::new(row.org_id.as_str()),
                request_body: legacy_request_body(row),
                status: TaskStatus::from_legacy(row.status.as_deref().unwrap_or_default()),
            };
            let created_at = row.started_at.unwrap_or(now);
            let write = TaskWrite {
                task: &task,
                current_runtime_index: 0,
                created_at,
                updated_at: row.completed_at.unwrap_or(created_at),
            };
            upsert_task(&tx, &write).map_err(|err| step_error(TASKS_STEP, &err))?;
        }
        tx.commit().map_err(|err| step_error(TASKS_STEP, &err))?;
        self.state = MigrationState::TasksMigrated;
        info!(count = rows.len(), "migrated legacy executions to tasks");
        Ok(rows.len())
    }

    /// Upserts every legacy stage result as an operation. Returns the number
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Step`] when reading or writing fails; the
    /// step's transaction is rolled back.
    pub fn migrate_stage_results_to_operations(&mut self) -> Result<usize, MigrationError> {
        let mut connection =
            self.store.connect().map_err(|err| step_error(OPERATIONS_STEP, &err))?;
        let has_legacy = table_exists(&connection, "stage_results")
            .map_err(|err| step_error(OPERATIONS_STEP, &err))?;
        if !has_legacy {
            info!("no legacy stage_results table; skipping operation migration");
            return Ok(0);
        }
        let tx = connection.transaction().map_err(|err| step_error(OPERATIONS_STEP, &err))?;
        let rows =
            read_legacy_stage_results(&tx).map_err(|err| step_error(OPERATIONS_STEP, &err))?;
        let now = unix_millis();
        let mut current_execution: Option<&str> = None;
        let mut chain_index: u32 = 0;
        for row in &rows {
            if current_execution != Some(row.execution_id.as_str()) {
                current_execution = Some(row.execution_id.as_str());
                chain_index = 0;
            }
            let status = ExecutionStatus::from_legacy(row.status.as_deref().unwrap_or_default());
            let mut output = legacy_payload(row.output_data.as_deref(), "raw_output");
            if status == ExecutionStatus::Failed
                && let Some(message) = row.error_message.as_deref().filter(|m| !m.is_empty())
            {
                output = fold_error(output, message);
            }
            let task_id = TaskId::new(row.execution_id.as_str());
            let executor_name = ExecutorName::new(row.stage_name.as_str());
            let operation_id = OperationId::compose(&task_id, &executor_name, 0, chain_index);
            let input = legacy_payload(row.input_data.as_deref(), "raw_input");
            let date_created = row.started_at.unwrap_or(now);
            let write = OperationWrite {
                operation_id: &operation_id,
                task_id: &task_id,
                executor_name: &executor_name,
                runtime_index: 0,
                chain_index,
                execution_status: status,
                input_data: &input,
                output_data: &output,
                date_created,
                date_updated: row.completed_at.unwrap_or(date_created),
            };
            upsert_operation(&tx, &write).map_err(|err| step_error(OPERATIONS_STEP, &err))?;
            chain_index = chain_index.saturating_add(1);
        }
        tx.commit().map_err(|err| step_error(OPERATIONS_STEP, &err))?;
        self.state = MigrationState::OperationsMigrated;
        info!(count = rows.len(), "migrated legacy stage results to operations");
        Ok(rows.len())
    }

    /// Checks the migrated data; every violation is collected.
    pub fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();
        match self.store.connect() {
            Ok(connection) => {
                if let Err(err) = collect_violations(&connection, &mut report.errors) {
                    report.errors.push(format!("validation query failed: {err}"));
                }
            }
            Err(err) => report.errors.push(format!("cannot open store: {err}")),
        }
        if report.is_valid() {
            self.state = MigrationState::Validated;
        } else {
            warn!(violations = report.errors.len(), "migration validation failed");
        }
        report
    }

    /// Lists backups of this store, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Rollback`] when the directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, MigrationError> {
        let prefix = sibling_prefix(self.store.path(), BACKUP_MARKER)
            .map_err(|err| MigrationError::Rollback(err.to_string()))?;
        let directory = parent_dir(self.store.path());
        let entries =
            fs::read_dir(&directory).map_err(|err| MigrationError::Rollback(err.to_string()))?;
        let mut backups: Vec<((String, u32), PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let stamp = name.strip_prefix(&prefix)?;
                Some((backup_sort_key(stamp), entry.path()))
            })
            .filter(|(_, path)| path.is_file())
            .collect();
        backups.sort();
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    /// Restores the store file from `backup`, or from the newest backup.
    ///
    /// The current file is first copied to `<store>.pre_rollback_<timestamp>`.
    /// Returns the backup that was restored.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NoBackup`] when no backup exists, or
    /// [`MigrationError::Rollback`] when a copy fails.
    pub fn rollback(&mut self, backup: Option<&Path>) -> Result<PathBuf, MigrationError> {
        let source = match backup {
            Some(path) => path.to_path_buf(),
            None => self.list_backups()?.pop().ok_or_else(|| {
                MigrationError::NoBackup(self.store.path().display().to_string())
            })?,
        };
        if !source.is_file() {
            return Err(MigrationError::Rollback(format!(
                "backup {} does not exist",
                source.display()
            )));
        }
        let store_path = self.store.path();
        if store_path.exists() {
            let snapshot = unique_sibling(store_path, PRE_ROLLBACK_MARKER)
                .map_err(|err| MigrationError::Rollback(err.to_string()))?;
            fs::copy(store_path, &snapshot)
                .map_err(|err| MigrationError::Rollback(err.to_string()))?;
            info!(snapshot = %snapshot.display(), "pre-rollback snapshot written");
        }
        fs::copy(&source, store_path).map_err(|err| MigrationError::Rollback(err.to_string()))?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut side_file = store_path.as_os_str().to_os_string();
            side_file.push(suffix);
            let side_file = PathBuf::from(side_file);
            if side_file.exists()
                && let Err(err) = fs::remove_file(&side_file)
            {
                warn!(path = %side_file.display(), error = %err, "stale journal file not removed");
            }
        }
        self.store.registry().forget(self.store.location());
        self.state = MigrationState::RolledBack;
        warn!(backup = %source.display(), "ledger restored from backup");
        Ok(source)
    }

    /// Runs backup, both migration steps, and validation; rolls back on any
    /// failure after the backup.
    pub fn execute_full_migration(&mut self) -> MigrationReport {
        let mut report = MigrationReport {
            success: false,
            state: self.state,
            task_count: 0,
            operation_count: 0,
            backup_path: None,
            errors: Vec::new(),
        };
        let backup = match self.backup() {
            Ok(path) => path,
            Err(err) => {
                error!(error = %err, "migration aborted before any change");
                report.errors.push(err.to_string());
                report.state = self.state;
                return report;
            }
        };
        report.backup_path = Some(backup.clone());
        match self.run_steps(&mut report) {
            Ok(()) => {
                self.state = MigrationState::Committed;
                report.success = true;
                info!(
                    tasks = report.task_count,
                    operations = report.operation_count,
                    "ledger migration committed"
                );
            }
            Err(err) => {
                error!(error = %err, "ledger migration failed; rolling back");
                report.errors = match err {
                    MigrationError::Validation(errors) => errors,
                    other => vec![other.to_string()],
                };
                if let Err(rollback_err) = self.rollback(Some(&backup)) {
                    error!(error = %rollback_err, "ledger rollback failed");
                    report.errors.push(rollback_err.to_string());
                }
            }
        }
        report.state = self.state;
        report
    }

    /// Runs the steps between backup and commit, recording partial counts.
    fn run_steps(&mut self, report: &mut MigrationReport) -> Result<(), MigrationError> {
        report.task_count = self.migrate_executions_to_tasks()?;
        report.operation_count = self.migrate_stage_results_to_operations()?;
        let validation = self.validate();
        if validation.is_valid() {
            Ok(())
        } else {
            Err(MigrationError::Validation(validation.errors))
        }
    }
}

// ============================================================================
// SECTION: Legacy Reads
// ============================================================================

/// Reads every legacy execution in insertion order.
fn read_legacy_executions(connection: &Connection) -> rusqlite::Result<Vec<LegacyExecution>> {
    let sql = format!(
        "SELECT execution_id, org_id, org_name, customer_website, customer_name, status, \
         config_json, {}, {} FROM executions ORDER BY rowid",
        JULIAN_TO_MILLIS.replace("{}", "started_at"),
        JULIAN_TO_MILLIS.replace("{}", "completed_at")
    );
    let mut stmt = connection.prepare(&sql)?;
    let rows = stmt.query_map(params![], |row| {
        Ok(LegacyExecution {
            execution_id: row.get(0)?,
            org_id: row.get(1)?,
            org_name: row.get(2)?,
            customer_website: row.get(3)?,
            customer_name: row.get(4)?,
            status: row.get(5)?,
            config_json: row.get(6)?,
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
        })
    })?;
    rows.collect()
}

/// Reads every legacy stage result ordered by execution then start time.
fn read_legacy_stage_results(
    connection: &Connection,
) -> rusqlite::Result<Vec<LegacyStageResult>> {
    let sql = format!(
        "SELECT execution_id, stage_name, status, input_data, output_data, error_message, {}, {} \
         FROM stage_results ORDER BY execution_id, started_at, rowid",
        JULIAN_TO_MILLIS.replace("{}", "started_at"),
        JULIAN_TO_MILLIS.replace("{}", "completed_at")
    );
    let mut stmt = connection.prepare(&sql)?;
    let rows = stmt.query_map(params![], |row| {
        Ok(LegacyStageResult {
            execution_id: row.get(0)?,
            stage_name: row.get(1)?,
            status: row.get(2)?,
            input_data: row.get(3)?,
            output_data: row.get(4)?,
            error_message: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    })?;
    rows.collect()
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Appends every validation violation to `errors`.
fn collect_violations(
    connection: &Connection,
    errors: &mut Vec<String>,
) -> Result<(), SqliteStoreError> {
    for table in ["tasks", "operations"] {
        if !table_exists(connection, table)? {
            errors.push(format!("required table '{table}' not found"));
        }
    }
    for table in ["executions", "stage_results"] {
        if !table_exists(connection, table)? {
            errors.push(format!("legacy table '{table}' not found for rollback"));
        }
    }
    if !errors.is_empty() {
        return Ok(());
    }
    let executions = count(connection, "SELECT COUNT(*) FROM executions")?;
    let tasks = count(connection, "SELECT COUNT(*) FROM tasks")?;
    if executions != tasks {
        errors.push(format!("execution count mismatch: {executions} executions vs {tasks} tasks"));
    }
    let stages = count(connection, "SELECT COUNT(*) FROM stage_results")?;
    let operations = count(connection, "SELECT COUNT(*) FROM operations")?;
    if stages != operations {
        errors.push(format!(
            "stage count mismatch: {stages} stage_results vs {operations} operations"
        ));
    }
    let mut stmt = connection
        .prepare("SELECT operation_id, input_data, output_data FROM operations LIMIT ?1")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let samples = stmt
        .query_map(params![VALIDATION_SAMPLE], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    for sample in samples {
        let (operation_id, input, output) =
            sample.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        for (column, text) in [("input_data", input), ("output_data", output)] {
            if let Some(text) = text.filter(|text| !text.is_empty())
                && let Err(err) = serde_json::from_str::<Value>(&text)
            {
                errors.push(format!("invalid JSON in operation {operation_id} {column}: {err}"));
            }
        }
    }
    let orphans = count(
        connection,
        "SELECT COUNT(*) FROM operations o LEFT JOIN tasks t ON o.task_id = t.task_id WHERE \
         t.task_id IS NULL",
    )?;
    if orphans > 0 {
        errors.push(format!("found {orphans} orphaned operations"));
    }
    Ok(())
}

/// Runs a `COUNT(*)` query.
fn count(connection: &Connection, sql: &str) -> Result<i64, SqliteStoreError> {
    connection
        .query_row(sql, params![], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Wraps a step failure with its label.
fn step_error(step: &'static str, err: &dyn Display) -> MigrationError {
    MigrationError::Step { step, message: err.to_string() }
}

/// Returns the directory holding the store file.
fn parent_dir(store_path: &Path) -> PathBuf {
    match store_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Returns `<store-file-name>.<marker>_`.
fn sibling_prefix(store_path: &Path, marker: &str) -> Result<String, SqliteStoreError> {
    let name = store_path
        .file_name()
        .ok_or_else(|| SqliteStoreError::Invalid("store path has no file name".to_string()))?;
    Ok(format!("{}.{marker}_", name.to_string_lossy()))
}

/// Returns an unused `<store>.<marker>_<timestamp>[_n]` path.
fn unique_sibling(store_path: &Path, marker: &str) -> Result<PathBuf, SqliteStoreError> {
    let stamp = OffsetDateTime::now_utc()
        .format(FILE_STAMP)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    let base = format!("{}{stamp}", sibling_prefix(store_path, marker)?);
    let directory = parent_dir(store_path);
    let mut candidate = directory.join(&base);
    let mut attempt: u32 = 1;
    while candidate.exists() {
        candidate = directory.join(format!("{base}_{attempt}"));
        attempt = attempt.saturating_add(1);
    }
    Ok(candidate)
}

/// Orders backup suffixes by timestamp, then collision counter.
fn backup_sort_key(suffix: &str) -> (String, u32) {
    let stamp = suffix.get(..FILE_STAMP_LEN).unwrap_or(suffix);
    let counter = suffix
        .get(FILE_STAMP_LEN..)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.parse().ok())
        .unwrap_or(0);
    (stamp.to_string(), counter)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
