// crates/pipeline-ledger-store-sqlite/src/tasks.rs
// ============================================================================
// Module: SQLite Task Repository
// Description: TaskRepository implementation over the `tasks` table.
// Purpose: Persist pipeline runs with wholesale upsert and ordered notes.
// Dependencies: pipeline-ledger-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Task rows store `messages` and `request_body` as JSON text and timestamps
//! as unix milliseconds. Creating an existing task replaces the row entirely;
//! appending a message is a read-modify-write inside one immediate
//! transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pipeline_ledger_core::NewTask;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::StoreError;
use pipeline_ledger_core::TaskFilter;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_core::TaskMessage;
use pipeline_ledger_core::TaskRecord;
use pipeline_ledger_core::TaskRepository;
use pipeline_ledger_core::TaskStatus;
use pipeline_ledger_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::debug;
use tracing::warn;

use crate::codec::decode_index;
use crate::codec::decode_messages;
use crate::codec::decode_payload;
use crate::codec::encode_messages;
use crate::codec::encode_payload;
use crate::store::LedgerStore;
use crate::store::SqliteStoreError;
use crate::store::unix_millis;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Column list shared by every task read.
const TASK_COLUMNS: &str = "task_id, plan_id, org_id, status, current_runtime_index, messages, \
                            request_body, created_at, updated_at";

/// Raw `tasks` row before payload decoding.
struct TaskRow {
    /// Task identifier.
    task_id: String,
    /// Plan identifier.
    plan_id: String,
    /// Organization identifier.
    org_id: String,
    /// Stored status label.
    status: String,
    /// Stored runtime index.
    current_runtime_index: i64,
    /// Messages JSON text.
    messages: Option<String>,
    /// Request body JSON text.
    request_body: Option<String>,
    /// Creation time in unix millis.
    created_at: i64,
    /// Update time in unix millis.
    updated_at: i64,
}

impl TaskRow {
    /// Maps a row selected with [`TASK_COLUMNS`].
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            plan_id: row.get(1)?,
            org_id: row.get(2)?,
            status: row.get(3)?,
            current_runtime_index: row.get(4)?,
            messages: row.get(5)?,
            request_body: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Decodes the row into a record, degrading malformed columns.
    fn into_record(self) -> TaskRecord {
        let status = self.status.parse::<TaskStatus>().unwrap_or_else(|err| {
            warn!(task_id = %self.task_id, error = %err, "unknown task status; using running");
            TaskStatus::Running
        });
        TaskRecord {
            current_runtime_index: decode_index(
                &self.task_id,
                "current_runtime_index",
                self.current_runtime_index,
            ),
            messages: decode_messages(&self.task_id, self.messages.as_deref()),
            request_body: decode_payload(
                &self.task_id,
                "request_body",
                self.request_body.as_deref(),
            ),
            plan_id: PlanId::new(self.plan_id),
            org_id: OrgId::new(self.org_id),
            status,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
            task_id: TaskId::new(self.task_id),
        }
    }
}

// ============================================================================
// SECTION: Shared Writes
// ============================================================================

/// Task row contents written by [`upsert_task`].
pub(crate) struct TaskWrite<'a> {
    /// Task to write.
    pub task: &'a NewTask,
    /// Runtime index to store.
    pub current_runtime_index: u32,
    /// Creation time.
    pub created_at: i64,
    /// Update time.
    pub updated_at: i64,
}

/// Inserts or wholesale replaces a task row; messages are reset.
pub(crate) fn upsert_task(
    connection: &Connection,
    write: &TaskWrite<'_>,
) -> Result<(), SqliteStoreError> {
    let request_body = encode_payload(&write.task.request_body)?;
    connection
        .execute(
            "INSERT INTO tasks (task_id, plan_id, org_id, status, current_runtime_index, \
             messages, request_body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '[]', ?6, ?7, ?8)
             ON CONFLICT(task_id) DO UPDATE SET
                plan_id = excluded.plan_id,
                org_id = excluded.org_id,
                status = excluded.status,
                current_runtime_index = excluded.current_runtime_index,
                messages = excluded.messages,
                request_body = excluded.request_body,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                write.task.task_id.as_str(),
                write.task.plan_id.as_str(),
                write.task.org_id.as_str(),
                write.task.status.as_str(),
                i64::from(write.current_runtime_index),
                request_body,
                write.created_at,
                write.updated_at,
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Loads a task through an existing connection.
fn fetch_task(
    connection: &Connection,
    task_id: &TaskId,
) -> Result<Option<TaskRecord>, SqliteStoreError> {
    let row = connection
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
            params![task_id.as_str()],
            TaskRow::from_row,
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(row.map(TaskRow::into_record))
}

// ============================================================================
// SECTION: Repository
// ============================================================================

impl LedgerStore {
    /// Appends a message with a timestamp no earlier than the previous one.
    fn append_message_in_tx(&self, task_id: &TaskId, text: &str) -> Result<bool, SqliteStoreError> {
        let mut connection = self.connect()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let stored: Option<Option<String>> = tx
            .query_row(
                "SELECT messages FROM tasks WHERE task_id = ?1",
                params![task_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some(stored) = stored else {
            return Ok(false);
        };
        let mut messages = decode_messages(task_id.as_str(), stored.as_deref());
        let floor = messages.last().map_or(i64::MIN, |last| last.timestamp.as_unix_millis());
        let timestamp = unix_millis().max(floor);
        messages.push(TaskMessage {
            message: text.to_string(),
            timestamp: Timestamp::from_unix_millis(timestamp),
        });
        tx.execute(
            "UPDATE tasks SET messages = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![encode_messages(&messages)?, timestamp, task_id.as_str()],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(true)
    }

    /// Lists tasks newest-first with optional filters.
    fn query_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, SqliteStoreError> {
        let connection = self.connect()?;
        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(org_id) = &filter.org_id {
            values.push(SqlValue::Text(org_id.as_str().to_string()));
            clauses.push(format!("org_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(SqlValue::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        values.push(SqlValue::Integer(i64::try_from(filter.limit).unwrap_or(i64::MAX)));
        let where_clause =
            if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks {where_clause} ORDER BY created_at DESC, rowid DESC \
             LIMIT ?{}",
            values.len()
        );
        let mut stmt =
            connection.prepare(&sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values), TaskRow::from_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        rows.map(|row| row.map(TaskRow::into_record))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))
    }
}

impl TaskRepository for LedgerStore {
    fn create_task(&self, task: &NewTask) -> Result<(), StoreError> {
        let connection = self.connect()?;
        let now = unix_millis();
        upsert_task(
            &connection,
            &TaskWrite { task, current_runtime_index: 0, created_at: now, updated_at: now },
        )?;
        debug!(task_id = %task.task_id, org_id = %task.org_id, "task created");
        Ok(())
    }

    fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        runtime_index: Option<u32>,
    ) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE tasks SET status = ?1,
                    current_runtime_index = COALESCE(?2, current_runtime_index),
                    updated_at = ?3
                 WHERE task_id = ?4",
                params![
                    status.as_str(),
                    runtime_index.map(i64::from),
                    unix_millis(),
                    task_id.as_str()
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(task_id = %task_id, status = %status, changed, "task status updated");
        Ok(changed > 0)
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let connection = self.connect()?;
        Ok(fetch_task(&connection, task_id)?)
    }

    fn append_task_message(&self, task_id: &TaskId, text: &str) -> Result<bool, StoreError> {
        Ok(self.append_message_in_tx(task_id, text)?)
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.query_tasks(filter)?)
    }
}
