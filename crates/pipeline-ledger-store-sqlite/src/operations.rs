// crates/pipeline-ledger-store-sqlite/src/operations.rs
// ============================================================================
// Module: SQLite Operation Repository
// Description: OperationRepository implementation over the `operations` table.
// Purpose: Persist stage attempts and answer per-executor analytics queries.
// Dependencies: pipeline-ledger-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Operations are keyed by their composed identifier and additionally unique
//! on `(task_id, runtime_index, chain_index)`. A composed identifier never
//! moves between tasks. Cross-task queries join the owning task, so
//! operations whose task is missing stay out of listings and analytics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use pipeline_ledger_core::DateRange;
use pipeline_ledger_core::ExecutionStatus;
use pipeline_ledger_core::ExecutorName;
use pipeline_ledger_core::FailedOperation;
use pipeline_ledger_core::NewOperation;
use pipeline_ledger_core::OperationId;
use pipeline_ledger_core::OperationRecord;
use pipeline_ledger_core::OperationRepository;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::StatusGroup;
use pipeline_ledger_core::StoreError;
use pipeline_ledger_core::TaskId;
use pipeline_ledger_core::Timestamp;
use pipeline_ledger_core::core::analytics::NO_ERROR_DETAILS;
use pipeline_ledger_core::core::analytics::UNPARSEABLE_OUTPUT;
use pipeline_ledger_core::summarize_error;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::debug;
use tracing::warn;

use crate::codec::decode_index;
use crate::codec::decode_payload;
use crate::codec::encode_payload;
use crate::store::LedgerStore;
use crate::store::SqliteStoreError;
use crate::store::unix_millis;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Column list shared by every operation read, qualified with alias `o`.
const OPERATION_COLUMNS: &str = "o.operation_id, o.task_id, o.executor_name, o.runtime_index, \
                                 o.chain_index, o.execution_status, o.input_data, \
                                 o.output_data, o.date_created, o.date_updated";

/// Raw `operations` row before payload decoding.
struct OperationRow {
    /// Operation identifier.
    operation_id: String,
    /// Owning task identifier.
    task_id: String,
    /// Executor name.
    executor_name: String,
    /// Stored runtime index.
    runtime_index: i64,
    /// Stored chain index.
    chain_index: i64,
    /// Stored status label.
    execution_status: String,
    /// Input JSON text.
    input_data: Option<String>,
    /// Output JSON text.
    output_data: Option<String>,
    /// Creation time in unix millis.
    date_created: i64,
    /// Update time in unix millis.
    date_updated: i64,
}

impl OperationRow {
    /// Maps a row selected with [`OPERATION_COLUMNS`].
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            operation_id: row.get(0)?,
            task_id: row.get(1)?,
            executor_name: row.get(2)?,
            runtime_index: row.get(3)?,
            chain_index: row.get(4)?,
            execution_status: row.get(5)?,
            input_data: row.get(6)?,
            output_data: row.get(7)?,
            date_created: row.get(8)?,
            date_updated: row.get(9)?,
        })
    }

    /// Summarizes the stored output of a failed operation.
    fn error_summary(&self) -> String {
        match self.output_data.as_deref().filter(|text| !text.trim().is_empty()) {
            None => NO_ERROR_DETAILS.to_string(),
            Some(text) => Payload::from_json_str(text)
                .map_or_else(|_| UNPARSEABLE_OUTPUT.to_string(), |output| summarize_error(&output)),
        }
    }

    /// Decodes the row into a record, degrading malformed columns.
    fn into_record(self) -> OperationRecord {
        let id = self.operation_id.as_str();
        let execution_status =
            self.execution_status.parse::<ExecutionStatus>().unwrap_or_else(|err| {
                warn!(operation_id = id, error = %err, "unknown execution status; using running");
                ExecutionStatus::Running
            });
        OperationRecord {
            runtime_index: decode_index(id, "runtime_index", self.runtime_index),
            chain_index: decode_index(id, "chain_index", self.chain_index),
            input_data: decode_payload(id, "input_data", self.input_data.as_deref()),
            output_data: decode_payload(id, "output_data", self.output_data.as_deref()),
            operation_id: OperationId::new(id),
            task_id: TaskId::new(self.task_id),
            executor_name: ExecutorName::new(self.executor_name),
            execution_status,
            date_created: Timestamp::from_unix_millis(self.date_created),
            date_updated: Timestamp::from_unix_millis(self.date_updated),
        }
    }
}

// ============================================================================
// SECTION: Shared Writes
// ============================================================================

/// Operation row contents written by [`upsert_operation`].
pub(crate) struct OperationWrite<'a> {
    /// Identifier to store under.
    pub operation_id: &'a OperationId,
    /// Owning task.
    pub task_id: &'a TaskId,
    /// Executor name.
    pub executor_name: &'a ExecutorName,
    /// Runtime index.
    pub runtime_index: u32,
    /// Chain index.
    pub chain_index: u32,
    /// Execution status.
    pub execution_status: ExecutionStatus,
    /// Input payload.
    pub input_data: &'a Payload,
    /// Output payload.
    pub output_data: &'a Payload,
    /// Creation time.
    pub date_created: i64,
    /// Update time.
    pub date_updated: i64,
}

/// Inserts or wholesale replaces an operation row.
///
/// A different operation already holding the `(task_id, runtime_index,
/// chain_index)` slot, or an identifier already owned by another task, is
/// rejected as [`SqliteStoreError::Invalid`].
pub(crate) fn upsert_operation(
    connection: &Connection,
    write: &OperationWrite<'_>,
) -> Result<(), SqliteStoreError> {
    let input = encode_payload(write.input_data)?;
    let output = encode_payload(write.output_data)?;
    let changed = connection
        .execute(
            "INSERT INTO operations (operation_id, task_id, executor_name, runtime_index, \
             chain_index, execution_status, input_data, output_data, date_created, date_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(operation_id) DO UPDATE SET
                task_id = excluded.task_id,
                executor_name = excluded.executor_name,
                runtime_index = excluded.runtime_index,
                chain_index = excluded.chain_index,
                execution_status = excluded.execution_status,
                input_data = excluded.input_data,
                output_data = excluded.output_data,
                date_created = excluded.date_created,
                date_updated = excluded.date_updated
             WHERE operations.task_id = excluded.task_id",
            params![
                write.operation_id.as_str(),
                write.task_id.as_str(),
                write.executor_name.as_str(),
                i64::from(write.runtime_index),
                i64::from(write.chain_index),
                write.execution_status.as_str(),
                input,
                output,
                write.date_created,
                write.date_updated,
            ],
        )
        .map_err(|err| match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => SqliteStoreError::Invalid(format!(
                "operation slot ({}, {}, {}) already taken: {err}",
                write.task_id, write.runtime_index, write.chain_index
            )),
            _ => SqliteStoreError::Db(err.to_string()),
        })?;
    if changed == 0 {
        return Err(SqliteStoreError::Invalid(format!(
            "operation id {} belongs to another task than {}",
            write.operation_id, write.task_id
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Positional parameters collected while building a filtered query.
#[derive(Default)]
struct QueryParams {
    /// Bound values in placeholder order.
    values: Vec<SqlValue>,
    /// `WHERE` clauses referencing the placeholders.
    clauses: Vec<String>,
}

impl QueryParams {
    /// Adds a clause whose `{}` is replaced by the next placeholder.
    fn push(&mut self, clause: &str, value: SqlValue) {
        self.values.push(value);
        self.clauses.push(clause.replace("{}", &format!("?{}", self.values.len())));
    }

    /// Renders the `WHERE` clause, or nothing when no filter was added.
    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Converts a unix-millis timestamp into a bound value.
const fn millis_value(timestamp: Timestamp) -> SqlValue {
    SqlValue::Integer(timestamp.as_unix_millis())
}

/// Converts a text identifier into a bound value.
fn text_value(text: &str) -> SqlValue {
    SqlValue::Text(text.to_string())
}

impl LedgerStore {
    /// Runs an operation query and decodes every row.
    fn query_operations(
        &self,
        sql: &str,
        values: Vec<SqlValue>,
    ) -> Result<Vec<OperationRecord>, SqliteStoreError> {
        let connection = self.connect()?;
        let mut stmt =
            connection.prepare(sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values), OperationRow::from_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        rows.map(|row| row.map(OperationRow::into_record))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Aggregates counts and summed durations per status.
    fn query_status_groups(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<Vec<StatusGroup>, SqliteStoreError> {
        let mut filters = QueryParams::default();
        filters.push("o.executor_name = {}", text_value(executor_name.as_str()));
        if let Some(org_id) = org_id {
            filters.push("t.org_id = {}", text_value(org_id.as_str()));
        }
        if let Some(range) = date_range {
            filters.push("o.date_created >= {}", millis_value(range.start));
            filters.push("o.date_created <= {}", millis_value(range.end));
        }
        let sql = format!(
            "SELECT o.execution_status, COUNT(*), TOTAL(o.date_updated - o.date_created)
             FROM operations o JOIN tasks t ON t.task_id = o.task_id
             {}
             GROUP BY o.execution_status",
            filters.where_clause()
        );
        let connection = self.connect()?;
        let mut stmt =
            connection.prepare(&sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(filters.values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, f64>(2)?))
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut merged: BTreeMap<ExecutionStatus, (u64, f64)> = BTreeMap::new();
        for row in rows {
            let (label, count, total_millis) =
                row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let status = label.parse::<ExecutionStatus>().unwrap_or_else(|err| {
                warn!(error = %err, "unknown execution status in metrics; counting as running");
                ExecutionStatus::Running
            });
            let slot = merged.entry(status).or_insert((0, 0.0));
            slot.0 = slot.0.saturating_add(u64::try_from(count).unwrap_or(0));
            slot.1 += total_millis;
        }
        Ok(merged
            .into_iter()
            .map(|(status, (count, total_millis))| StatusGroup {
                status,
                count,
                avg_duration_millis: average(total_millis, count),
            })
            .collect())
    }

    /// Lists failed operations newest-first with their error summaries.
    fn query_failed(
        &self,
        org_id: Option<&OrgId>,
        executor_name: Option<&ExecutorName>,
        limit: usize,
    ) -> Result<Vec<FailedOperation>, SqliteStoreError> {
        let mut filters = QueryParams::default();
        filters.push("o.execution_status = {}", text_value(ExecutionStatus::Failed.as_str()));
        if let Some(org_id) = org_id {
            filters.push("t.org_id = {}", text_value(org_id.as_str()));
        }
        if let Some(executor_name) = executor_name {
            filters.push("o.executor_name = {}", text_value(executor_name.as_str()));
        }
        let where_clause = filters.where_clause();
        let mut values = filters.values;
        values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let sql = format!(
            "SELECT {OPERATION_COLUMNS}, t.org_id
             FROM operations o JOIN tasks t ON t.task_id = o.task_id
             {where_clause}
             ORDER BY o.date_created DESC, o.rowid DESC
             LIMIT ?{}",
            values.len()
        );
        let connection = self.connect()?;
        let mut stmt =
            connection.prepare(&sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((OperationRow::from_row(row)?, row.get::<_, String>(10)?))
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut failures = Vec::new();
        for row in rows {
            let (row, org) = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let error_summary = row.error_summary();
            failures.push(FailedOperation {
                operation: row.into_record(),
                org_id: OrgId::new(org),
                error_summary,
            });
        }
        Ok(failures)
    }
}

/// Returns `total / count`, or `None` for an empty group.
#[allow(clippy::cast_precision_loss, reason = "Counts are far below f64 mantissa range.")]
fn average(total: f64, count: u64) -> Option<f64> {
    (count > 0).then(|| total / count as f64)
}

// ============================================================================
// SECTION: Repository
// ============================================================================

impl OperationRepository for LedgerStore {
    fn create_operation(&self, operation: &NewOperation) -> Result<OperationId, StoreError> {
        let operation_id = operation.operation_id();
        let connection = self.connect()?;
        let now = unix_millis();
        upsert_operation(
            &connection,
            &OperationWrite {
                operation_id: &operation_id,
                task_id: &operation.task_id,
                executor_name: &operation.executor_name,
                runtime_index: operation.runtime_index,
                chain_index: operation.chain_index,
                execution_status: ExecutionStatus::Running,
                input_data: &operation.input_data,
                output_data: &Payload::empty(),
                date_created: now,
                date_updated: now,
            },
        )?;
        debug!(operation_id = %operation_id, task_id = %operation.task_id, "operation created");
        Ok(operation_id)
    }

    fn update_operation_status(
        &self,
        operation_id: &OperationId,
        status: ExecutionStatus,
        output_data: Option<&Payload>,
    ) -> Result<bool, StoreError> {
        let output = output_data.map(encode_payload).transpose()?;
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE operations SET execution_status = ?1,
                    output_data = COALESCE(?2, output_data),
                    date_updated = ?3
                 WHERE operation_id = ?4",
                params![status.as_str(), output, unix_millis(), operation_id.as_str()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(operation_id = %operation_id, status = %status, changed, "operation updated");
        Ok(changed > 0)
    }

    fn get_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<OperationRecord>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {OPERATION_COLUMNS} FROM operations o WHERE o.operation_id = ?1"),
                params![operation_id.as_str()],
                OperationRow::from_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(row.map(OperationRow::into_record))
    }

    fn get_operations_by_task(&self, task_id: &TaskId) -> Result<Vec<OperationRecord>, StoreError> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM operations o WHERE o.task_id = ?1
             ORDER BY o.runtime_index, o.chain_index"
        );
        Ok(self.query_operations(&sql, vec![text_value(task_id.as_str())])?)
    }

    fn get_operations_by_executor(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<OperationRecord>, StoreError> {
        let mut filters = QueryParams::default();
        filters.push("o.executor_name = {}", text_value(executor_name.as_str()));
        if let Some(org_id) = org_id {
            filters.push("t.org_id = {}", text_value(org_id.as_str()));
        }
        if let Some(status) = status {
            filters.push("o.execution_status = {}", text_value(status.as_str()));
        }
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM operations o JOIN tasks t ON t.task_id = o.task_id
             {}
             ORDER BY o.date_created DESC, o.rowid DESC",
            filters.where_clause()
        );
        Ok(self.query_operations(&sql, filters.values)?)
    }

    fn get_execution_timeline(
        &self,
        task_id: &TaskId,
        runtime_index: Option<u32>,
    ) -> Result<Vec<OperationRecord>, StoreError> {
        let mut filters = QueryParams::default();
        filters.push("o.task_id = {}", text_value(task_id.as_str()));
        if let Some(runtime_index) = runtime_index {
            filters.push("o.runtime_index = {}", SqlValue::Integer(i64::from(runtime_index)));
        }
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM operations o
             {}
             ORDER BY o.runtime_index, o.chain_index, o.date_created",
            filters.where_clause()
        );
        Ok(self.query_operations(&sql, filters.values)?)
    }

    fn stage_status_groups(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<Vec<StatusGroup>, StoreError> {
        Ok(self.query_status_groups(executor_name, org_id, date_range)?)
    }

    fn find_failed_operations(
        &self,
        org_id: Option<&OrgId>,
        executor_name: Option<&ExecutorName>,
        limit: usize,
    ) -> Result<Vec<FailedOperation>, StoreError> {
        Ok(self.query_failed(org_id, executor_name, limit)?)
    }
}
