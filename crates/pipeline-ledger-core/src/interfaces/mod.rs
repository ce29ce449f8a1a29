// crates/pipeline-ledger-core/src/interfaces/mod.rs
// ============================================================================
// Module: Pipeline Ledger Interfaces
// Description: Repository traits implemented by ledger storage backends.
// Purpose: Decouple pipeline orchestration and reporting from storage.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The orchestrator writes through [`TaskRepository`] and
//! [`OperationRepository`]; reporting tools read through the same traits or
//! the [`crate::LedgerQueries`] facade. Every call is synchronous and scoped
//! to a single storage transaction, so a task with zero operations is a valid
//! intermediate state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::analytics::DateRange;
use crate::core::analytics::FailedOperation;
use crate::core::analytics::StagePerformanceMetrics;
use crate::core::analytics::StatusGroup;
use crate::core::identifiers::ExecutorName;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::TaskId;
use crate::core::payload::Payload;
use crate::core::records::ExecutionStatus;
use crate::core::records::NewOperation;
use crate::core::records::NewTask;
use crate::core::records::OperationRecord;
use crate::core::records::TaskFilter;
use crate::core::records::TaskRecord;
use crate::core::records::TaskStatus;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Ledger store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Not-found is never an error; lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("ledger store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("ledger store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("ledger store version mismatch: {0}")]
    VersionMismatch(String),
    /// Request or stored data is invalid.
    #[error("ledger store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("ledger store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Task Repository
// ============================================================================

/// Persistence for pipeline-run records.
pub trait TaskRepository {
    /// Creates a task, overwriting any existing task with the same id
    /// wholesale (messages are reset, nothing is merged).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn create_task(&self, task: &NewTask) -> Result<(), StoreError>;

    /// Sets the task status and, when given, the current runtime index.
    /// Always stamps the update time.
    ///
    /// Returns `false` when no task matched; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        runtime_index: Option<u32>,
    ) -> Result<bool, StoreError>;

    /// Loads a task with decoded messages and request body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails. Undecodable payload
    /// columns degrade to neutral values instead.
    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Appends a timestamped note to the task's messages.
    ///
    /// Returns `false` when the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read-modify-write fails.
    fn append_task_message(&self, task_id: &TaskId, text: &str) -> Result<bool, StoreError>;

    /// Lists tasks newest-first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError>;
}

// ============================================================================
// SECTION: Operation Repository
// ============================================================================

/// Persistence and analytics for stage-attempt records.
pub trait OperationRepository {
    /// Records the start of a stage attempt with status `running` and empty
    /// output. Returns the composed operation identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when another executor already occupies
    /// the `(task_id, runtime_index, chain_index)` slot, or another
    /// [`StoreError`] when the write fails.
    fn create_operation(&self, operation: &NewOperation) -> Result<OperationId, StoreError>;

    /// Sets the execution status and, when given, the output payload.
    ///
    /// Returns `false` when no operation matched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_operation_status(
        &self,
        operation_id: &OperationId,
        status: ExecutionStatus,
        output_data: Option<&Payload>,
    ) -> Result<bool, StoreError>;

    /// Loads one operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<OperationRecord>, StoreError>;

    /// Lists a task's operations in canonical `(runtime_index, chain_index)`
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_operations_by_task(&self, task_id: &TaskId) -> Result<Vec<OperationRecord>, StoreError>;

    /// Lists operations of one executor across tasks, newest-first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_operations_by_executor(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<OperationRecord>, StoreError>;

    /// Lists a task's operations chronologically, optionally for one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn get_execution_timeline(
        &self,
        task_id: &TaskId,
        runtime_index: Option<u32>,
    ) -> Result<Vec<OperationRecord>, StoreError>;

    /// Aggregates count and mean duration per status for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn stage_status_groups(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<Vec<StatusGroup>, StoreError>;

    /// Reports success and failure rates for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregation query fails.
    fn get_stage_performance_metrics(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<StagePerformanceMetrics, StoreError> {
        let groups = self.stage_status_groups(executor_name, org_id, date_range)?;
        Ok(StagePerformanceMetrics::from_groups(executor_name.clone(), org_id.cloned(), &groups))
    }

    /// Lists failed operations newest-first with an extracted error summary.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_failed_operations(
        &self,
        org_id: Option<&OrgId>,
        executor_name: Option<&ExecutorName>,
        limit: usize,
    ) -> Result<Vec<FailedOperation>, StoreError>;
}
