// crates/pipeline-ledger-core/src/runtime/facade.rs
// ============================================================================
// Module: Ledger Query Facade
// Description: Read-only aggregations built from the task and operation repositories.
// Purpose: Give reporting tools timelines, task overviews, and stage reports.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`LedgerQueries`] borrows any backend implementing both repository traits
//! and composes their reads. It never writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::analytics::DateRange;
use crate::core::analytics::FailedOperation;
use crate::core::analytics::StagePerformanceMetrics;
use crate::core::analytics::TaskOverview;
use crate::core::analytics::TaskSummary;
use crate::core::identifiers::ExecutorName;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::TaskId;
use crate::core::records::OperationRecord;
use crate::interfaces::OperationRepository;
use crate::interfaces::StoreError;
use crate::interfaces::TaskRepository;

// ============================================================================
// SECTION: Facade
// ============================================================================

/// Read-only query facade over a ledger backend.
#[derive(Debug, Clone, Copy)]
pub struct LedgerQueries<'a, S: ?Sized> {
    /// Backend being queried.
    store: &'a S,
}

impl<'a, S> LedgerQueries<'a, S>
where
    S: TaskRepository + OperationRepository + ?Sized,
{
    /// Creates a facade over `store`.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads a task with its operations in canonical order and a summary.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when either repository read fails.
    pub fn get_task_with_operations(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TaskOverview>, StoreError> {
        let Some(task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        let operations = self.store.get_operations_by_task(task_id)?;
        let summary = TaskSummary::from_operations(&operations);
        Ok(Some(TaskOverview { task, operations, summary }))
    }

    /// Returns the chronological timeline for a task, optionally one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn timeline(
        &self,
        task_id: &TaskId,
        runtime_index: Option<u32>,
    ) -> Result<Vec<OperationRecord>, StoreError> {
        self.store.get_execution_timeline(task_id, runtime_index)
    }

    /// Returns the timeline of the attempt the task last reached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when either read fails.
    pub fn current_attempt(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<Vec<OperationRecord>>, StoreError> {
        let Some(task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        self.timeline(task_id, Some(task.current_runtime_index)).map(Some)
    }

    /// Reports metrics for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregation fails.
    pub fn stage_metrics(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<StagePerformanceMetrics, StoreError> {
        self.store.get_stage_performance_metrics(executor_name, org_id, date_range)
    }

    /// Reports metrics for each executor of a pipeline, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on the first failing aggregation.
    pub fn pipeline_report(
        &self,
        executors: &[ExecutorName],
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<Vec<StagePerformanceMetrics>, StoreError> {
        executors
            .iter()
            .map(|executor| self.stage_metrics(executor, org_id, date_range))
            .collect()
    }

    /// Lists the most recent failures.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn recent_failures(
        &self,
        org_id: Option<&OrgId>,
        executor_name: Option<&ExecutorName>,
        limit: usize,
    ) -> Result<Vec<FailedOperation>, StoreError> {
        self.store.find_failed_operations(org_id, executor_name, limit)
    }
}
