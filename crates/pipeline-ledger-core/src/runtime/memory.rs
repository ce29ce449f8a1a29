// crates/pipeline-ledger-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Ledger Store
// Description: Process-local implementation of both repository traits.
// Purpose: Back orchestrator tests and dry runs without a database file.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryLedgerStore`] keeps tasks and operations behind one mutex and
//! stamps writes with a logical clock that advances by one millisecond per
//! write. Ordering, upsert, and uniqueness rules match the `SQLite` backend so
//! callers can swap one for the other in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::analytics::DateRange;
use crate::core::analytics::FailedOperation;
use crate::core::analytics::StatusGroup;
use crate::core::analytics::summarize_error;
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
use crate::core::records::TaskMessage;
use crate::core::records::TaskRecord;
use crate::core::records::TaskStatus;
use crate::core::time::Timestamp;
use crate::interfaces::OperationRepository;
use crate::interfaces::StoreError;
use crate::interfaces::TaskRepository;

// ============================================================================
// SECTION: State
// ============================================================================

/// Stored row plus its insertion sequence, used as an ordering tie-breaker.
#[derive(Debug, Clone)]
struct Sequenced<T> {
    /// Insertion sequence.
    seq: u64,
    /// Stored record.
    record: T,
}

/// Mutable store contents.
#[derive(Debug, Default)]
struct MemoryState {
    /// Logical clock in milliseconds.
    clock: i64,
    /// Next insertion sequence.
    next_seq: u64,
    /// Tasks keyed by identifier.
    tasks: BTreeMap<TaskId, Sequenced<TaskRecord>>,
    /// Operations keyed by identifier.
    operations: BTreeMap<OperationId, Sequenced<OperationRecord>>,
}

impl MemoryState {
    /// Advances the logical clock.
    const fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::from_unix_millis(self.clock)
    }

    /// Allocates an insertion sequence.
    const fn sequence(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Returns the organization owning a task, if the task exists.
    fn org_of(&self, task_id: &TaskId) -> Option<&OrgId> {
        self.tasks.get(task_id).map(|entry| &entry.record.org_id)
    }

    /// True when the task exists and, if `org_id` is given, belongs to it.
    ///
    /// Operations without an owning task never reach cross-task queries.
    fn owned_by(&self, task_id: &TaskId, org_id: Option<&OrgId>) -> bool {
        self.org_of(task_id).is_some_and(|owner| org_id.is_none_or(|org| owner == org))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory ledger backend.
///
/// # Invariants
/// - `(task_id, runtime_index, chain_index)` is unique across operations.
/// - Timestamps are logical and strictly increase with every write.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    /// Guarded store contents.
    state: Mutex<MemoryState>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("in-memory ledger mutex poisoned".into()))
    }
}

/// Returns true when `at` falls within the optional inclusive window.
fn in_range(at: Timestamp, range: Option<DateRange>) -> bool {
    range.is_none_or(|range| at >= range.start && at <= range.end)
}

/// Sorts sequenced operations newest-first and strips the sequence.
fn newest_first(mut rows: Vec<Sequenced<OperationRecord>>) -> Vec<OperationRecord> {
    rows.sort_by(|a, b| {
        b.record.date_created.cmp(&a.record.date_created).then_with(|| b.seq.cmp(&a.seq))
    });
    rows.into_iter().map(|row| row.record).collect()
}

impl TaskRepository for InMemoryLedgerStore {
    fn create_task(&self, task: &NewTask) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let now = state.tick();
        let seq = state.sequence();
        let record = TaskRecord {
            task_id: task.task_id.clone(),
            plan_id: task.plan_id.clone(),
            org_id: task.org_id.clone(),
            status: task.status,
            current_runtime_index: 0,
            messages: Vec::new(),
            request_body: task.request_body.clone(),
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(task.task_id.clone(), Sequenced { seq, record });
        Ok(())
    }

    fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        runtime_index: Option<u32>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let now = state.tick();
        let Some(entry) = state.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        entry.record.status = status;
        if let Some(index) = runtime_index {
            entry.record.current_runtime_index = index;
        }
        entry.record.updated_at = now;
        Ok(true)
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.lock()?.tasks.get(task_id).map(|entry| entry.record.clone()))
    }

    fn append_task_message(&self, task_id: &TaskId, text: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let now = state.tick();
        let Some(entry) = state.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        entry.record.messages.push(TaskMessage { message: text.to_string(), timestamp: now });
        entry.record.updated_at = now;
        Ok(true)
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<&Sequenced<TaskRecord>> = state
            .tasks
            .values()
            .filter(|entry| filter.org_id.as_ref().is_none_or(|org| &entry.record.org_id == org))
            .filter(|entry| filter.status.is_none_or(|status| entry.record.status == status))
            .collect();
        rows.sort_by(|a, b| {
            b.record.created_at.cmp(&a.record.created_at).then_with(|| b.seq.cmp(&a.seq))
        });
        Ok(rows.into_iter().take(filter.limit).map(|entry| entry.record.clone()).collect())
    }
}

impl OperationRepository for InMemoryLedgerStore {
    fn create_operation(&self, operation: &NewOperation) -> Result<OperationId, StoreError> {
        let operation_id = operation.operation_id();
        let mut state = self.lock()?;
        let slot_taken = state.operations.values().any(|entry| {
            entry.record.task_id == operation.task_id
                && entry.record.runtime_index == operation.runtime_index
                && entry.record.chain_index == operation.chain_index
                && entry.record.operation_id != operation_id
        });
        if slot_taken {
            return Err(StoreError::Invalid(format!(
                "operation slot ({}, {}, {}) already taken",
                operation.task_id, operation.runtime_index, operation.chain_index
            )));
        }
        if let Some(existing) = state.operations.get(&operation_id)
            && existing.record.task_id != operation.task_id
        {
            return Err(StoreError::Invalid(format!(
                "operation id {operation_id} belongs to task {}",
                existing.record.task_id
            )));
        }
        let now = state.tick();
        let seq = state.sequence();
        let record = OperationRecord {
            operation_id: operation_id.clone(),
            task_id: operation.task_id.clone(),
            executor_name: operation.executor_name.clone(),
            runtime_index: operation.runtime_index,
            chain_index: operation.chain_index,
            execution_status: ExecutionStatus::Running,
            input_data: operation.input_data.clone(),
            output_data: Payload::empty(),
            date_created: now,
            date_updated: now,
        };
        state.operations.insert(operation_id.clone(), Sequenced { seq, record });
        Ok(operation_id)
    }

    fn update_operation_status(
        &self,
        operation_id: &OperationId,
        status: ExecutionStatus,
        output_data: Option<&Payload>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let now = state.tick();
        let Some(entry) = state.operations.get_mut(operation_id) else {
            return Ok(false);
        };
        entry.record.execution_status = status;
        if let Some(output) = output_data {
            entry.record.output_data = output.clone();
        }
        entry.record.date_updated = now;
        Ok(true)
    }

    fn get_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<OperationRecord>, StoreError> {
        Ok(self.lock()?.operations.get(operation_id).map(|entry| entry.record.clone()))
    }

    fn get_operations_by_task(&self, task_id: &TaskId) -> Result<Vec<OperationRecord>, StoreError> {
        self.get_execution_timeline(task_id, None)
    }

    fn get_operations_by_executor(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<OperationRecord>, StoreError> {
        let state = self.lock()?;
        let rows = state
            .operations
            .values()
            .filter(|entry| &entry.record.executor_name == executor_name)
            .filter(|entry| status.is_none_or(|status| entry.record.execution_status == status))
            .filter(|entry| state.owned_by(&entry.record.task_id, org_id))
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    fn get_execution_timeline(
        &self,
        task_id: &TaskId,
        runtime_index: Option<u32>,
    ) -> Result<Vec<OperationRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<OperationRecord> = state
            .operations
            .values()
            .filter(|entry| &entry.record.task_id == task_id)
            .filter(|entry| runtime_index.is_none_or(|index| entry.record.runtime_index == index))
            .map(|entry| entry.record.clone())
            .collect();
        rows.sort_by_key(|record| (record.runtime_index, record.chain_index, record.date_created));
        Ok(rows)
    }

    #[allow(clippy::cast_precision_loss, reason = "Durations are far below f64 mantissa range.")]
    fn stage_status_groups(
        &self,
        executor_name: &ExecutorName,
        org_id: Option<&OrgId>,
        date_range: Option<DateRange>,
    ) -> Result<Vec<StatusGroup>, StoreError> {
        let state = self.lock()?;
        let mut totals: BTreeMap<ExecutionStatus, (u64, i64)> = BTreeMap::new();
        for entry in state.operations.values() {
            let record = &entry.record;
            if &record.executor_name != executor_name || !in_range(record.date_created, date_range)
            {
                continue;
            }
            if !state.owned_by(&record.task_id, org_id) {
                continue;
            }
            let slot = totals.entry(record.execution_status).or_insert((0, 0));
            slot.0 += 1;
            slot.1 = slot.1.saturating_add(record.duration_millis());
        }
        Ok(totals
            .into_iter()
            .map(|(status, (count, millis))| StatusGroup {
                status,
                count,
                avg_duration_millis: Some(millis as f64 / count as f64),
            })
            .collect())
    }

    fn find_failed_operations(
        &self,
        org_id: Option<&OrgId>,
        executor_name: Option<&ExecutorName>,
        limit: usize,
    ) -> Result<Vec<FailedOperation>, StoreError> {
        let state = self.lock()?;
        let rows = state
            .operations
            .values()
            .filter(|entry| entry.record.execution_status == ExecutionStatus::Failed)
            .filter(|entry| executor_name.is_none_or(|name| &entry.record.executor_name == name))
            .filter(|entry| state.owned_by(&entry.record.task_id, org_id))
            .cloned()
            .collect();
        Ok(newest_first(rows)
            .into_iter()
            .filter_map(|operation| {
                let org = state.org_of(&operation.task_id)?.clone();
                let error_summary = summarize_error(&operation.output_data);
                Some(FailedOperation { operation, org_id: org, error_summary })
            })
            .take(limit)
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use serde_json::json;

    use super::InMemoryLedgerStore;
    use crate::core::identifiers::ExecutorName;
    use crate::core::identifiers::OrgId;
    use crate::core::identifiers::PlanId;
    use crate::core::identifiers::TaskId;
    use crate::core::payload::Payload;
    use crate::core::records::ExecutionStatus;
    use crate::core::records::NewOperation;
    use crate::core::records::NewTask;
    use crate::core::records::TaskFilter;
    use crate::core::records::TaskStatus;
    use crate::interfaces::OperationRepository;
    use crate::interfaces::StoreError;
    use crate::interfaces::TaskRepository;
    use crate::runtime::facade::LedgerQueries;

    fn seed_task(store: &InMemoryLedgerStore, task: &str, org: &str) {
        let request = NewTask::running(
            TaskId::new(task),
            PlanId::new("plan-default-v1"),
            OrgId::new(org),
            Payload::new(json!({"input_website": "https://example.com"})),
        );
        store.create_task(&request).unwrap();
    }

    fn start(store: &InMemoryLedgerStore, task: &str, executor: &str, rt: u32, chain: u32) {
        let request = NewOperation {
            task_id: TaskId::new(task),
            executor_name: ExecutorName::new(executor),
            runtime_index: rt,
            chain_index: chain,
            input_data: Payload::empty(),
        };
        store.create_operation(&request).unwrap();
    }

    #[test]
    fn overview_counts_operations_by_status() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        start(&store, "t1", "data_acquisition", 0, 0);
        start(&store, "t1", "data_preparation", 0, 1);
        start(&store, "t1", "lead_scoring", 0, 2);
        store
            .update_operation_status(
                &"t1_data_acquisition_0_0".into(),
                ExecutionStatus::Done,
                Some(&Payload::new(json!({"pages": 3}))),
            )
            .unwrap();
        store
            .update_operation_status(
                &"t1_data_preparation_0_1".into(),
                ExecutionStatus::Failed,
                Some(&Payload::new(json!({"error": "timeout"}))),
            )
            .unwrap();

        let queries = LedgerQueries::new(&store);
        let overview = queries.get_task_with_operations(&TaskId::new("t1")).unwrap().unwrap();
        assert_eq!(overview.summary.total_operations, 3);
        assert_eq!(overview.summary.completed_operations, 1);
        assert_eq!(overview.summary.failed_operations, 1);
        assert_eq!(overview.summary.running_operations, 1);
        let chain: Vec<u32> = overview.operations.iter().map(|op| op.chain_index).collect();
        assert_eq!(chain, vec![0, 1, 2]);
        assert!(queries.get_task_with_operations(&TaskId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn current_attempt_follows_runtime_index() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        start(&store, "t1", "data_acquisition", 0, 0);
        start(&store, "t1", "initial_outreach", 1, 0);
        store.update_task_status(&TaskId::new("t1"), TaskStatus::Running, Some(1)).unwrap();

        let queries = LedgerQueries::new(&store);
        let attempt = queries.current_attempt(&TaskId::new("t1")).unwrap().unwrap();
        assert_eq!(attempt.len(), 1);
        assert_eq!(attempt[0].executor_name.as_str(), "initial_outreach");
    }

    #[test]
    fn occupied_slot_rejects_other_executor() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        start(&store, "t1", "data_acquisition", 0, 0);
        let clash = NewOperation {
            task_id: TaskId::new("t1"),
            executor_name: ExecutorName::new("lead_scoring"),
            runtime_index: 0,
            chain_index: 0,
            input_data: Payload::empty(),
        };
        let Err(err) = store.create_operation(&clash) else {
            panic!("expected slot conflict");
        };
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn composed_id_of_another_task_is_rejected() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t_data", "org-a");
        seed_task(&store, "t", "org-a");
        start(&store, "t_data", "acquisition", 0, 0);
        let collision = NewOperation {
            task_id: TaskId::new("t"),
            executor_name: ExecutorName::new("data_acquisition"),
            runtime_index: 0,
            chain_index: 0,
            input_data: Payload::empty(),
        };
        let Err(err) = store.create_operation(&collision) else {
            panic!("expected id collision across tasks to fail");
        };
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(store.get_operations_by_task(&TaskId::new("t_data")).unwrap().len(), 1);
        assert!(store.get_operations_by_task(&TaskId::new("t")).unwrap().is_empty());
    }

    #[test]
    fn operations_without_task_stay_out_of_analytics() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        start(&store, "t1", "lead_scoring", 0, 0);
        start(&store, "ghost", "lead_scoring", 0, 0);
        store
            .update_operation_status(
                &"ghost_lead_scoring_0_0".into(),
                ExecutionStatus::Failed,
                None,
            )
            .unwrap();

        let executor = ExecutorName::new("lead_scoring");
        let listed = store.get_operations_by_executor(&executor, None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id.as_str(), "t1");
        let metrics = store.get_stage_performance_metrics(&executor, None, None).unwrap();
        assert_eq!(metrics.total_executions, 1);
        assert!(store.find_failed_operations(None, None, 10).unwrap().is_empty());
    }

    #[test]
    fn pipeline_report_and_failures_respect_org() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        seed_task(&store, "t2", "org-b");
        start(&store, "t1", "lead_scoring", 0, 0);
        start(&store, "t2", "lead_scoring", 0, 0);
        store
            .update_operation_status(&"t1_lead_scoring_0_0".into(), ExecutionStatus::Done, None)
            .unwrap();
        store
            .update_operation_status(
                &"t2_lead_scoring_0_0".into(),
                ExecutionStatus::Failed,
                Some(&Payload::empty()),
            )
            .unwrap();

        let queries = LedgerQueries::new(&store);
        let org_a = OrgId::new("org-a");
        let report = queries
            .pipeline_report(
                &[ExecutorName::new("lead_scoring"), ExecutorName::new("drafting")],
                Some(&org_a),
                None,
            )
            .unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].total_executions, 1);
        assert!((report[0].success_rate - 100.0).abs() < 1e-9);
        assert_eq!(report[1].total_executions, 0);

        let failures = queries.recent_failures(None, None, 10).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].org_id.as_str(), "org-b");
        assert_eq!(failures[0].error_summary, "Unknown error");
    }

    #[test]
    fn list_tasks_is_newest_first() {
        let store = InMemoryLedgerStore::new();
        seed_task(&store, "t1", "org-a");
        seed_task(&store, "t2", "org-a");
        seed_task(&store, "t3", "org-b");
        let filter = TaskFilter { org_id: Some(OrgId::new("org-a")), ..TaskFilter::default() };
        let ids: Vec<String> = store
            .list_tasks(&filter)
            .unwrap()
            .into_iter()
            .map(|task| task.task_id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }
}
