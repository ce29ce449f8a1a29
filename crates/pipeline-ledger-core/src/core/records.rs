// crates/pipeline-ledger-core/src/core/records.rs
// ============================================================================
// Module: Pipeline Ledger Records
// Description: Task and operation records, statuses, and write requests.
// Purpose: Describe the persisted shape of pipeline runs and stage attempts.
// Dependencies: crate::core::{identifiers, payload, time}, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`TaskRecord`] is one pipeline run; an [`OperationRecord`] is one stage
//! attempt owned by a task. Terminal task statuses are business events rather
//! than locks: a continuation writes `running` again and bumps the runtime
//! index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ExecutorName;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::TaskId;
use crate::core::payload::Payload;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status Types
// ============================================================================

/// Error returned when a stored status label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {label}")]
pub struct StatusParseError {
    /// Status family being parsed.
    pub kind: &'static str,
    /// Rejected label.
    pub label: String,
}

/// Task lifecycle status.
///
/// # Invariants
/// - Labels are stable for storage and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Pipeline run is in progress (or was re-opened for continuation).
    Running,
    /// Pipeline run finished successfully.
    Completed,
    /// Pipeline run failed.
    Failed,
}

impl TaskStatus {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Maps a legacy execution status; anything unrecognized is `running`.
    #[must_use]
    pub fn from_legacy(label: &str) -> Self {
        match label {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }

    /// Returns true for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StatusParseError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StatusParseError { kind: "task", label: other.to_string() }),
        }
    }
}

/// Operation execution status.
///
/// # Invariants
/// - Labels are stable for storage and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Stage attempt is in progress.
    Running,
    /// Stage attempt completed successfully.
    Done,
    /// Stage attempt failed.
    Failed,
}

impl ExecutionStatus {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Maps a legacy stage-result status.
    ///
    /// `success` becomes `done`, `failed` stays `failed`, anything else is
    /// `running`.
    #[must_use]
    pub fn from_legacy(label: &str) -> Self {
        match label {
            "success" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = StatusParseError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(StatusParseError { kind: "execution", label: other.to_string() }),
        }
    }
}

// ============================================================================
// SECTION: Task Records
// ============================================================================

/// Timestamped free-text note attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Note text.
    pub message: String,
    /// Time the note was appended.
    pub timestamp: Timestamp,
}

/// Request to create (or wholesale overwrite) a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// Caller-supplied task identifier.
    pub task_id: TaskId,
    /// Pipeline definition the task runs.
    pub plan_id: PlanId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Initial pipeline input; never mutated by the store.
    pub request_body: Payload,
    /// Initial status, normally `running`.
    pub status: TaskStatus,
}

impl NewTask {
    /// Builds a `running` task request.
    #[must_use]
    pub const fn running(
        task_id: TaskId,
        plan_id: PlanId,
        org_id: OrgId,
        request_body: Payload,
    ) -> Self {
        Self { task_id, plan_id, org_id, request_body, status: TaskStatus::Running }
    }
}

/// Persisted pipeline run.
///
/// # Invariants
/// - `task_id` never changes after creation.
/// - `messages` are in append order with non-decreasing timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: TaskId,
    /// Pipeline definition identifier.
    pub plan_id: PlanId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Current status.
    pub status: TaskStatus,
    /// Last pipeline attempt number reached.
    pub current_runtime_index: u32,
    /// Ordered notes.
    pub messages: Vec<TaskMessage>,
    /// Initial pipeline input.
    pub request_body: Payload,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

/// Filter for listing tasks newest-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    /// Restrict to one organization.
    pub org_id: Option<OrgId>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Maximum number of tasks returned.
    pub limit: usize,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self { org_id: None, status: None, limit: 50 }
    }
}

// ============================================================================
// SECTION: Operation Records
// ============================================================================

/// Request to record the start of a stage attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
    /// Owning task.
    pub task_id: TaskId,
    /// Stage implementation.
    pub executor_name: ExecutorName,
    /// Pipeline attempt this operation belongs to.
    pub runtime_index: u32,
    /// Position among operations sharing `runtime_index`.
    pub chain_index: u32,
    /// Stage input.
    pub input_data: Payload,
}

impl NewOperation {
    /// Returns the canonical identifier this request will be stored under.
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        OperationId::compose(
            &self.task_id,
            &self.executor_name,
            self.runtime_index,
            self.chain_index,
        )
    }
}

/// Persisted stage attempt.
///
/// # Invariants
/// - `(task_id, runtime_index, chain_index)` is unique within a store.
/// - `output_data` is empty while `execution_status` is `running`, unless a
///   caller wrote partial output explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Owning task.
    pub task_id: TaskId,
    /// Stage implementation.
    pub executor_name: ExecutorName,
    /// Pipeline attempt ordinal.
    pub runtime_index: u32,
    /// Position within the attempt.
    pub chain_index: u32,
    /// Current status.
    pub execution_status: ExecutionStatus,
    /// Stage input.
    pub input_data: Payload,
    /// Stage output, or error details for failed attempts.
    pub output_data: Payload,
    /// Creation time.
    pub date_created: Timestamp,
    /// Last update time.
    pub date_updated: Timestamp,
}

impl OperationRecord {
    /// Returns the elapsed time between creation and last update.
    #[must_use]
    pub const fn duration_millis(&self) -> i64 {
        self.date_updated.millis_since(self.date_created)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ExecutionStatus;
    use super::TaskStatus;

    #[test]
    fn legacy_execution_statuses_collapse_to_running() {
        assert_eq!(TaskStatus::from_legacy("completed"), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_legacy("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_legacy("paused"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_legacy(""), TaskStatus::Running);
    }

    #[test]
    fn legacy_stage_statuses_map_success_to_done() {
        assert_eq!(ExecutionStatus::from_legacy("success"), ExecutionStatus::Done);
        assert_eq!(ExecutionStatus::from_legacy("failed"), ExecutionStatus::Failed);
        assert_eq!(ExecutionStatus::from_legacy("done"), ExecutionStatus::Running);
    }

    #[test]
    fn stored_labels_parse_back() {
        for status in [TaskStatus::Running, TaskStatus::Completed, TaskStatus::Failed] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        for status in [ExecutionStatus::Running, ExecutionStatus::Done, ExecutionStatus::Failed] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
        }
        assert!("success".parse::<ExecutionStatus>().is_err());
    }
}
