// crates/pipeline-ledger-core/src/core/analytics.rs
// ============================================================================
// Module: Pipeline Ledger Analytics
// Description: Aggregate views over task and operation records.
// Purpose: Compute stage success rates, durations, and per-task summaries.
// Dependencies: crate::core::{identifiers, payload, records, time}, serde
// ============================================================================

//! ## Overview
//! Backends return raw per-status groups; this module derives rates and
//! averages from them so every backend reports identical numbers. An empty
//! group set yields zero rates rather than a division error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ExecutorName;
use crate::core::identifiers::OrgId;
use crate::core::payload::Payload;
use crate::core::records::ExecutionStatus;
use crate::core::records::OperationRecord;
use crate::core::records::TaskRecord;
use crate::core::time::MILLIS_PER_MINUTE;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Stage Metrics
// ============================================================================

/// Inclusive creation-time window for analytical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest creation time included.
    pub start: Timestamp,
    /// Latest creation time included.
    pub end: Timestamp,
}

/// Raw aggregate for one execution status, as produced by a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusGroup {
    /// Status the group covers.
    pub status: ExecutionStatus,
    /// Number of operations in the group.
    pub count: u64,
    /// Mean `date_updated - date_created` in milliseconds, when known.
    pub avg_duration_millis: Option<f64>,
}

/// Per-status slice of a stage report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    /// Number of operations with this status.
    pub count: u64,
    /// Mean duration in minutes.
    pub avg_duration_minutes: f64,
}

/// Success/failure report for one executor.
///
/// # Invariants
/// - Rates are percentages in `0.0..=100.0`; both are zero with no data.
/// - Success means `done`; every other status counts as failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePerformanceMetrics {
    /// Executor the report covers.
    pub executor_name: ExecutorName,
    /// Organization filter applied, if any.
    pub org_id: Option<OrgId>,
    /// Number of operations matched.
    pub total_executions: u64,
    /// Percentage of operations that finished `done`.
    pub success_rate: f64,
    /// Percentage of operations that did not finish `done`.
    pub failure_rate: f64,
    /// Count-weighted mean duration in minutes.
    pub avg_duration_minutes: f64,
    /// Per-status counts and durations.
    pub status_breakdown: BTreeMap<ExecutionStatus, StatusBreakdown>,
}

impl StagePerformanceMetrics {
    /// Derives a report from per-status groups.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Counts are far below f64 mantissa range.")]
    pub fn from_groups(
        executor_name: ExecutorName,
        org_id: Option<OrgId>,
        groups: &[StatusGroup],
    ) -> Self {
        let mut status_breakdown = BTreeMap::new();
        let mut total: u64 = 0;
        let mut success: u64 = 0;
        let mut weighted_millis = 0.0_f64;
        for group in groups {
            total = total.saturating_add(group.count);
            if group.status == ExecutionStatus::Done {
                success = success.saturating_add(group.count);
            }
            let avg_millis = group.avg_duration_millis.unwrap_or(0.0);
            weighted_millis += avg_millis * group.count as f64;
            status_breakdown.insert(
                group.status,
                StatusBreakdown {
                    count: group.count,
                    avg_duration_minutes: avg_millis / MILLIS_PER_MINUTE,
                },
            );
        }
        let (success_rate, failure_rate, avg_duration_minutes) = if total == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let total_f = total as f64;
            let success_rate = success as f64 / total_f * 100.0;
            (
                success_rate,
                (total - success) as f64 / total_f * 100.0,
                weighted_millis / total_f / MILLIS_PER_MINUTE,
            )
        };
        Self {
            executor_name,
            org_id,
            total_executions: total,
            success_rate,
            failure_rate,
            avg_duration_minutes,
            status_breakdown,
        }
    }
}

// ============================================================================
// SECTION: Failed Operations
// ============================================================================

/// Summary used when a failed operation's stored output is null or blank.
pub const NO_ERROR_DETAILS: &str = "No error details available";
/// Summary used when the output has no `error` field.
pub const UNKNOWN_ERROR: &str = "Unknown error";
/// Summary used when the stored output is not valid JSON.
pub const UNPARSEABLE_OUTPUT: &str = "Unparseable output_data";

/// Failed operation with a best-effort error summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOperation {
    /// The failed operation.
    pub operation: OperationRecord,
    /// Organization of the owning task.
    pub org_id: OrgId,
    /// Human-readable error summary extracted from `output_data`.
    pub error_summary: String,
}

/// Extracts an error summary from a failed operation's decoded output.
///
/// An empty object has no `error` field and reads as [`UNKNOWN_ERROR`];
/// backends report [`NO_ERROR_DETAILS`] themselves when nothing was stored.
#[must_use]
pub fn summarize_error(output: &Payload) -> String {
    match output.get("error") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => UNKNOWN_ERROR.to_string(),
        Some(other) => other.to_string(),
    }
}

// ============================================================================
// SECTION: Task Summaries
// ============================================================================

/// Operation counts for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// All operations.
    pub total_operations: usize,
    /// Operations with status `done`.
    pub completed_operations: usize,
    /// Operations with status `failed`.
    pub failed_operations: usize,
    /// Operations with status `running`.
    pub running_operations: usize,
}

impl TaskSummary {
    /// Counts operations by status.
    #[must_use]
    pub fn from_operations(operations: &[OperationRecord]) -> Self {
        operations.iter().fold(
            Self { total_operations: operations.len(), ..Self::default() },
            |mut summary, operation| {
                match operation.execution_status {
                    ExecutionStatus::Done => summary.completed_operations += 1,
                    ExecutionStatus::Failed => summary.failed_operations += 1,
                    ExecutionStatus::Running => summary.running_operations += 1,
                }
                summary
            },
        )
    }
}

/// Task with its operations in canonical order and their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOverview {
    /// The task record.
    pub task: TaskRecord,
    /// Operations ordered by `(runtime_index, chain_index)`.
    pub operations: Vec<OperationRecord>,
    /// Operation counts.
    pub summary: TaskSummary,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::StagePerformanceMetrics;
    use super::StatusGroup;
    use super::UNKNOWN_ERROR;
    use super::summarize_error;
    use crate::core::identifiers::ExecutorName;
    use crate::core::payload::Payload;
    use crate::core::records::ExecutionStatus;

    #[test]
    fn empty_groups_report_zero_rates() {
        let metrics =
            StagePerformanceMetrics::from_groups(ExecutorName::new("lead_scoring"), None, &[]);
        assert_eq!(metrics.total_executions, 0);
        assert!(metrics.success_rate.abs() < f64::EPSILON);
        assert!(metrics.failure_rate.abs() < f64::EPSILON);
        assert!(metrics.avg_duration_minutes.abs() < f64::EPSILON);
        assert!(metrics.status_breakdown.is_empty());
    }

    #[test]
    fn rates_and_weighted_duration() {
        let groups = [
            StatusGroup {
                status: ExecutionStatus::Done,
                count: 3,
                avg_duration_millis: Some(120_000.0),
            },
            StatusGroup {
                status: ExecutionStatus::Failed,
                count: 1,
                avg_duration_millis: Some(60_000.0),
            },
        ];
        let metrics =
            StagePerformanceMetrics::from_groups(ExecutorName::new("drafting"), None, &groups);
        assert_eq!(metrics.total_executions, 4);
        assert!((metrics.success_rate - 75.0).abs() < 1e-9);
        assert!((metrics.failure_rate - 25.0).abs() < 1e-9);
        // (3 * 2min + 1 * 1min) / 4
        assert!((metrics.avg_duration_minutes - 1.75).abs() < 1e-9);
        let done = metrics.status_breakdown.get(&ExecutionStatus::Done).copied();
        assert_eq!(done.map(|slice| slice.count), Some(3));
    }

    #[test]
    fn error_summary_prefers_error_field() {
        assert_eq!(summarize_error(&Payload::empty()), UNKNOWN_ERROR);
        assert_eq!(summarize_error(&Payload::new(json!({"error": "timeout"}))), "timeout");
        assert_eq!(summarize_error(&Payload::new(json!({"partial": true}))), UNKNOWN_ERROR);
        assert_eq!(
            summarize_error(&Payload::new(json!({"error": {"code": 502}}))),
            "{\"code\":502}"
        );
    }
}
