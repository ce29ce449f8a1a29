// crates/pipeline-ledger-core/src/lib.rs
// ============================================================================
// Module: Pipeline Ledger Core Library
// Description: Storage-agnostic model for pipeline runs and stage attempts.
// Purpose: Share task/operation records, repository traits, and analytics.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Pipeline Ledger records each pipeline run as a [`TaskRecord`] and every
//! stage attempt within it as an [`OperationRecord`]. This crate defines those
//! records, the [`TaskRepository`] and [`OperationRepository`] seams that
//! storage backends implement, and the read-only [`LedgerQueries`] facade.
//! Invariants:
//! - Operations are ordered canonically by `(runtime_index, chain_index)`.
//! - Opaque payload columns round-trip exactly through [`Payload`].
//! - Not-found is `Ok(None)`, never an error.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::analytics::DateRange;
pub use crate::core::analytics::FailedOperation;
pub use crate::core::analytics::StagePerformanceMetrics;
pub use crate::core::analytics::StatusBreakdown;
pub use crate::core::analytics::StatusGroup;
pub use crate::core::analytics::TaskOverview;
pub use crate::core::analytics::TaskSummary;
pub use crate::core::analytics::summarize_error;
pub use crate::core::identifiers::ExecutorName;
pub use crate::core::identifiers::OperationId;
pub use crate::core::identifiers::OrgId;
pub use crate::core::identifiers::PlanId;
pub use crate::core::identifiers::TaskId;
pub use crate::core::payload::Payload;
pub use crate::core::payload::PayloadError;
pub use crate::core::records::ExecutionStatus;
pub use crate::core::records::NewOperation;
pub use crate::core::records::NewTask;
pub use crate::core::records::OperationRecord;
pub use crate::core::records::StatusParseError;
pub use crate::core::records::TaskFilter;
pub use crate::core::records::TaskMessage;
pub use crate::core::records::TaskRecord;
pub use crate::core::records::TaskStatus;
pub use crate::core::time::Timestamp;
pub use crate::interfaces::OperationRepository;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::TaskRepository;
pub use crate::runtime::facade::LedgerQueries;
pub use crate::runtime::memory::InMemoryLedgerStore;
