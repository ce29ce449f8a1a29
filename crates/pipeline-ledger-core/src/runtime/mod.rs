// crates/pipeline-ledger-core/src/runtime/mod.rs
// ============================================================================
// Module: Pipeline Ledger Runtime
// Description: Read-side helpers composed from the repository traits.
// Purpose: Host the query facade and the in-memory backend.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`facade`] combines repository reads and never writes. [`memory`]
//! implements both repositories in process for tests and dry runs.

pub mod facade;
pub mod memory;
