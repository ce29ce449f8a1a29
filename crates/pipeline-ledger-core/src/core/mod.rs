// crates/pipeline-ledger-core/src/core/mod.rs
// ============================================================================
// Module: Pipeline Ledger Core Model
// Description: Identifiers, payloads, records, time values, and analytics.
// Purpose: Group the storage-agnostic value types of the ledger.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Value types shared by every ledger backend. Nothing in this module performs
//! I/O or reads the wall clock.

pub mod analytics;
pub mod identifiers;
pub mod payload;
pub mod records;
pub mod time;
