// crates/pipeline-ledger-store-sqlite/src/lib.rs
// ============================================================================
// Module: Pipeline Ledger SQLite Store
// Description: SQLite persistence for tasks, operations, and reference data.
// Purpose: Provide the durable ledger backend and its legacy migration.
// Dependencies: pipeline-ledger-core, rusqlite, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! [`LedgerStore`] implements the core repository traits over a single
//! `SQLite` file. Opening a store brings the schema to [`SCHEMA_VERSION`]
//! exactly once per file per process through an [`InitRegistry`], and the
//! [`MigrationEngine`] moves legacy `executions`/`stage_results` history into
//! the task/operation tables with backup, validation, and rollback.
//! Invariants:
//! - Every repository call opens its own short-lived connection.
//! - Payload columns hold JSON text; timestamps are unix milliseconds.
//! - Legacy tables are never dropped.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod codec;
pub mod migration;
mod operations;
pub mod reference;
pub mod registry;
pub mod schema;
pub mod store;
mod tasks;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use migration::MigrationEngine;
pub use migration::MigrationError;
pub use migration::MigrationReport;
pub use migration::MigrationState;
pub use migration::ValidationReport;
pub use reference::CatalogEntry;
pub use reference::DEFAULT_PLAN_ID;
pub use reference::PlanExecutor;
pub use reference::PlanRecord;
pub use reference::ScoringCriterion;
pub use registry::InitRegistry;
pub use schema::SCHEMA_VERSION;
pub use store::DEFAULT_BUSY_TIMEOUT_MS;
pub use store::InitOutcome;
pub use store::LedgerStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
