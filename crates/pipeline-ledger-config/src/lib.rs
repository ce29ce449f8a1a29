// crates/pipeline-ledger-config/src/lib.rs
// ============================================================================
// Module: Pipeline Ledger Config Library
// Description: Configuration model, load guards, and logging bootstrap.
// Purpose: Single source of truth for pipeline-ledger.toml semantics.
// Dependencies: pipeline-ledger-core, pipeline-ledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `pipeline-ledger-config` loads [`LedgerConfig`] from TOML with strict
//! path, size, and encoding limits, validates it, and turns it into the
//! [`pipeline_ledger_store_sqlite::SqliteStoreConfig`] the store opens with.
//! [`init_logging`] installs the `tracing` subscriber the rest of the
//! workspace logs through.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod logging;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::LedgerConfig;
pub use config::SeedSection;
pub use config::StoreSection;
pub use logging::LoggingConfig;
pub use logging::init_logging;
