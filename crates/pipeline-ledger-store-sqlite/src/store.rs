// crates/pipeline-ledger-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Ledger Store
// Description: Store configuration, errors, and the connection-per-call handle.
// Purpose: Open, initialize, and hand out connections to one ledger file.
// Dependencies: pipeline-ledger-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`LedgerStore`] owns the configuration for one `SQLite` ledger file. Opening
//! it validates the path, creates the parent directory, and runs schema
//! initialization at most once per location per [`InitRegistry`]. Every
//! repository call afterwards opens its own short-lived connection, so no
//! transaction spans two calls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::reference;
use crate::registry::InitRegistry;
use crate::schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout for `SQLite` connections.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Longest accepted file or directory name in the store path.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Longest accepted store path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Journal mode applied to every ledger connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// Rollback-journal mode; the database file is always self-contained.
    #[default]
    Delete,
    /// WAL journal mode; backups checkpoint before copying.
    Wal,
}

impl SqliteStoreMode {
    /// Value for `PRAGMA journal_mode`.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Wal => "wal",
        }
    }
}

/// Durability level applied to every ledger connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Sync on every commit.
    #[default]
    Full,
    /// Sync at checkpoints only; a crash may drop the last commits in WAL mode.
    Normal,
}

impl SqliteSyncMode {
    /// Value for `PRAGMA synchronous`.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Where the ledger file lives and how connections to it are tuned.
///
/// # Invariants
/// - `path` names a file; an existing directory at that path is rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Ledger database file.
    pub path: PathBuf,
    /// How long a connection waits on a locked file, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode for every connection.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Durability level for every connection.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Organization to seed baseline reference data for, if any.
    #[serde(default)]
    pub seed_org: Option<OrgId>,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for everything but the path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            seed_org: None,
        }
    }
}

/// Serde default for `busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the `SQLite` ledger store.
///
/// # Invariants
/// - Messages never include stored payload text.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Filesystem failure around the ledger file.
    #[error("ledger io error: {0}")]
    Io(String),
    /// `SQLite` rejected a statement or connection.
    #[error("ledger database error: {0}")]
    Db(String),
    /// The file was written by a newer schema.
    #[error("ledger schema version mismatch: {0}")]
    VersionMismatch(String),
    /// The request conflicts with stored rows or limits.
    #[error("ledger invalid request: {0}")]
    Invalid(String),
    /// Legacy migration failed.
    #[error("ledger migration error: {0}")]
    Migration(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::Migration(message) => {
                Self::Store(message)
            }
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// How the store came to be usable when it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The registry already held this location; nothing was touched.
    AlreadyInitialized,
    /// The file already carried the current schema; DDL was skipped.
    Probed,
    /// The schema chain ran.
    Initialized,
}

/// `SQLite`-backed ledger store.
///
/// # Invariants
/// - The schema is at the current version once construction succeeds.
/// - Each repository call uses its own connection.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Absolute path used as the registry key.
    location: PathBuf,
    /// Registry that recorded this location as initialized.
    registry: Arc<InitRegistry>,
    /// Initialization path taken by `open`.
    init_outcome: InitOutcome,
}

impl LedgerStore {
    /// Opens a store using the process-wide [`InitRegistry`].
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the file cannot
    /// be opened, or schema creation fails.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::open_with_registry(config, InitRegistry::global())
    }

    /// Opens a store, recording initialization in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the file cannot
    /// be opened, or schema creation fails. Seeding and settings-column
    /// failures are logged and do not fail the open.
    pub fn open_with_registry(
        config: SqliteStoreConfig,
        registry: Arc<InitRegistry>,
    ) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let location =
            std::path::absolute(&config.path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        let ran = registry.run_once(&location, || {
            let mut connection = open_connection(&config)?;
            let outcome = if schema::probe_initialized(&connection) {
                InitOutcome::Probed
            } else {
                let version = schema::initialize_schema(&mut connection)?;
                info!(path = %config.path.display(), version, "ledger schema initialized");
                InitOutcome::Initialized
            };
            schema::rename_legacy_settings_columns(&mut connection);
            if let Some(org_id) = &config.seed_org {
                reference::seed_defaults(&mut connection, org_id);
            }
            Ok::<_, SqliteStoreError>(outcome)
        })?;
        let init_outcome = ran.unwrap_or(InitOutcome::AlreadyInitialized);
        Ok(Self { config, location, registry, init_outcome })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns how initialization went when this handle was opened.
    #[must_use]
    pub const fn init_outcome(&self) -> InitOutcome {
        self.init_outcome
    }

    /// Returns the registry this store was initialized through.
    #[must_use]
    pub fn registry(&self) -> Arc<InitRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns the absolute path the registry knows this store by.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Reads the schema version stored in the file.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be read.
    pub fn schema_version(&self) -> Result<Option<i64>, SqliteStoreError> {
        let connection = self.connect()?;
        schema::read_version(&connection)
    }

    /// Opens a fresh connection with the configured pragmas.
    pub(crate) fn connect(&self) -> Result<Connection, SqliteStoreError> {
        open_connection(&self.config)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the directory that will hold the ledger file.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| SqliteStoreError::Io(format!("{}: {err}", parent.display()))),
        Some(_) => Ok(()),
        None => Err(SqliteStoreError::Invalid(format!("{} has no parent", path.display()))),
    }
}

/// Rejects empty, overlong, or directory store paths.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(SqliteStoreError::Invalid("ledger path is empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "ledger path longer than {MAX_TOTAL_PATH_LENGTH} bytes"
        )));
    }
    if path.components().any(|part| part.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(SqliteStoreError::Invalid(format!(
            "ledger path has a name longer than {MAX_PATH_COMPONENT_LENGTH} bytes"
        )));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(format!("{} is a directory", path.display())));
    }
    Ok(())
}

/// Opens a read-write connection, creating the file when absent.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open_with_flags(
        &config.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies journal, sync, and busy-timeout settings.
///
/// Foreign keys stay off: task ownership of operations is declarative and
/// the store never cascades.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    let pragmas = format!(
        "PRAGMA foreign_keys = OFF; PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        config.journal_mode.pragma_value(),
        config.sync_mode.pragma_value(),
    );
    connection.execute_batch(&pragmas).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Wall-clock time as unix milliseconds; saturates instead of failing.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pipeline_ledger_core::StoreError;

    use super::SqliteStoreError;
    use super::validate_store_path;

    #[test]
    fn migration_errors_surface_as_store_errors() {
        let mapped: StoreError = SqliteStoreError::Migration("validation failed".into()).into();
        assert!(matches!(mapped, StoreError::Store(message) if message == "validation failed"));
        let mapped: StoreError = SqliteStoreError::Invalid("slot taken".into()).into();
        assert!(matches!(mapped, StoreError::Invalid(_)));
    }

    #[test]
    fn store_path_rejects_overlong_component() {
        let long = "a".repeat(300);
        assert!(validate_store_path(Path::new(&long)).is_err());
        assert!(validate_store_path(Path::new("")).is_err());
        assert!(validate_store_path(Path::new("ledger.db")).is_ok());
    }
}
