// crates/pipeline-ledger-config/src/config.rs
// ============================================================================
// Module: Pipeline Ledger Configuration
// Description: Configuration loading and validation for the ledger store.
// Purpose: Provide strict config parsing with hard limits.
// Dependencies: pipeline-ledger-core, pipeline-ledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! An explicit path or the `PIPELINE_LEDGER_CONFIG` variable must point at a
//! readable file; only the implicit default file may be absent, in which case
//! defaults apply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use pipeline_ledger_core::OrgId;
use pipeline_ledger_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use pipeline_ledger_store_sqlite::SqliteStoreConfig;
use pipeline_ledger_store_sqlite::SqliteStoreMode;
use pipeline_ledger_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::logging::LoggingConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "pipeline-ledger.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PIPELINE_LEDGER_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default store directory.
const DEFAULT_DATA_DIR: &str = "./ledger_data";
/// Default store file name.
const DEFAULT_FILE_NAME: &str = "ledger.db";
/// Default organization seeded with reference data.
const DEFAULT_SEED_ORG: &str = "default";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Pipeline ledger configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Store location and `SQLite` tuning.
    #[serde(default)]
    pub store: StoreSection,
    /// Reference data seeding.
    #[serde(default)]
    pub seed: SeedSection,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Root directory for the store file; created if absent.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Store file name inside `data_dir`.
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_file_name(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// `[seed]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSection {
    /// Seed baseline reference data when the store opens.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Organization to seed.
    #[serde(default = "default_seed_org")]
    pub org_id: String,
}

impl Default for SeedSection {
    fn default() -> Self {
        Self { enabled: true, org_id: default_seed_org() }
    }
}

impl LedgerConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// `path` wins over `PIPELINE_LEDGER_CONFIG`, which wins over
    /// `pipeline-ledger.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, implicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if implicit && !resolved.exists() {
            debug!(path = %resolved.display(), "no config file found; using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml_str(content)?;
        debug!(path = %resolved.display(), "config loaded");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.seed.validate()?;
        self.logging.validate()
    }

    /// Returns the full store file path.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store.data_dir.join(&self.store.file_name)
    }

    /// Builds the store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.store_path(),
            busy_timeout_ms: self.store.busy_timeout_ms,
            journal_mode: self.store.journal_mode,
            sync_mode: self.store.sync_mode,
            seed_org: self.seed.enabled.then(|| OrgId::new(self.seed.org_id.trim())),
        }
    }
}

impl StoreSection {
    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let file_name = self.file_name.trim();
        if file_name.is_empty() {
            return Err(ConfigError::Invalid("store.file_name must be non-empty".to_string()));
        }
        if file_name.contains('/') || file_name.contains('\\') {
            return Err(ConfigError::Invalid(
                "store.file_name must not contain path separators".to_string(),
            ));
        }
        if file_name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store.file_name too long".to_string()));
        }
        validate_path_string("store.data_dir", &self.data_dir.to_string_lossy())?;
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl SeedSection {
    /// Validates seed settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.org_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "seed.org_id must be non-empty when seeding is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; the flag is true for the implicit default file.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), false));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), false));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), true))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default for `store.data_dir`.
fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Default for `store.file_name`.
fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

/// Default for `store.busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default for `seed.enabled`.
const fn default_true() -> bool {
    true
}

/// Default for `seed.org_id`.
fn default_seed_org() -> String {
    DEFAULT_SEED_ORG.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions and helpers are permitted.")]

    use std::path::PathBuf;

    use pipeline_ledger_core::OrgId;
    use pipeline_ledger_store_sqlite::SqliteStoreMode;

    use super::LedgerConfig;
    use super::validate_path_string;

    #[test]
    fn defaults_validate_and_seed_default_org() {
        let config = LedgerConfig::default();
        config.validate().unwrap();
        let store = config.store_config();
        assert_eq!(store.path, PathBuf::from("./ledger_data").join("ledger.db"));
        assert_eq!(store.seed_org, Some(OrgId::new("default")));
        assert_eq!(store.journal_mode, SqliteStoreMode::Delete);
    }

    #[test]
    fn disabled_seeding_drops_seed_org() {
        let config = LedgerConfig::from_toml_str("[seed]\nenabled = false\norg_id = \"\"\n").unwrap();
        assert!(config.store_config().seed_org.is_none());
    }

    #[test]
    fn validate_rejects_bad_store_settings() {
        for text in [
            "[store]\nfile_name = \"\"\n",
            "[store]\nfile_name = \"nested/ledger.db\"\n",
            "[store]\nbusy_timeout_ms = 0\n",
            "[seed]\norg_id = \"  \"\n",
            "[logging]\nfilter = \"ledger=loud\"\n",
        ] {
            assert!(LedgerConfig::from_toml_str(text).is_err(), "accepted: {text}");
        }
    }

    #[test]
    fn validate_path_string_rejects_empty_string() {
        assert!(validate_path_string("store.data_dir", "").is_err());
        assert!(validate_path_string("store.data_dir", "./data").is_ok());
    }
}
