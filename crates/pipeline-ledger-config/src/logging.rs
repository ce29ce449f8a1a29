// crates/pipeline-ledger-config/src/logging.rs
// ============================================================================
// Module: Logging Bootstrap
// Description: Tracing subscriber installation for ledger hosts.
// Purpose: Route store and migration events to stderr with a level filter.
// Dependencies: serde, tracing-subscriber
// ============================================================================

//! ## Overview
//! The store and migration engine emit `tracing` events only. Hosts call
//! [`init_logging`] once at startup; `RUST_LOG` overrides the configured
//! filter when set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default filter directive.
const DEFAULT_FILTER: &str = "info";

// ============================================================================
// SECTION: Types
// ============================================================================

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

impl LoggingConfig {
    /// Validates the filter directive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the directive does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|err| ConfigError::Invalid(format!("logging.filter: {err}")))
    }
}

// ============================================================================
// SECTION: Installation
// ============================================================================

/// Installs the global `tracing` subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the configured filter is invalid.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|err| ConfigError::Invalid(format!("logging.filter: {err}")))?,
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    Ok(installed)
}

/// Default for `logging.filter`.
fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions and helpers are permitted.")]

    use super::LoggingConfig;
    use super::init_logging;

    #[test]
    fn second_install_is_not_an_error() {
        let config = LoggingConfig { filter: "pipeline_ledger_store_sqlite=debug".to_string() };
        config.validate().unwrap();
        init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn blank_filter_is_rejected() {
        assert!(LoggingConfig { filter: "  ".to_string() }.validate().is_err());
    }
}
