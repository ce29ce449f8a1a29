// crates/pipeline-ledger-store-sqlite/src/registry.rs
// ============================================================================
// Module: Init Registry
// Description: Tracks which ledger files this process has initialized.
// Purpose: Skip redundant schema work when a location is opened repeatedly.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`InitRegistry`] maps absolute store locations to "already initialized".
//! Its mutex is held for the whole initialization of a location, so threads
//! opening the same file serialize on the first open. It says nothing about
//! other processes; callers running several processes against one file must
//! coordinate first access themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Process-wide registry shared by [`crate::LedgerStore::open`].
static GLOBAL_REGISTRY: OnceLock<Arc<InitRegistry>> = OnceLock::new();

/// Set of initialized store locations.
///
/// # Invariants
/// - A location is recorded only after its initialization succeeded.
#[derive(Debug, Default)]
pub struct InitRegistry {
    /// Absolute paths of initialized store files.
    initialized: Mutex<HashSet<PathBuf>>,
}

impl InitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::new())))
    }

    /// Runs `init` unless `location` is already recorded.
    ///
    /// Returns `Ok(None)` when the location was already initialized, or the
    /// value produced by `init` after recording the location.
    ///
    /// # Errors
    ///
    /// Returns the error from `init`; the location stays unrecorded.
    pub fn run_once<T, E>(
        &self,
        location: &Path,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        let mut initialized = self.initialized.lock().unwrap_or_else(PoisonError::into_inner);
        if initialized.contains(location) {
            return Ok(None);
        }
        let value = init()?;
        initialized.insert(location.to_path_buf());
        Ok(Some(value))
    }

    /// Returns true when `location` is recorded.
    #[must_use]
    pub fn is_initialized(&self, location: &Path) -> bool {
        self.initialized.lock().unwrap_or_else(PoisonError::into_inner).contains(location)
    }

    /// Drops `location` so the next open re-probes the file.
    pub fn forget(&self, location: &Path) {
        self.initialized.lock().unwrap_or_else(PoisonError::into_inner).remove(location);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
