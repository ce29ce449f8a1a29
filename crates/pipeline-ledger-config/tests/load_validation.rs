//! Config load validation tests for pipeline-ledger-config.
// crates/pipeline-ledger-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use pipeline_ledger_config::ConfigError;
use pipeline_ledger_config::LedgerConfig;
use pipeline_ledger_config::config::MAX_CONFIG_FILE_SIZE;
use pipeline_ledger_core::OrgId;
use pipeline_ledger_store_sqlite::SqliteStoreMode;
use pipeline_ledger_store_sqlite::SqliteSyncMode;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<LedgerConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(LedgerConfig::load(Some(path)), "config path exceeds max length")?;
    Ok(())
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(LedgerConfig::load(Some(path)), "config path component too long")?;
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; MAX_CONFIG_FILE_SIZE + 1];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "config file exceeds size limit")?;
    Ok(())
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "config file must be utf-8")?;
    Ok(())
}

#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let missing = dir.path().join("absent.toml");
    assert_invalid(LedgerConfig::load(Some(&missing)), "config io error")?;
    Ok(())
}

#[test]
fn load_rejects_unknown_fields() -> TestResult {
    let file = write_config("[store]\nfile = \"ledger.db\"\n")?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "config parse error")?;
    Ok(())
}

#[test]
fn load_rejects_invalid_store_settings() -> TestResult {
    let file = write_config("[store]\nfile_name = \"nested/ledger.db\"\n")?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "path separators")?;
    let file = write_config("[store]\nbusy_timeout_ms = 0\n")?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "busy_timeout_ms")?;
    let file = write_config("[seed]\nenabled = true\norg_id = \"\"\n")?;
    assert_invalid(LedgerConfig::load(Some(file.path())), "seed.org_id")?;
    Ok(())
}

#[test]
fn load_builds_store_config() -> TestResult {
    let file = write_config(
        "[store]\n\
         data_dir = \"/var/lib/ledger\"\n\
         file_name = \"pipeline.db\"\n\
         busy_timeout_ms = 250\n\
         journal_mode = \"wal\"\n\
         sync_mode = \"normal\"\n\
         \n\
         [seed]\n\
         org_id = \"org-a\"\n\
         \n\
         [logging]\n\
         filter = \"pipeline_ledger_store_sqlite=debug\"\n",
    )?;
    let config = LedgerConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let store = config.store_config();
    if store.path != PathBuf::from("/var/lib/ledger").join("pipeline.db") {
        return Err(format!("unexpected store path {}", store.path.display()));
    }
    if store.busy_timeout_ms != 250 {
        return Err(format!("unexpected busy timeout {}", store.busy_timeout_ms));
    }
    if store.journal_mode != SqliteStoreMode::Wal || store.sync_mode != SqliteSyncMode::Normal {
        return Err("journal and sync modes were not applied".to_string());
    }
    if store.seed_org != Some(OrgId::new("org-a")) {
        return Err("seed org was not applied".to_string());
    }
    Ok(())
}
