// crates/pipeline-ledger-store-sqlite/src/schema.rs
// ============================================================================
// Module: Ledger Schema
// Description: Versioned DDL chain, compatibility views, and column repair.
// Purpose: Bring any ledger file, legacy or fresh, to the current schema.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! The schema version lives in `store_meta`. Each [`SchemaStep`] is
//! idempotent and runs in its own transaction together with its version bump,
//! so a crash between steps leaves the file at the last completed version.
//! Files written before versioning existed report no version and replay the
//! whole chain, which only creates what is missing and backfills columns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current `SQLite` schema version for the ledger.
pub const SCHEMA_VERSION: i64 = 4;

/// Tables whose presence marks an initialized ledger file.
const MARKER_TABLES: [&str; 3] = ["tasks", "operations", "stage_results"];

/// Legacy `team_settings` column names and their current replacements.
const SETTINGS_COLUMN_RENAMES: [(&str, &str); 9] = [
    ("organization_settings", "organization"),
    ("sales_rep_settings", "sales_rep"),
    ("product_settings", "product"),
    ("schedule_time_settings", "schedule_time"),
    ("initial_outreach_settings", "initial_outreach"),
    ("follow_up_settings", "follow_up"),
    ("auto_interaction_settings", "auto_interaction"),
    ("followup_schedule_settings", "followup_schedule_time"),
    ("birthday_email_settings", "birthday_email"),
];

/// Current `team_settings` columns in table order.
const SETTINGS_COLUMNS: [&str; 18] = [
    "id",
    "team_id",
    "org_id",
    "plan_id",
    "plan_name",
    "project_code",
    "team_name",
    "organization",
    "sales_rep",
    "product",
    "schedule_time",
    "initial_outreach",
    "follow_up",
    "auto_interaction",
    "followup_schedule_time",
    "birthday_email",
    "created_at",
    "updated_at",
];

/// `team_settings` definition with current column names; `{table}` is
/// substituted so the same text builds the rebuild target.
const SETTINGS_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    team_id TEXT NOT NULL,
    org_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    plan_name TEXT,
    project_code TEXT,
    team_name TEXT,
    organization TEXT,
    sales_rep TEXT,
    product TEXT,
    schedule_time TEXT,
    initial_outreach TEXT,
    follow_up TEXT,
    auto_interaction TEXT,
    followup_schedule_time TEXT,
    birthday_email TEXT,
    created_at INTEGER,
    updated_at INTEGER
);";

/// Columns added to `tasks` on files that predate them.
const TASK_BACKFILL_COLUMNS: [(&str, &str); 5] = [
    ("current_runtime_index", "INTEGER NOT NULL DEFAULT 0"),
    ("messages", "TEXT NOT NULL DEFAULT '[]'"),
    ("request_body", "TEXT NOT NULL DEFAULT '{}'"),
    ("created_at", "INTEGER NOT NULL DEFAULT 0"),
    ("updated_at", "INTEGER NOT NULL DEFAULT 0"),
];

/// Columns added to `operations` on files that predate them.
const OPERATION_BACKFILL_COLUMNS: [(&str, &str); 6] = [
    ("runtime_index", "INTEGER NOT NULL DEFAULT 0"),
    ("chain_index", "INTEGER NOT NULL DEFAULT 0"),
    ("input_data", "TEXT NOT NULL DEFAULT '{}'"),
    ("output_data", "TEXT NOT NULL DEFAULT '{}'"),
    ("date_created", "INTEGER NOT NULL DEFAULT 0"),
    ("date_updated", "INTEGER NOT NULL DEFAULT 0"),
];

// ============================================================================
// SECTION: Schema Steps
// ============================================================================

/// One versioned schema step.
struct SchemaStep {
    /// Version recorded once the step commits.
    version: i64,
    /// Label used in logs.
    name: &'static str,
    /// Applies the step inside an open transaction.
    apply: fn(&Connection) -> Result<(), SqliteStoreError>,
}

/// Linear schema chain, ordered by version.
const SCHEMA_STEPS: [SchemaStep; 4] = [
    SchemaStep { version: 1, name: "legacy_tables", apply: apply_legacy_tables },
    SchemaStep { version: 2, name: "task_operation_tables", apply: apply_task_tables },
    SchemaStep { version: 3, name: "compatibility_views", apply: apply_compatibility_views },
    SchemaStep { version: 4, name: "reference_tables", apply: apply_reference_tables },
];

/// Creates the legacy execution tables read by the migration engine.
fn apply_legacy_tables(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                org_name TEXT,
                customer_website TEXT,
                customer_name TEXT,
                status TEXT NOT NULL,
                started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP,
                config_json TEXT,
                results_json TEXT
            );
            CREATE TABLE IF NOT EXISTS stage_results (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                stage_name TEXT NOT NULL,
                status TEXT NOT NULL,
                input_data TEXT,
                output_data TEXT,
                started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP,
                error_message TEXT,
                FOREIGN KEY (execution_id) REFERENCES executions(execution_id)
            );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    // Older installs may have replaced these with views; indexes need tables.
    if table_exists(connection, "executions")? {
        connection
            .execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_executions_org_id ON executions (org_id);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    if table_exists(connection, "stage_results")? {
        connection
            .execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_stage_results_execution_id
                    ON stage_results (execution_id);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Creates the task and operation tables, backfills columns, and indexes.
fn apply_task_tables(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                plan_id TEXT NOT NULL,
                org_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                current_runtime_index INTEGER NOT NULL DEFAULT 0,
                messages TEXT NOT NULL DEFAULT '[]',
                request_body TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS operations (
                operation_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                executor_name TEXT NOT NULL,
                runtime_index INTEGER NOT NULL DEFAULT 0,
                chain_index INTEGER NOT NULL DEFAULT 0,
                execution_status TEXT NOT NULL DEFAULT 'running',
                input_data TEXT NOT NULL DEFAULT '{}',
                output_data TEXT NOT NULL DEFAULT '{}',
                date_created INTEGER NOT NULL DEFAULT 0,
                date_updated INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (task_id) REFERENCES tasks(task_id)
            );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    backfill_columns(connection, "tasks", &TASK_BACKFILL_COLUMNS)?;
    backfill_columns(connection, "operations", &OPERATION_BACKFILL_COLUMNS)?;
    connection
        .execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_tasks_org_id ON tasks (org_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_plan_id ON tasks (plan_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
            CREATE INDEX IF NOT EXISTS idx_operations_task_id ON operations (task_id);
            CREATE INDEX IF NOT EXISTS idx_operations_task_runtime
                ON operations (task_id, runtime_index);
            CREATE INDEX IF NOT EXISTS idx_operations_executor_status
                ON operations (executor_name, execution_status);
            CREATE INDEX IF NOT EXISTS idx_operations_date_created ON operations (date_created);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_operations_task_runtime_chain
                ON operations (task_id, runtime_index, chain_index);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Creates read-only views projecting the current tables into legacy shapes.
fn apply_compatibility_views(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE VIEW IF NOT EXISTS executions_view AS
            SELECT
                task_id AS execution_id,
                org_id,
                '' AS org_name,
                '' AS customer_website,
                '' AS customer_name,
                status,
                datetime(created_at / 1000, 'unixepoch') AS started_at,
                datetime(updated_at / 1000, 'unixepoch') AS completed_at,
                request_body AS config_json,
                '{}' AS results_json
            FROM tasks;
            CREATE VIEW IF NOT EXISTS stage_results_view AS
            SELECT
                operation_id AS id,
                task_id AS execution_id,
                executor_name AS stage_name,
                CASE execution_status WHEN 'done' THEN 'success' ELSE execution_status END
                    AS status,
                input_data,
                output_data,
                datetime(date_created / 1000, 'unixepoch') AS started_at,
                datetime(date_updated / 1000, 'unixepoch') AS completed_at,
                CASE WHEN execution_status = 'failed' AND json_valid(output_data)
                    THEN json_extract(output_data, '$.error')
                    ELSE NULL END AS error_message
            FROM operations;",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Creates reference tables for plans, scoring criteria, catalog, and teams.
fn apply_reference_tables(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS plans (
                plan_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                org_id TEXT NOT NULL,
                status TEXT NOT NULL,
                executors TEXT NOT NULL DEFAULT '[]',
                settings TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scoring_criteria (
                criterion_id TEXT NOT NULL,
                org_id TEXT NOT NULL,
                name TEXT NOT NULL,
                definition TEXT,
                weight REAL NOT NULL,
                scoring_factors TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                PRIMARY KEY (org_id, criterion_id)
            );
            CREATE TABLE IF NOT EXISTS catalog_entries (
                entry_id TEXT NOT NULL,
                org_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                PRIMARY KEY (org_id, entry_id)
            );
            CREATE INDEX IF NOT EXISTS idx_plans_org_id ON plans (org_id);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&SETTINGS_TABLE_DDL.replace("{table}", "team_settings"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_team_settings_team_id ON team_settings (team_id);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Runs every schema step newer than the stored version.
///
/// Returns the version the file is at afterwards.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when the file is newer than
/// this build understands, or [`SqliteStoreError::Db`] when a step fails.
pub fn initialize_schema(connection: &mut Connection) -> Result<i64, SqliteStoreError> {
    connection
        .execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let current = read_version(connection)?.unwrap_or(0);
    if !(0..=SCHEMA_VERSION).contains(&current) {
        return Err(SqliteStoreError::VersionMismatch(format!(
            "unsupported schema version: {current}"
        )));
    }
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > current) {
        let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        (step.apply)(&tx)?;
        tx.execute("DELETE FROM store_meta", params![])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![step.version])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        debug!(version = step.version, step = step.name, "applied schema step");
    }
    Ok(SCHEMA_VERSION)
}

/// Reads the stored schema version; `None` when the file is unversioned.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the metadata cannot be read.
pub fn read_version(connection: &Connection) -> Result<Option<i64>, SqliteStoreError> {
    if !table_exists(connection, "store_meta")? {
        return Ok(None);
    }
    connection
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Returns true when the marker tables exist at the current version.
///
/// Probe failures are logged and reported as "not initialized".
pub fn probe_initialized(connection: &Connection) -> bool {
    let probe = || -> Result<bool, SqliteStoreError> {
        for table in MARKER_TABLES {
            if !table_exists(connection, table)? {
                return Ok(false);
            }
        }
        Ok(read_version(connection)? == Some(SCHEMA_VERSION))
    };
    probe().unwrap_or_else(|err| {
        warn!(error = %err, "ledger init probe failed; running full initialization");
        false
    })
}

// ============================================================================
// SECTION: Settings Column Repair
// ============================================================================

/// Rebuilds `team_settings` with current column names if it still carries
/// legacy ones. Failures are logged and leave the table untouched.
pub fn rename_legacy_settings_columns(connection: &mut Connection) {
    match try_rename_settings_columns(connection) {
        Ok(true) => info!("team_settings columns renamed to current names"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "team_settings column rename skipped"),
    }
}

/// Performs the create-new/copy/drop/rename rebuild in one transaction.
fn try_rename_settings_columns(connection: &mut Connection) -> Result<bool, SqliteStoreError> {
    if !table_exists(connection, "team_settings")? {
        return Ok(false);
    }
    let existing = table_columns(connection, "team_settings")?;
    let has_legacy = SETTINGS_COLUMN_RENAMES
        .iter()
        .any(|(legacy, _)| existing.iter().any(|column| column == legacy));
    if !has_legacy {
        return Ok(false);
    }
    let sources: Vec<String> = SETTINGS_COLUMNS
        .iter()
        .map(|column| {
            if existing.iter().any(|name| name == column) {
                return (*column).to_string();
            }
            SETTINGS_COLUMN_RENAMES
                .iter()
                .find(|(legacy, current)| {
                    current == column && existing.iter().any(|name| name == legacy)
                })
                .map_or_else(|| "NULL".to_string(), |(legacy, _)| (*legacy).to_string())
        })
        .collect();
    let copy = format!(
        "INSERT OR IGNORE INTO team_settings_new ({}) SELECT {} FROM team_settings",
        SETTINGS_COLUMNS.join(", "),
        sources.join(", ")
    );
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("DROP TABLE IF EXISTS team_settings_new;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(&SETTINGS_TABLE_DDL.replace("{table}", "team_settings_new"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(&copy).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(
        "DROP TABLE team_settings;
        ALTER TABLE team_settings_new RENAME TO team_settings;
        CREATE INDEX IF NOT EXISTS idx_team_settings_team_id ON team_settings (team_id);",
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(true)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a table (not a view) named `name` exists.
pub(crate) fn table_exists(connection: &Connection, name: &str) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Lists the column names of `table`.
pub(crate) fn table_columns(
    connection: &Connection,
    table: &str,
) -> Result<Vec<String>, SqliteStoreError> {
    let mut stmt = connection
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Adds any of `columns` missing from `table`.
fn backfill_columns(
    connection: &Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<(), SqliteStoreError> {
    let existing = table_columns(connection, table)?;
    for (column, declaration) in columns {
        if existing.iter().any(|name| name == column) {
            continue;
        }
        connection
            .execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration};"))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        info!(table, column, "backfilled missing column");
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions and helpers are permitted.")]
mod tests {
    use rusqlite::Connection;

    use super::SCHEMA_VERSION;
    use super::initialize_schema;
    use super::probe_initialized;
    use super::read_version;
    use super::table_columns;

    #[test]
    fn chain_reaches_current_version_in_memory() {
        let mut connection = Connection::open_in_memory().unwrap();
        assert!(!probe_initialized(&connection));
        assert_eq!(initialize_schema(&mut connection).unwrap(), SCHEMA_VERSION);
        assert_eq!(read_version(&connection).unwrap(), Some(SCHEMA_VERSION));
        assert!(probe_initialized(&connection));
    }

    #[test]
    fn unversioned_task_table_is_backfilled() {
        let mut connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TABLE tasks (task_id TEXT PRIMARY KEY, plan_id TEXT NOT NULL, org_id \
                 TEXT NOT NULL, status TEXT NOT NULL);
                 INSERT INTO tasks VALUES ('t-old', 'p', 'o', 'completed');",
            )
            .unwrap();
        initialize_schema(&mut connection).unwrap();
        let columns = table_columns(&connection, "tasks").unwrap();
        assert!(columns.iter().any(|name| name == "messages"));
        let messages: String = connection
            .query_row("SELECT messages FROM tasks WHERE task_id = 't-old'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(messages, "[]");
    }
}
