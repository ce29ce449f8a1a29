// crates/pipeline-ledger-store-sqlite/src/reference.rs
// ============================================================================
// Module: Reference Data
// Description: Baseline plan, scoring criteria, and catalog seeding and reads.
// Purpose: Give a fresh ledger the defaults pipelines expect to find.
// Dependencies: pipeline-ledger-core, rusqlite, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Seeding runs after schema initialization for the configured organization.
//! Each table is only written when it has no rows (plans) or no rows for the
//! organization (criteria, catalog), so repeated opens never duplicate data.
//! Seeding failures are logged and swallowed; the ledger stays usable without
//! its defaults.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pipeline_ledger_core::OrgId;
use pipeline_ledger_core::Payload;
use pipeline_ledger_core::PlanId;
use pipeline_ledger_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::codec::decode_payload;
use crate::store::LedgerStore;
use crate::store::SqliteStoreError;
use crate::store::unix_millis;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Plan identifier assigned to seeded plans and migrated legacy executions.
pub const DEFAULT_PLAN_ID: &str = "569cdcbd-cf6d-4e33-b0b2-d2f6f15a0832";

/// Executors of the default plan, in pipeline order: `(name, display_name)`.
const DEFAULT_EXECUTORS: [(&str, &str); 5] = [
    ("data_acquisition", "Data Acquisition"),
    ("data_preparation", "Data Preparation"),
    ("lead_scoring", "Lead Scoring"),
    ("initial_outreach", "Initial Outreach"),
    ("follow_up", "Follow Up"),
];

/// Default scoring criteria: `(name, definition, weight)`.
const DEFAULT_CRITERIA: [(&str, &str, f64); 5] = [
    ("industry_fit", "How well the customer's industry aligns with the target market", 0.15),
    ("company_size", "Company size alignment with the ideal customer profile", 0.15),
    ("pain_points", "How well the product addresses the customer's pain points", 0.3),
    ("product_fit", "Overall product-customer compatibility", 0.2),
    ("geographic_market_fit", "Alignment with the markets the product serves", 0.2),
];

/// Scoring bands attached to every default criterion.
const DEFAULT_SCORING_FACTORS: [&str; 4] =
    ["Strong match: 80-100", "Good match: 60-79", "Partial match: 40-59", "Poor match: 0-39"];

// ============================================================================
// SECTION: Records
// ============================================================================

/// One executor step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanExecutor {
    /// Executor name recorded on operations.
    pub name: String,
    /// Human-readable label.
    pub display_name: String,
}

/// Stored pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Plan name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Owning organization.
    pub org_id: OrgId,
    /// Publication status label.
    pub status: String,
    /// Executors in pipeline order.
    pub executors: Vec<PlanExecutor>,
    /// Free-form plan settings.
    pub settings: Payload,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Weighted lead-scoring criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringCriterion {
    /// Criterion identifier, unique per organization.
    pub criterion_id: String,
    /// Owning organization.
    pub org_id: OrgId,
    /// Criterion name.
    pub name: String,
    /// Optional definition text.
    pub definition: Option<String>,
    /// Weight in the overall score.
    pub weight: f64,
    /// Scoring bands.
    pub scoring_factors: Vec<String>,
}

/// Product catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Entry identifier, unique per organization.
    pub entry_id: String,
    /// Owning organization.
    pub org_id: OrgId,
    /// Entry name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Status label.
    pub status: String,
    /// Free-form entry details.
    pub details: Payload,
}

// ============================================================================
// SECTION: Seeding
// ============================================================================

/// Rows written by one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SeedCounts {
    /// Plans inserted.
    plans: usize,
    /// Criteria inserted.
    criteria: usize,
    /// Catalog entries inserted.
    catalog: usize,
}

/// Seeds baseline reference data for `org_id`, logging instead of failing.
pub(crate) fn seed_defaults(connection: &mut Connection, org_id: &OrgId) {
    match try_seed(connection, org_id) {
        Ok(counts) if counts == SeedCounts::default() => {}
        Ok(counts) => debug!(
            org_id = %org_id,
            plans = counts.plans,
            criteria = counts.criteria,
            catalog = counts.catalog,
            "seeded reference data"
        ),
        Err(err) => warn!(org_id = %org_id, error = %err, "reference data seeding failed"),
    }
}

/// Seeds every empty reference table in one transaction.
fn try_seed(connection: &mut Connection, org_id: &OrgId) -> Result<SeedCounts, SqliteStoreError> {
    let now = unix_millis();
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut counts = SeedCounts::default();
    if count_rows(&tx, "SELECT COUNT(*) FROM plans", None)? == 0 {
        let executors: Vec<PlanExecutor> = DEFAULT_EXECUTORS
            .iter()
            .map(|(name, display_name)| PlanExecutor {
                name: (*name).to_string(),
                display_name: (*display_name).to_string(),
            })
            .collect();
        let executors =
            serde_json::to_string(&executors).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        tx.execute(
            "INSERT INTO plans (plan_id, name, description, org_id, status, executors, settings, \
             created_at) VALUES (?1, ?2, ?3, ?4, 'published', ?5, '{}', ?6)",
            params![
                DEFAULT_PLAN_ID,
                "Default Pipeline",
                "Default five-stage pipeline",
                org_id.as_str(),
                executors,
                now
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        counts.plans = 1;
    }
    if count_rows(&tx, "SELECT COUNT(*) FROM scoring_criteria WHERE org_id = ?1", Some(org_id))?
        == 0
    {
        let factors = json!(DEFAULT_SCORING_FACTORS).to_string();
        for (name, definition, weight) in DEFAULT_CRITERIA {
            tx.execute(
                "INSERT INTO scoring_criteria (criterion_id, org_id, name, definition, weight, \
                 scoring_factors, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    format!("criteria_{name}"),
                    org_id.as_str(),
                    name,
                    definition,
                    weight,
                    factors,
                    now
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            counts.criteria += 1;
        }
    }
    if count_rows(&tx, "SELECT COUNT(*) FROM catalog_entries WHERE org_id = ?1", Some(org_id))?
        == 0
    {
        let details = json!({"category": "software", "pricing": {}}).to_string();
        tx.execute(
            "INSERT INTO catalog_entries (entry_id, org_id, name, description, status, details, \
             created_at) VALUES ('catalog-default', ?1, ?2, ?3, 'active', ?4, ?5)",
            params![
                org_id.as_str(),
                "Default Product",
                "Placeholder product used until the catalog is configured",
                details,
                now
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        counts.catalog = 1;
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(counts)
}

/// Runs a `COUNT(*)` query with an optional organization parameter.
fn count_rows(
    connection: &Connection,
    sql: &str,
    org_id: Option<&OrgId>,
) -> Result<i64, SqliteStoreError> {
    let result = match org_id {
        Some(org_id) => connection.query_row(sql, params![org_id.as_str()], |row| row.get(0)),
        None => connection.query_row(sql, params![], |row| row.get(0)),
    };
    result.map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Reads
// ============================================================================

impl LedgerStore {
    /// Loads a plan definition.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails. A malformed
    /// executor list degrades to an empty list.
    pub fn get_plan(&self, plan_id: &PlanId) -> Result<Option<PlanRecord>, SqliteStoreError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT plan_id, name, description, org_id, status, executors, settings, \
                 created_at FROM plans WHERE plan_id = ?1",
                params![plan_id.as_str()],
                |row| {
                    let plan_id: String = row.get(0)?;
                    let executors: Option<String> = row.get(5)?;
                    let settings: Option<String> = row.get(6)?;
                    let executors = executors
                        .as_deref()
                        .map(serde_json::from_str::<Vec<PlanExecutor>>)
                        .transpose()
                        .unwrap_or_else(|err| {
                            warn!(plan_id = %plan_id, error = %err, "undecodable plan executors");
                            None
                        })
                        .unwrap_or_default();
                    Ok(PlanRecord {
                        settings: decode_payload(&plan_id, "settings", settings.as_deref()),
                        plan_id: PlanId::new(plan_id),
                        name: row.get(1)?,
                        description: row.get(2)?,
                        org_id: OrgId::new(row.get::<_, String>(3)?),
                        status: row.get(4)?,
                        executors,
                        created_at: Timestamp::from_unix_millis(row.get(7)?),
                    })
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Lists an organization's scoring criteria by name.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_scoring_criteria(
        &self,
        org_id: &OrgId,
    ) -> Result<Vec<ScoringCriterion>, SqliteStoreError> {
        let connection = self.connect()?;
        let mut stmt = connection
            .prepare(
                "SELECT criterion_id, name, definition, weight, scoring_factors FROM \
                 scoring_criteria WHERE org_id = ?1 ORDER BY name",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![org_id.as_str()], |row| {
                let criterion_id: String = row.get(0)?;
                let factors: Option<String> = row.get(4)?;
                let scoring_factors = factors
                    .as_deref()
                    .map_or_else(|| Ok(Vec::new()), serde_json::from_str::<Vec<String>>)
                    .unwrap_or_else(|err| {
                        warn!(criterion_id = %criterion_id, error = %err, "undecodable factors");
                        Vec::new()
                    });
                Ok(ScoringCriterion {
                    criterion_id,
                    org_id: org_id.clone(),
                    name: row.get(1)?,
                    definition: row.get(2)?,
                    weight: row.get(3)?,
                    scoring_factors,
                })
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Lists an organization's catalog entries.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_catalog_entries(
        &self,
        org_id: &OrgId,
    ) -> Result<Vec<CatalogEntry>, SqliteStoreError> {
        let connection = self.connect()?;
        let mut stmt = connection
            .prepare(
                "SELECT entry_id, name, description, status, details FROM catalog_entries WHERE \
                 org_id = ?1 ORDER BY entry_id",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![org_id.as_str()], |row| {
                let entry_id: String = row.get(0)?;
                let details: Option<String> = row.get(4)?;
                Ok(CatalogEntry {
                    details: decode_payload(&entry_id, "details", details.as_deref()),
                    entry_id,
                    org_id: org_id.clone(),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    status: row.get(3)?,
                })
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Db(err.to_string()))
    }
}
