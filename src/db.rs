// 🗃️ SQLite Store - contributions, classification runs, audit events
//
// Contributions are deduplicated by idempotency hash (UNIQUE), so importing
// the same file twice inserts nothing the second time. Each pipeline run
// gets a row in `runs` plus one `classifications` row per record.

use crate::category::CategoryLabel;
use crate::hybrid::ClassificationResult;
use crate::record::{AmountIssue, ContributionRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open (or create) a database file with the schema in place.
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Contributions Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            contributor_name TEXT NOT NULL,
            contributor_employer TEXT,
            contribution_amount REAL NOT NULL,
            existing_category TEXT,
            amount_flagged INTEGER NOT NULL DEFAULT 0,
            amount_issue TEXT,
            line_number INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Runs + Classifications
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            model_trained INTEGER NOT NULL,
            accuracy REAL,
            others_pct REAL NOT NULL,
            quality_score REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            contribution_hash TEXT NOT NULL,
            contribution_amount REAL NOT NULL,
            rule_category TEXT NOT NULL,
            ml_category TEXT,
            confidence REAL NOT NULL,
            final_category TEXT NOT NULL,
            matched_rule TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_idempotency_hash ON contributions(idempotency_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classifications_run ON classifications(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

pub fn insert_records(conn: &Connection, records: &[ContributionRecord]) -> Result<ImportStats> {
    let tx = conn.unchecked_transaction()?;
    let mut stats = ImportStats::default();

    for record in records {
        let hash = record.compute_idempotency_hash();
        let issue_json = record
            .amount_issue
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = tx.execute(
            "INSERT INTO contributions (
                idempotency_hash, contributor_name, contributor_employer,
                contribution_amount, existing_category, amount_flagged,
                amount_issue, line_number
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                hash,
                record.contributor_name,
                record.contributor_employer,
                record.contribution_amount,
                record.existing_category,
                record.amount_flagged,
                issue_json,
                record.line_number as i64,
            ],
        );

        match result {
            Ok(_) => stats.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                stats.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit()?;

    insert_event(
        conn,
        &Event::new(
            "contributions_imported",
            "import",
            &uuid::Uuid::new_v4().to_string(),
            serde_json::json!({
                "inserted": stats.inserted,
                "duplicates": stats.duplicates,
            }),
            "csv_importer",
        ),
    )?;

    tracing::info!(inserted = stats.inserted, duplicates = stats.duplicates, "contributions stored");
    Ok(stats)
}

pub fn get_all_records(conn: &Connection) -> Result<Vec<ContributionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT contributor_name, contributor_employer, contribution_amount,
                existing_category, amount_flagged, amount_issue, line_number
         FROM contributions
         ORDER BY id",
    )?;

    let records = stmt
        .query_map([], |row| {
            let issue_json: Option<String> = row.get(5)?;
            let amount_issue: Option<AmountIssue> =
                issue_json.and_then(|s| serde_json::from_str(&s).ok());
            let line_number: i64 = row.get(6)?;

            Ok(ContributionRecord {
                contributor_name: row.get(0)?,
                contributor_employer: row.get(1)?,
                contribution_amount: row.get(2)?,
                existing_category: row.get(3)?,
                amount_flagged: row.get(4)?,
                amount_issue,
                line_number: line_number.max(0) as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM contributions", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// RUNS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub record_count: usize,
    pub model_trained: bool,
    pub accuracy: Option<f64>,
    pub others_pct: f64,
    pub quality_score: f64,
}

/// Store a run and its per-record results in one transaction.
pub fn insert_run(
    conn: &Connection,
    run: &RunRecord,
    records: &[ContributionRecord],
    results: &[ClassificationResult],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (
            run_id, started_at, record_count, model_trained, accuracy, others_pct, quality_score
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.run_id,
            run.started_at.to_rfc3339(),
            run.record_count as i64,
            run.model_trained,
            run.accuracy,
            run.others_pct,
            run.quality_score,
        ],
    )
    .with_context(|| format!("Failed to insert run {}", run.run_id))?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO classifications (
                run_id, contribution_hash, contribution_amount, rule_category,
                ml_category, confidence, final_category, matched_rule
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for (record, result) in records.iter().zip(results) {
            stmt.execute(params![
                run.run_id,
                record.compute_idempotency_hash(),
                record.contribution_amount,
                result.rule_category.as_str(),
                result.ml_category.map(|c| c.as_str()),
                result.confidence,
                result.final_category.as_str(),
                result.matched_rule,
            ])?;
            inserted += 1;
        }
    }

    tx.commit()?;

    insert_event(
        conn,
        &Event::new(
            "run_completed",
            "run",
            &run.run_id,
            serde_json::json!({
                "records": run.record_count,
                "model_trained": run.model_trained,
                "others_pct": run.others_pct,
            }),
            "pipeline",
        ),
    )?;

    Ok(inserted)
}

pub fn latest_run(conn: &Connection) -> Result<Option<RunRecord>> {
    let row = conn
        .query_row(
            "SELECT run_id, started_at, record_count, model_trained, accuracy, others_pct, quality_score
             FROM runs
             ORDER BY started_at DESC
             LIMIT 1",
            [],
            |row| {
                let started_at: String = row.get(1)?;
                let record_count: i64 = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    started_at,
                    record_count,
                    row.get::<_, bool>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, started_at, record_count, model_trained, accuracy, others_pct, quality_score)) = row
    else {
        return Ok(None);
    };

    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .with_context(|| format!("Invalid run timestamp: {}", started_at))?
        .with_timezone(&Utc);

    Ok(Some(RunRecord {
        run_id,
        started_at,
        record_count: record_count.max(0) as usize,
        model_trained,
        accuracy,
        others_pct,
        quality_score,
    }))
}

/// Per-category statistics for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category: CategoryLabel,
    pub count: i64,
    pub total_amount: f64,
}

pub fn category_stats(conn: &Connection, run_id: &str) -> Result<Vec<CategoryStat>> {
    let mut stmt = conn.prepare(
        "SELECT final_category, COUNT(*), SUM(contribution_amount)
         FROM classifications
         WHERE run_id = ?1
         GROUP BY final_category
         ORDER BY COUNT(*) DESC, final_category",
    )?;

    let stats = stmt
        .query_map([run_id], |row| {
            let category: String = row.get(0)?;
            Ok(CategoryStat {
                category: CategoryLabel::parse_or_default(Some(&category)),
                count: row.get(1)?,
                total_amount: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ContributionRecord> {
        vec![
            ContributionRecord::new("Jane Roe", Some("Winthrop & Weinstine"), 250.0)
                .with_existing_category("Lawyer"),
            ContributionRecord::new("Bob Owner", Some("ABC LLC"), 100.0),
            ContributionRecord::new("Pat Doe", None, 25.5),
        ]
    }

    fn result(category: CategoryLabel) -> ClassificationResult {
        ClassificationResult {
            rule_category: category,
            ml_category: None,
            confidence: 0.0,
            final_category: category,
            matched_rule: Some("rule".to_string()),
            tier: None,
        }
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let first = insert_records(&conn, &records()).unwrap();
        let second = insert_records(&conn, &records()).unwrap();

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0, "second import should insert nothing");
        assert_eq!(second.duplicates, 3);
        assert_eq!(verify_count(&conn).unwrap(), 3);
    }

    #[test]
    fn test_records_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut input = records();
        input[2].amount_issue = Some(AmountIssue::Missing);
        insert_records(&conn, &input).unwrap();

        let loaded = get_all_records(&conn).unwrap();
        assert_eq!(loaded, input);
    }

    #[test]
    fn test_run_and_category_stats() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("contributions.db")).unwrap();

        let input = records();
        let results = vec![
            result(CategoryLabel::Lawyer),
            result(CategoryLabel::BusinessOwner),
            result(CategoryLabel::Lawyer),
        ];
        let run = RunRecord {
            run_id: "run-1".to_string(),
            started_at: Utc::now(),
            record_count: input.len(),
            model_trained: false,
            accuracy: None,
            others_pct: 0.0,
            quality_score: 90.0,
        };

        assert_eq!(insert_run(&conn, &run, &input, &results).unwrap(), 3);

        let latest = latest_run(&conn).unwrap().unwrap();
        assert_eq!(latest.run_id, "run-1");
        assert_eq!(latest.record_count, 3);

        let stats = category_stats(&conn, "run-1").unwrap();
        assert_eq!(stats[0].category, CategoryLabel::Lawyer);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].total_amount, 275.5);

        let events = get_events_for_entity(&conn, "run", "run-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "run_completed");
    }

    #[test]
    fn test_latest_run_empty() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        assert!(latest_run(&conn).unwrap().is_none());
    }
}
