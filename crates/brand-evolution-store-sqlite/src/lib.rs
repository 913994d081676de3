#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

pub mod engine;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use brand_evolution_core::evolution::{
    EventChanges, EventFilter, EventMetrics, EventTrigger, EvolutionEvent, EvolutionEventInput,
    EvolutionEventType, EvolutionSummary, Milestone, PerformanceTrend,
};
use brand_evolution_core::model::{BrandModel, ModelVersion};
use brand_evolution_core::pattern::{PatternKey, PatternType, PerformancePattern};
use brand_evolution_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, BrandId, EvolutionError,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use ulid::Ulid;

pub use engine::{
    EngineConfig, EvolutionEngine, LogNotificationSink, NotificationSink, TuningReport,
    VersionReport,
};

const SCHEMA_MIGRATION_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS brand_models (
  brand_id TEXT PRIMARY KEY,
  plan TEXT NOT NULL CHECK (plan IN ('starter', 'growth', 'scale')),
  current_version INTEGER NOT NULL CHECK (current_version >= 1),
  model_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS brand_model_versions (
  brand_id TEXT NOT NULL,
  version INTEGER NOT NULL CHECK (version >= 1),
  changes_json TEXT NOT NULL,
  metrics_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (brand_id, version),
  FOREIGN KEY (brand_id) REFERENCES brand_models(brand_id)
);

CREATE TRIGGER IF NOT EXISTS trg_brand_model_versions_no_update
BEFORE UPDATE ON brand_model_versions
BEGIN
  SELECT RAISE(FAIL, 'brand_model_versions is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_brand_model_versions_no_delete
BEFORE DELETE ON brand_model_versions
BEGIN
  SELECT RAISE(FAIL, 'brand_model_versions is append-only');
END;

CREATE TABLE IF NOT EXISTS performance_patterns (
  brand_id TEXT NOT NULL,
  pattern_type TEXT NOT NULL CHECK (pattern_type IN ('framework', 'tone', 'structure')),
  pattern_value TEXT NOT NULL,
  success_rate REAL NOT NULL CHECK (success_rate BETWEEN 0.0 AND 2.0),
  sample_size INTEGER NOT NULL CHECK (sample_size >= 0),
  confidence_score REAL NOT NULL CHECK (confidence_score BETWEEN 0.0 AND 1.0),
  updated_at TEXT NOT NULL,
  PRIMARY KEY (brand_id, pattern_type, pattern_value)
);

CREATE TRIGGER IF NOT EXISTS trg_performance_patterns_no_delete
BEFORE DELETE ON performance_patterns
BEGIN
  SELECT RAISE(FAIL, 'performance_patterns are never deleted');
END;

CREATE TABLE IF NOT EXISTS evolution_events (
  event_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  event_id TEXT NOT NULL UNIQUE,
  brand_id TEXT NOT NULL,
  event_type TEXT NOT NULL CHECK (
    event_type IN (
      'content_change',
      'strategy_update',
      'pattern_performance',
      'admin_tuning',
      'model_adjustment'
    )
  ),
  trigger_source TEXT NOT NULL,
  trigger_action TEXT NOT NULL,
  trigger_metadata_json TEXT NOT NULL DEFAULT 'null',
  before_json TEXT NOT NULL,
  after_json TEXT NOT NULL,
  impact_areas_json TEXT NOT NULL DEFAULT '[]',
  performance_delta REAL,
  confidence_score REAL CHECK (
    confidence_score BETWEEN 0.0 AND 1.0 OR confidence_score IS NULL
  ),
  sample_size INTEGER,
  occurred_at TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS trg_evolution_events_no_update
BEFORE UPDATE ON evolution_events
BEGIN
  SELECT RAISE(FAIL, 'evolution_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_evolution_events_no_delete
BEFORE DELETE ON evolution_events
BEGIN
  SELECT RAISE(FAIL, 'evolution_events is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_evolution_events_brand_time
  ON evolution_events(brand_id, occurred_at DESC, event_seq DESC);
CREATE INDEX IF NOT EXISTS idx_evolution_events_type
  ON evolution_events(brand_id, event_type, event_seq DESC);

CREATE TABLE IF NOT EXISTS evolution_summaries (
  brand_id TEXT PRIMARY KEY,
  total_changes INTEGER NOT NULL CHECK (total_changes >= 0),
  performance_trend TEXT NOT NULL CHECK (
    performance_trend IN ('improving', 'stable', 'declining')
  ),
  milestones_json TEXT NOT NULL,
  active_strategies_json TEXT NOT NULL,
  performance_score REAL NOT NULL,
  last_updated TEXT NOT NULL
);
";

/// Authoritative persistence for models, patterns, events, and summaries.
/// The in-process cache and per-brand locking live in [`EvolutionEngine`];
/// this type is the single writer target.
pub struct SqliteEvolutionStore {
    conn: Connection,
}

impl SqliteEvolutionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_V1)
            .context("failed to apply brand evolution schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_MIGRATION_VERSION, now],
            )
            .context("failed to register schema migration")?;

        Ok(())
    }

    pub fn get_brand_model(&self, brand_id: BrandId) -> Result<Option<BrandModel>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT model_json FROM brand_models WHERE brand_id = ?1",
                params![brand_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query brand model")?;

        let Some(json) = raw else {
            return Ok(None);
        };

        let model: BrandModel =
            serde_json::from_str(&json).context("invalid stored brand model JSON")?;
        Ok(Some(model))
    }

    /// Persists the model and its newest version entry in one transaction.
    ///
    /// `expected_previous_version` is the version the caller read before
    /// merging; a mismatch means another writer got there first and is
    /// surfaced as [`EvolutionError::ConcurrentUpdateConflict`] so the
    /// caller can retry with a fresh read.
    pub fn put_brand_model(
        &mut self,
        model: &BrandModel,
        expected_previous_version: Option<u32>,
    ) -> Result<()> {
        let Some(latest) = model.version_history.last() else {
            return Err(anyhow!("brand model MUST carry at least one version entry"));
        };

        let json = serde_json::to_string(model).context("failed to serialize brand model")?;
        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        let changes_json = serde_json::to_string(&latest.changes)
            .context("failed to serialize version changes")?;
        let metrics_json = serde_json::to_string(&latest.performance_metrics)
            .context("failed to serialize version metrics")?;
        let created_at =
            format_rfc3339(latest.timestamp).map_err(|err| anyhow!(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start model transaction")?;

        match expected_previous_version {
            None => {
                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO brand_models(
                            brand_id, plan, current_version, model_json, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            model.brand_id.to_string(),
                            model.plan.as_str(),
                            i64::from(latest.version),
                            json,
                            now,
                        ],
                    )
                    .context("failed to insert brand model")?;
                if inserted == 0 {
                    return Err(EvolutionError::ConcurrentUpdateConflict {
                        brand_id: model.brand_id,
                    }
                    .into());
                }
            }
            Some(expected) => {
                let updated = tx
                    .execute(
                        "UPDATE brand_models
                         SET plan = ?2, current_version = ?3, model_json = ?4, updated_at = ?5
                         WHERE brand_id = ?1 AND current_version = ?6",
                        params![
                            model.brand_id.to_string(),
                            model.plan.as_str(),
                            i64::from(latest.version),
                            json,
                            now,
                            i64::from(expected),
                        ],
                    )
                    .context("failed to update brand model")?;
                if updated == 0 {
                    return Err(EvolutionError::ConcurrentUpdateConflict {
                        brand_id: model.brand_id,
                    }
                    .into());
                }
            }
        }

        tx.execute(
            "INSERT INTO brand_model_versions(
                brand_id, version, changes_json, metrics_json, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                model.brand_id.to_string(),
                i64::from(latest.version),
                changes_json,
                metrics_json,
                created_at,
            ],
        )
        .context("failed to append model version entry")?;

        tx.commit().context("failed to commit model transaction")?;
        Ok(())
    }

    pub fn list_model_versions(&self, brand_id: BrandId) -> Result<Vec<ModelVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, changes_json, metrics_json, created_at
             FROM brand_model_versions
             WHERE brand_id = ?1
             ORDER BY version ASC",
        )?;

        let rows = stmt.query_map(params![brand_id.to_string()], |row| {
            let version_i64: i64 = row.get(0)?;
            let changes_json: String = row.get(1)?;
            let metrics_json: String = row.get(2)?;
            let created_at_raw: String = row.get(3)?;

            let version = u32::try_from(version_i64)
                .map_err(|_| invalid_column(0, format!("invalid version: {version_i64}")))?;
            let changes = serde_json::from_str(&changes_json)
                .map_err(|err| invalid_column(1, format!("invalid changes_json: {err}")))?;
            let performance_metrics = serde_json::from_str(&metrics_json)
                .map_err(|err| invalid_column(2, format!("invalid metrics_json: {err}")))?;
            let timestamp = parse_rfc3339_utc(&created_at_raw)
                .map_err(|err| invalid_column(3, err.to_string()))?;

            Ok(ModelVersion {
                version,
                timestamp,
                changes,
                performance_metrics,
            })
        })?;

        collect_rows(rows)
    }

    pub fn get_pattern(
        &self,
        brand_id: BrandId,
        key: &PatternKey,
    ) -> Result<Option<PerformancePattern>> {
        let mut stmt = self.conn.prepare(
            "SELECT brand_id, pattern_type, pattern_value,
                    success_rate, sample_size, confidence_score
             FROM performance_patterns
             WHERE brand_id = ?1 AND pattern_type = ?2 AND pattern_value = ?3",
        )?;

        let row = stmt
            .query_row(
                params![
                    brand_id.to_string(),
                    key.pattern_type.as_str(),
                    key.pattern_value,
                ],
                parse_pattern_row,
            )
            .optional()?;

        Ok(row)
    }

    pub fn upsert_pattern(&mut self, pattern: &PerformancePattern) -> Result<()> {
        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        let sample_size = i64::try_from(pattern.sample_size)
            .with_context(|| format!("sample_size too large: {}", pattern.sample_size))?;

        self.conn
            .execute(
                "INSERT INTO performance_patterns(
                    brand_id, pattern_type, pattern_value,
                    success_rate, sample_size, confidence_score, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(brand_id, pattern_type, pattern_value) DO UPDATE SET
                    success_rate = excluded.success_rate,
                    sample_size = excluded.sample_size,
                    confidence_score = excluded.confidence_score,
                    updated_at = excluded.updated_at",
                params![
                    pattern.brand_id.to_string(),
                    pattern.pattern_type.as_str(),
                    pattern.pattern_value,
                    pattern.success_rate,
                    sample_size,
                    pattern.confidence_score,
                    now,
                ],
            )
            .context("failed to upsert performance pattern")?;

        Ok(())
    }

    pub fn list_patterns(&self, brand_id: BrandId) -> Result<Vec<PerformancePattern>> {
        let mut stmt = self.conn.prepare(
            "SELECT brand_id, pattern_type, pattern_value,
                    success_rate, sample_size, confidence_score
             FROM performance_patterns
             WHERE brand_id = ?1
             ORDER BY pattern_type ASC, pattern_value ASC",
        )?;

        let rows = stmt.query_map(params![brand_id.to_string()], parse_pattern_row)?;
        collect_rows(rows)
    }

    /// Appends one journal entry. The event is the system of record; a
    /// failure here propagates to the caller.
    pub fn append_event(&mut self, input: &EvolutionEventInput) -> Result<EvolutionEvent> {
        input
            .validate()
            .map_err(|err| anyhow!("event validation failed: {err}"))?;

        let event_id = match input.event_id {
            Some(value) => value,
            None => Ulid::new(),
        };
        let recorded_at = now_utc();

        let impact_areas_json = serde_json::to_string(&input.changes.impact_areas)
            .context("failed to serialize impact areas")?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start event transaction")?;

        tx.execute(
            "INSERT INTO evolution_events(
                event_id, brand_id, event_type,
                trigger_source, trigger_action, trigger_metadata_json,
                before_json, after_json, impact_areas_json,
                performance_delta, confidence_score, sample_size,
                occurred_at, recorded_at
             ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14
             )",
            params![
                event_id.to_string(),
                input.brand_id.to_string(),
                input.event_type.as_str(),
                input.trigger.source,
                input.trigger.action,
                serde_json::to_string(&input.trigger.metadata)
                    .context("failed to serialize trigger metadata")?,
                serde_json::to_string(&input.changes.before)
                    .context("failed to serialize before state")?,
                serde_json::to_string(&input.changes.after)
                    .context("failed to serialize after state")?,
                impact_areas_json,
                input.metrics.map(|metrics| metrics.performance_delta),
                input.metrics.map(|metrics| metrics.confidence_score),
                input
                    .metrics
                    .map(|metrics| i64::try_from(metrics.sample_size))
                    .transpose()
                    .context("sample_size too large")?,
                format_rfc3339(input.occurred_at).map_err(|err| anyhow!(err.to_string()))?,
                format_rfc3339(recorded_at).map_err(|err| anyhow!(err.to_string()))?,
            ],
        )
        .context("failed to append evolution event")?;

        let event_seq = tx.last_insert_rowid();
        tx.commit().context("failed to commit event transaction")?;

        Ok(EvolutionEvent {
            event_seq,
            event_id,
            brand_id: input.brand_id,
            event_type: input.event_type,
            trigger: input.trigger.clone(),
            changes: input.changes.clone(),
            metrics: input.metrics,
            occurred_at: input.occurred_at,
            recorded_at,
        })
    }

    /// All events for a brand, newest first (timestamp, ties broken by
    /// insertion order).
    pub fn list_events(&self, brand_id: BrandId) -> Result<Vec<EvolutionEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_seq, event_id, brand_id, event_type,
                    trigger_source, trigger_action, trigger_metadata_json,
                    before_json, after_json, impact_areas_json,
                    performance_delta, confidence_score, sample_size,
                    occurred_at, recorded_at
             FROM evolution_events
             WHERE brand_id = ?1
             ORDER BY occurred_at DESC, event_seq DESC",
        )?;

        let rows = stmt.query_map(params![brand_id.to_string()], parse_event_row)?;
        collect_rows(rows)
    }

    /// Applies the journal query filters after the newest-first ordering;
    /// `limit` truncates last.
    pub fn query_events(
        &self,
        brand_id: BrandId,
        filter: &EventFilter,
    ) -> Result<Vec<EvolutionEvent>> {
        let mut events: Vec<EvolutionEvent> = self
            .list_events(brand_id)?
            .into_iter()
            .filter(|event| filter.matches(event))
            .collect();

        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }

        Ok(events)
    }

    /// Retrospective audit query over historical events.
    pub fn notable_events(
        &self,
        brand_id: BrandId,
        threshold: f64,
    ) -> Result<Vec<EvolutionEvent>> {
        let events = self
            .list_events(brand_id)?
            .into_iter()
            .filter(|event| {
                event
                    .metrics
                    .as_ref()
                    .is_some_and(|metrics| metrics.is_notable(threshold))
            })
            .collect();
        Ok(events)
    }

    pub fn get_summary(&self, brand_id: BrandId) -> Result<Option<EvolutionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT brand_id, total_changes, performance_trend,
                    milestones_json, active_strategies_json,
                    performance_score, last_updated
             FROM evolution_summaries
             WHERE brand_id = ?1",
        )?;

        let row = stmt
            .query_row(params![brand_id.to_string()], parse_summary_row)
            .optional()?;
        Ok(row)
    }

    pub fn put_summary(&mut self, summary: &EvolutionSummary) -> Result<()> {
        let milestones_json = serde_json::to_string(&summary.key_milestones)
            .context("failed to serialize milestones")?;
        let strategies_json = serde_json::to_string(&summary.active_strategies)
            .context("failed to serialize active strategies")?;
        let total_changes = i64::try_from(summary.total_changes)
            .with_context(|| format!("total_changes too large: {}", summary.total_changes))?;

        self.conn
            .execute(
                "INSERT INTO evolution_summaries(
                    brand_id, total_changes, performance_trend,
                    milestones_json, active_strategies_json,
                    performance_score, last_updated
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(brand_id) DO UPDATE SET
                    total_changes = excluded.total_changes,
                    performance_trend = excluded.performance_trend,
                    milestones_json = excluded.milestones_json,
                    active_strategies_json = excluded.active_strategies_json,
                    performance_score = excluded.performance_score,
                    last_updated = excluded.last_updated",
                params![
                    summary.brand_id.to_string(),
                    total_changes,
                    summary.performance_trend.as_str(),
                    milestones_json,
                    strategies_json,
                    summary.performance_score,
                    format_rfc3339(summary.last_updated)
                        .map_err(|err| anyhow!(err.to_string()))?,
                ],
            )
            .context("failed to upsert evolution summary")?;

        Ok(())
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn parse_pattern_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PerformancePattern> {
    let brand_id_raw: String = row.get(0)?;
    let pattern_type_raw: String = row.get(1)?;
    let sample_size_i64: i64 = row.get(4)?;

    let pattern_type = PatternType::parse(&pattern_type_raw).ok_or_else(|| {
        invalid_column(1, format!("invalid pattern_type: {pattern_type_raw}"))
    })?;
    let sample_size = u64::try_from(sample_size_i64)
        .map_err(|_| invalid_column(4, format!("invalid sample_size: {sample_size_i64}")))?;

    Ok(PerformancePattern {
        brand_id: parse_brand_id(&brand_id_raw)?,
        pattern_type,
        pattern_value: row.get(2)?,
        success_rate: row.get(3)?,
        sample_size,
        confidence_score: row.get(5)?,
    })
}

fn parse_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvolutionEvent> {
    let event_id_raw: String = row.get(1)?;
    let brand_id_raw: String = row.get(2)?;
    let event_type_raw: String = row.get(3)?;
    let metadata_json: String = row.get(6)?;
    let before_json: String = row.get(7)?;
    let after_json: String = row.get(8)?;
    let impact_areas_json: String = row.get(9)?;
    let performance_delta: Option<f64> = row.get(10)?;
    let confidence_score: Option<f64> = row.get(11)?;
    let sample_size_i64: Option<i64> = row.get(12)?;

    let event_id = Ulid::from_string(&event_id_raw)
        .map_err(|_| invalid_column(1, format!("invalid event_id ULID: {event_id_raw}")))?;
    let event_type = EvolutionEventType::parse(&event_type_raw)
        .ok_or_else(|| invalid_column(3, format!("invalid event_type: {event_type_raw}")))?;

    let metadata: Value = serde_json::from_str(&metadata_json)
        .map_err(|err| invalid_column(6, format!("invalid trigger metadata: {err}")))?;
    let before: Value = serde_json::from_str(&before_json)
        .map_err(|err| invalid_column(7, format!("invalid before_json: {err}")))?;
    let after: Value = serde_json::from_str(&after_json)
        .map_err(|err| invalid_column(8, format!("invalid after_json: {err}")))?;
    let impact_areas = serde_json::from_str(&impact_areas_json)
        .map_err(|err| invalid_column(9, format!("invalid impact_areas_json: {err}")))?;

    let metrics = match (performance_delta, confidence_score, sample_size_i64) {
        (Some(delta), Some(confidence), Some(samples)) => {
            let sample_size = u64::try_from(samples)
                .map_err(|_| invalid_column(12, format!("invalid sample_size: {samples}")))?;
            Some(EventMetrics {
                performance_delta: delta,
                confidence_score: confidence,
                sample_size,
            })
        }
        (None, None, None) => None,
        _ => {
            return Err(invalid_column(
                10,
                "event metrics columns must be all present or all absent".to_string(),
            ))
        }
    };

    let occurred_at = parse_rfc3339_utc(&row.get::<_, String>(13)?)
        .map_err(|err| invalid_column(13, err.to_string()))?;
    let recorded_at = parse_rfc3339_utc(&row.get::<_, String>(14)?)
        .map_err(|err| invalid_column(14, err.to_string()))?;

    Ok(EvolutionEvent {
        event_seq: row.get(0)?,
        event_id,
        brand_id: parse_brand_id(&brand_id_raw)?,
        event_type,
        trigger: EventTrigger {
            source: row.get(4)?,
            action: row.get(5)?,
            metadata,
        },
        changes: EventChanges {
            before,
            after,
            impact_areas,
        },
        metrics,
        occurred_at,
        recorded_at,
    })
}

fn parse_summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvolutionSummary> {
    let brand_id_raw: String = row.get(0)?;
    let total_changes_i64: i64 = row.get(1)?;
    let trend_raw: String = row.get(2)?;
    let milestones_json: String = row.get(3)?;
    let strategies_json: String = row.get(4)?;

    let total_changes = u64::try_from(total_changes_i64).map_err(|_| {
        invalid_column(1, format!("invalid total_changes: {total_changes_i64}"))
    })?;
    let performance_trend = PerformanceTrend::parse(&trend_raw)
        .ok_or_else(|| invalid_column(2, format!("invalid performance_trend: {trend_raw}")))?;
    let key_milestones: std::collections::VecDeque<Milestone> =
        serde_json::from_str(&milestones_json)
            .map_err(|err| invalid_column(3, format!("invalid milestones_json: {err}")))?;
    let active_strategies = serde_json::from_str(&strategies_json)
        .map_err(|err| invalid_column(4, format!("invalid active_strategies_json: {err}")))?;

    Ok(EvolutionSummary {
        brand_id: parse_brand_id(&brand_id_raw)?,
        total_changes,
        performance_trend,
        key_milestones,
        active_strategies,
        performance_score: row.get(5)?,
        last_updated: parse_rfc3339_utc(&row.get::<_, String>(6)?)
            .map_err(|err| invalid_column(6, err.to_string()))?,
    })
}

fn parse_brand_id(raw: &str) -> rusqlite::Result<BrandId> {
    let parsed = Ulid::from_string(raw)
        .map_err(|_| invalid_column(0, format!("invalid ULID: {raw}")))?;
    Ok(BrandId(parsed))
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

/// Parses a `<brand_id>` ULID from CLI-style input.
pub fn parse_brand_id_str(raw: &str) -> Result<BrandId> {
    let parsed = Ulid::from_string(raw)
        .with_context(|| format!("invalid ULID brand_id: {raw}"))?;
    Ok(BrandId(parsed))
}
