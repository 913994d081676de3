//! Evolution Log domain: immutable journal entries describing behavioral
//! changes, plus the rolling per-brand summary projected from them.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

use crate::{BrandId, EvolutionError};

/// Bounded ring of recent milestones kept on the summary.
pub const MAX_MILESTONES: usize = 10;

/// Live significance gate: all three must hold for an event to be
/// milestone-worthy and notifiable.
pub const SIGNIFICANT_DELTA: f64 = 0.1;
pub const SIGNIFICANT_CONFIDENCE: f64 = 0.8;
pub const SIGNIFICANT_SAMPLES: u64 = 100;

/// Retrospective audit confidence floor. Deliberately looser than the
/// live gate (no sample-size floor): used for after-the-fact review,
/// not live alerting.
pub const NOTABLE_CONFIDENCE: f64 = 0.7;

/// Relative delta below which the trend reads as stable.
const STABLE_RATIO: f64 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionEventType {
    ContentChange,
    StrategyUpdate,
    PatternPerformance,
    AdminTuning,
    ModelAdjustment,
}

impl EvolutionEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentChange => "content_change",
            Self::StrategyUpdate => "strategy_update",
            Self::PatternPerformance => "pattern_performance",
            Self::AdminTuning => "admin_tuning",
            Self::ModelAdjustment => "model_adjustment",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "content_change" => Some(Self::ContentChange),
            "strategy_update" => Some(Self::StrategyUpdate),
            "pattern_performance" => Some(Self::PatternPerformance),
            "admin_tuning" => Some(Self::AdminTuning),
            "model_adjustment" => Some(Self::ModelAdjustment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventTrigger {
    pub source: String,
    pub action: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventChanges {
    pub before: Value,
    pub after: Value,
    #[serde(default)]
    pub impact_areas: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EventMetrics {
    pub performance_delta: f64,
    pub confidence_score: f64,
    pub sample_size: u64,
}

impl EventMetrics {
    /// The live significance gate. A large but low-confidence delta, or a
    /// confident but tiny delta, is not significant.
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.performance_delta.abs() >= SIGNIFICANT_DELTA
            && self.confidence_score >= SIGNIFICANT_CONFIDENCE
            && self.sample_size >= SIGNIFICANT_SAMPLES
    }

    /// The retrospective audit predicate.
    #[must_use]
    pub fn is_notable(&self, threshold: f64) -> bool {
        self.performance_delta.abs() >= threshold
            && self.confidence_score >= NOTABLE_CONFIDENCE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionEvent {
    pub event_seq: i64,
    pub event_id: ulid::Ulid,
    pub brand_id: BrandId,
    pub event_type: EvolutionEventType,
    pub trigger: EventTrigger,
    pub changes: EventChanges,
    pub metrics: Option<EventMetrics>,
    pub occurred_at: OffsetDateTime,
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionEventInput {
    pub event_id: Option<ulid::Ulid>,
    pub brand_id: BrandId,
    pub event_type: EvolutionEventType,
    pub trigger: EventTrigger,
    pub changes: EventChanges,
    pub metrics: Option<EventMetrics>,
    pub occurred_at: OffsetDateTime,
}

impl EvolutionEventInput {
    /// Validates a journal entry before append.
    ///
    /// # Errors
    /// Returns [`EvolutionError::Validation`] when required fields are
    /// missing or out of bounds.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.trigger.source.trim().is_empty() {
            return Err(EvolutionError::Validation(
                "trigger.source MUST be provided for every event".to_string(),
            ));
        }
        if self.trigger.action.trim().is_empty() {
            return Err(EvolutionError::Validation(
                "trigger.action MUST be provided for every event".to_string(),
            ));
        }
        if self.occurred_at.offset() != UtcOffset::UTC {
            return Err(EvolutionError::Validation(
                "occurred_at MUST be UTC (offset Z)".to_string(),
            ));
        }
        if let Some(metrics) = &self.metrics {
            if !(0.0..=1.0).contains(&metrics.confidence_score) {
                return Err(EvolutionError::Validation(
                    "metrics.confidence_score MUST be in [0.0, 1.0]".to_string(),
                ));
            }
            // A NaN or infinite delta would corrupt the summary fold's
            // running performance score on the next apply.
            if !metrics.performance_delta.is_finite() {
                return Err(EvolutionError::Validation(
                    "metrics.performance_delta MUST be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
}

impl PerformanceTrend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "improving" => Some(Self::Improving),
            "stable" => Some(Self::Stable),
            "declining" => Some(Self::Declining),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub date: OffsetDateTime,
    pub description: String,
    pub impact: f64,
}

/// Rolling per-brand summary. Created on the first event for a brand,
/// updated on every subsequent one, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionSummary {
    pub brand_id: BrandId,
    pub total_changes: u64,
    pub performance_trend: PerformanceTrend,
    pub key_milestones: VecDeque<Milestone>,
    pub active_strategies: BTreeSet<String>,
    pub performance_score: f64,
    pub last_updated: OffsetDateTime,
}

impl EvolutionSummary {
    #[must_use]
    pub fn new(brand_id: BrandId, now: OffsetDateTime) -> Self {
        Self {
            brand_id,
            total_changes: 0,
            performance_trend: PerformanceTrend::Stable,
            key_milestones: VecDeque::new(),
            active_strategies: BTreeSet::new(),
            performance_score: 0.0,
            last_updated: now,
        }
    }

    /// Folds one event into the summary. Returns whether the event cleared
    /// the significance gate (which also appended a milestone).
    pub fn apply(&mut self, event: &EvolutionEvent) -> bool {
        self.total_changes += 1;
        self.last_updated = event.recorded_at;

        let mut significant = false;
        if let Some(metrics) = &event.metrics {
            self.performance_score += metrics.performance_delta;
            self.performance_trend =
                trend_for(metrics.performance_delta, self.performance_score);

            if metrics.is_significant() {
                significant = true;
                self.key_milestones.push_back(Milestone {
                    date: event.recorded_at,
                    description: format!(
                        "{}: {}",
                        event.trigger.source, event.trigger.action
                    ),
                    impact: metrics.performance_delta,
                });
                while self.key_milestones.len() > MAX_MILESTONES {
                    let _ = self.key_milestones.pop_front();
                }
            }
        }

        if event.event_type == EvolutionEventType::StrategyUpdate {
            for removed in strategies_in(&event.changes.before) {
                let _ = self.active_strategies.remove(&removed);
            }
            for added in strategies_in(&event.changes.after) {
                let _ = self.active_strategies.insert(added);
            }
        }

        significant
    }
}

fn trend_for(delta: f64, score_after: f64) -> PerformanceTrend {
    if score_after == 0.0 {
        return if delta == 0.0 {
            PerformanceTrend::Stable
        } else if delta > 0.0 {
            PerformanceTrend::Improving
        } else {
            PerformanceTrend::Declining
        };
    }

    if (delta / score_after).abs() < STABLE_RATIO {
        PerformanceTrend::Stable
    } else if delta > 0.0 {
        PerformanceTrend::Improving
    } else {
        PerformanceTrend::Declining
    }
}

fn strategies_in(value: &Value) -> Vec<String> {
    value
        .get("strategies")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Query filters for the journal. Results are newest-first (timestamp,
/// ties broken by insertion order); `limit` truncates after ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventFilter {
    pub event_type: Option<EvolutionEventType>,
    pub from: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
    pub impact_area: Option<String>,
    pub limit: Option<usize>,
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, event: &EvolutionEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.occurred_at < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.occurred_at > until {
                return false;
            }
        }
        if let Some(area) = &self.impact_area {
            if !event.changes.impact_areas.contains(area) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_rfc3339_utc;

    fn must_utc(value: &str) -> OffsetDateTime {
        match parse_rfc3339_utc(value) {
            Ok(parsed) => parsed,
            Err(err) => panic!("invalid fixture timestamp: {err}"),
        }
    }

    fn fixture_event(seq: i64, metrics: Option<EventMetrics>) -> EvolutionEvent {
        EvolutionEvent {
            event_seq: seq,
            event_id: ulid::Ulid::new(),
            brand_id: BrandId::new(),
            event_type: EvolutionEventType::PatternPerformance,
            trigger: EventTrigger {
                source: "analyzer".to_string(),
                action: "pattern shift".to_string(),
                metadata: Value::Null,
            },
            changes: EventChanges {
                before: Value::Null,
                after: Value::Null,
                impact_areas: BTreeSet::new(),
            },
            metrics,
            occurred_at: must_utc("2026-08-28T12:00:00Z"),
            recorded_at: must_utc("2026-08-28T12:00:00Z"),
        }
    }

    fn metrics(delta: f64, confidence: f64, samples: u64) -> EventMetrics {
        EventMetrics {
            performance_delta: delta,
            confidence_score: confidence,
            sample_size: samples,
        }
    }

    #[test]
    fn significance_needs_all_three_thresholds() {
        assert!(!metrics(0.2, 0.9, 50).is_significant()); // sample floor
        assert!(metrics(0.2, 0.9, 150).is_significant());
        assert!(!metrics(0.05, 0.9, 150).is_significant()); // tiny delta
        assert!(!metrics(0.2, 0.5, 150).is_significant()); // low confidence
    }

    #[test]
    fn notable_predicate_has_no_sample_floor() {
        let value = metrics(0.2, 0.75, 3);
        assert!(value.is_notable(0.1));
        assert!(!value.is_notable(0.3));
        assert!(!metrics(0.2, 0.5, 500).is_notable(0.1));
    }

    #[test]
    fn summary_tracks_score_and_trend() {
        let mut summary = EvolutionSummary::new(BrandId::new(), must_utc("2026-08-28T11:00:00Z"));

        let significant = summary.apply(&fixture_event(1, Some(metrics(0.5, 0.9, 150))));
        assert!(significant);
        assert_eq!(summary.total_changes, 1);
        assert!((summary.performance_score - 0.5).abs() < 1e-12);
        assert_eq!(summary.performance_trend, PerformanceTrend::Improving);
        assert_eq!(summary.key_milestones.len(), 1);

        // A tiny delta relative to the running score reads as stable.
        let significant = summary.apply(&fixture_event(2, Some(metrics(0.01, 0.9, 150))));
        assert!(!significant);
        assert_eq!(summary.performance_trend, PerformanceTrend::Stable);

        let significant = summary.apply(&fixture_event(3, Some(metrics(-0.3, 0.9, 150))));
        assert!(significant);
        assert_eq!(summary.performance_trend, PerformanceTrend::Declining);
    }

    #[test]
    fn milestone_ring_drops_oldest_beyond_ten() {
        let mut summary = EvolutionSummary::new(BrandId::new(), must_utc("2026-08-28T11:00:00Z"));
        for seq in 1..=12 {
            #[allow(clippy::cast_precision_loss)]
            let delta = 1.0 + seq as f64;
            let _ = summary.apply(&fixture_event(seq, Some(metrics(delta, 0.9, 150))));
        }
        assert_eq!(summary.key_milestones.len(), MAX_MILESTONES);
        // Oldest two (impacts 2.0 and 3.0) were dropped.
        assert!((summary.key_milestones[0].impact - 4.0).abs() < 1e-12);
    }

    #[test]
    fn strategy_updates_recompute_active_set() {
        let mut summary = EvolutionSummary::new(BrandId::new(), must_utc("2026-08-28T11:00:00Z"));
        let mut event = fixture_event(1, None);
        event.event_type = EvolutionEventType::StrategyUpdate;
        event.changes.before = serde_json::json!({ "strategies": ["seasonal_push"] });
        event.changes.after = serde_json::json!({ "strategies": ["evergreen", "retargeting"] });

        let _ = summary.apply(&event);
        assert!(summary.active_strategies.contains("evergreen"));
        assert!(summary.active_strategies.contains("retargeting"));

        let mut second = fixture_event(2, None);
        second.event_type = EvolutionEventType::StrategyUpdate;
        second.changes.before = serde_json::json!({ "strategies": ["retargeting"] });
        second.changes.after = serde_json::json!({ "strategies": ["loyalty"] });

        let _ = summary.apply(&second);
        assert!(!summary.active_strategies.contains("retargeting"));
        assert!(summary.active_strategies.contains("evergreen"));
        assert!(summary.active_strategies.contains("loyalty"));
    }

    #[test]
    fn events_without_metrics_leave_trend_alone() {
        let mut summary = EvolutionSummary::new(BrandId::new(), must_utc("2026-08-28T11:00:00Z"));
        let significant = summary.apply(&fixture_event(1, None));
        assert!(!significant);
        assert_eq!(summary.total_changes, 1);
        assert_eq!(summary.performance_trend, PerformanceTrend::Stable);
        assert!(summary.key_milestones.is_empty());
    }

    #[test]
    fn input_validation_rejects_blank_trigger() {
        let event = fixture_event(1, None);
        let mut input = EvolutionEventInput {
            event_id: None,
            brand_id: event.brand_id,
            event_type: event.event_type,
            trigger: event.trigger,
            changes: event.changes,
            metrics: None,
            occurred_at: event.occurred_at,
        };
        input.trigger.source = "  ".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn input_validation_bounds_confidence() {
        let event = fixture_event(1, None);
        let input = EvolutionEventInput {
            event_id: None,
            brand_id: event.brand_id,
            event_type: event.event_type,
            trigger: event.trigger,
            changes: event.changes,
            metrics: Some(metrics(0.2, 1.4, 10)),
            occurred_at: event.occurred_at,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn input_validation_rejects_non_finite_delta() {
        let event = fixture_event(1, None);
        let mut input = EvolutionEventInput {
            event_id: None,
            brand_id: event.brand_id,
            event_type: event.event_type,
            trigger: event.trigger,
            changes: event.changes,
            metrics: Some(metrics(f64::NAN, 0.9, 150)),
            occurred_at: event.occurred_at,
        };
        assert!(input.validate().is_err());

        if let Some(m) = input.metrics.as_mut() {
            m.performance_delta = f64::INFINITY;
        }
        assert!(input.validate().is_err());

        if let Some(m) = input.metrics.as_mut() {
            m.performance_delta = 0.2;
        }
        assert!(input.validate().is_ok());
    }

    #[test]
    fn filter_applies_type_window_and_area() {
        let mut event = fixture_event(1, None);
        let _ = event
            .changes
            .impact_areas
            .insert("brand_voice".to_string());

        let mut filter = EventFilter {
            event_type: Some(EvolutionEventType::PatternPerformance),
            impact_area: Some("brand_voice".to_string()),
            ..EventFilter::default()
        };
        assert!(filter.matches(&event));

        filter.event_type = Some(EvolutionEventType::AdminTuning);
        assert!(!filter.matches(&event));

        filter.event_type = None;
        filter.from = Some(must_utc("2026-08-29T00:00:00Z"));
        assert!(!filter.matches(&event));
    }
}
