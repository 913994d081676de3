//! Write coordination on top of [`SqliteEvolutionStore`]: a read-through
//! model cache, a per-brand lock serializing read-modify-write cycles,
//! and the notification hook for significant events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, Result};
use brand_evolution_core::evolution::{
    EventChanges, EventFilter, EventMetrics, EventTrigger, EvolutionEvent, EvolutionEventInput,
    EvolutionEventType, EvolutionSummary, SIGNIFICANT_DELTA,
};
use brand_evolution_core::metrics::{success_score, MetricBenchmarks, PerformanceSample};
use brand_evolution_core::model::{
    significant_pattern_updates, BrandModel, DeviationMarker, MergePolicy, ModelPerformance,
    ModelUpdates, ModelVersion,
};
use brand_evolution_core::pattern::{AnalyzerConfig, ContentVariant, PerformancePattern};
use brand_evolution_core::tone::{self, ToneAnalysis, VoiceTraitEstimator};
use brand_evolution_core::tuning::{tuning_diff, BrandPlan, PatternTuning};
use brand_evolution_core::{now_utc, BrandId, EvolutionError, Severity};
use serde::Serialize;
use serde_json::{json, Value};

use crate::SqliteEvolutionStore;

/// Receives alerts for events that clear the significance gate. Delivery
/// is best-effort: a sink failure is logged and never blocks the journal
/// write that triggered it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, brand_id: BrandId, message: &str, severity: Severity) -> Result<()>;
}

/// Default sink: significant changes land in the structured log.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, brand_id: BrandId, message: &str, severity: Severity) -> Result<()> {
        log::info!(
            "brand {brand_id} significant change [{}]: {message}",
            severity.as_str()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub benchmarks: MetricBenchmarks,
    pub analyzer: AnalyzerConfig,
    pub merge_policy: MergePolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            benchmarks: MetricBenchmarks::v1(),
            analyzer: AnalyzerConfig::v1(),
            merge_policy: MergePolicy::v1(),
        }
    }

    pub fn validate(&self) -> Result<(), EvolutionError> {
        self.benchmarks.validate()?;
        self.analyzer.validate()?;
        self.merge_policy.validate()?;
        Ok(())
    }
}

/// Outcome of a model write: the version it produced and the field paths
/// that actually changed.
#[derive(Debug, Clone, Serialize)]
pub struct VersionReport {
    pub brand_id: BrandId,
    pub version: u32,
    pub changes: Vec<String>,
}

/// Outcome of a manual tuning application.
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub brand_id: BrandId,
    pub version: u32,
    pub changes: Vec<String>,
    pub impact_areas: std::collections::BTreeSet<String>,
}

/// Single-process coordinator over the store. All writes for a brand go
/// through that brand's lock, so read-modify-write cycles never interleave;
/// the version check in the store catches writers from other processes.
pub struct EvolutionEngine {
    store: Mutex<SqliteEvolutionStore>,
    cache: RwLock<HashMap<BrandId, Arc<BrandModel>>>,
    brand_locks: Mutex<HashMap<BrandId, Arc<Mutex<()>>>>,
    config: EngineConfig,
    sink: Arc<dyn NotificationSink>,
}

impl EvolutionEngine {
    pub fn new(
        store: SqliteEvolutionStore,
        config: EngineConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Mutex::new(store),
            cache: RwLock::new(HashMap::new()),
            brand_locks: Mutex::new(HashMap::new()),
            config,
            sink,
        })
    }

    fn store_guard(&self) -> Result<MutexGuard<'_, SqliteEvolutionStore>> {
        self.store
            .lock()
            .map_err(|_| anyhow!("store mutex poisoned"))
    }

    fn brand_lock(&self, brand_id: BrandId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .brand_locks
            .lock()
            .map_err(|_| anyhow!("brand lock registry poisoned"))?;
        Ok(Arc::clone(
            locks.entry(brand_id).or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    fn cached(&self, brand_id: BrandId) -> Result<Option<Arc<BrandModel>>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| anyhow!("model cache poisoned"))?;
        Ok(cache.get(&brand_id).cloned())
    }

    fn cache_put(&self, brand_id: BrandId, model: Arc<BrandModel>) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| anyhow!("model cache poisoned"))?;
        let _ = cache.insert(brand_id, model);
        Ok(())
    }

    fn invalidate(&self, brand_id: BrandId) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| anyhow!("model cache poisoned"))?;
        let _ = cache.remove(&brand_id);
        Ok(())
    }

    /// Returns the brand's model, provisioning version-1 defaults on the
    /// Starter plan when the brand has never been seen.
    pub fn get_model(&self, brand_id: BrandId) -> Result<Arc<BrandModel>> {
        if let Some(model) = self.cached(brand_id)? {
            return Ok(model);
        }

        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let model = Arc::new(self.load_or_init(&mut store, brand_id, BrandPlan::Starter)?);
        self.cache_put(brand_id, Arc::clone(&model))?;
        Ok(model)
    }

    /// Explicit provisioning with a chosen plan. Returns the existing
    /// model untouched when the brand is already known.
    pub fn init_brand(&self, brand_id: BrandId, plan: BrandPlan) -> Result<Arc<BrandModel>> {
        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let model = Arc::new(self.load_or_init(&mut store, brand_id, plan)?);
        self.cache_put(brand_id, Arc::clone(&model))?;
        Ok(model)
    }

    /// Applies a partial update, re-evaluates model performance against
    /// the current pattern set, and appends the resulting version.
    pub fn update_model(
        &self,
        brand_id: BrandId,
        updates: &ModelUpdates,
    ) -> Result<VersionReport> {
        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let (_, report) = self.merge_and_store(&mut store, brand_id, updates)?;
        Ok(report)
    }

    /// Folds one observed performance sample into every pattern the
    /// variant carries. Returns the updated patterns.
    pub fn ingest_performance(
        &self,
        brand_id: BrandId,
        variant: &ContentVariant,
        sample: &PerformanceSample,
    ) -> Result<Vec<PerformancePattern>> {
        let score = success_score(sample, &self.config.benchmarks)?;

        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let mut updated = Vec::new();
        for key in variant.pattern_keys() {
            let mut pattern = match store.get_pattern(brand_id, &key)? {
                Some(existing) => existing,
                None => PerformancePattern::fresh(brand_id, &key),
            };
            pattern.observe(score, &self.config.analyzer);
            store.upsert_pattern(&pattern)?;
            updated.push(pattern);
        }
        Ok(updated)
    }

    /// Merges patterns that clear the merge policy into the model and
    /// journals the adjustment. Returns `None`, mutating nothing, when no
    /// pattern qualifies.
    pub fn apply_significant_patterns(
        &self,
        brand_id: BrandId,
    ) -> Result<Option<VersionReport>> {
        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let patterns = store.list_patterns(brand_id)?;
        let Some(updates) = significant_pattern_updates(&patterns, &self.config.merge_policy)
        else {
            return Ok(None);
        };

        let before_model = self.load_or_init(&mut store, brand_id, BrandPlan::Starter)?;
        let before = sections_json(&before_model);
        let (model, report) = self.merge_and_store(&mut store, brand_id, &updates)?;

        let surviving: Vec<&PerformancePattern> = patterns
            .iter()
            .filter(|pattern| {
                pattern.confidence_score > self.config.merge_policy.min_confidence
                    && pattern.sample_size > self.config.merge_policy.min_samples
            })
            .collect();
        let metrics = aggregate_metrics(&surviving);

        let input = EvolutionEventInput {
            event_id: None,
            brand_id,
            event_type: EvolutionEventType::ModelAdjustment,
            trigger: EventTrigger {
                source: "pattern_analyzer".to_string(),
                action: "merge significant patterns".to_string(),
                metadata: json!({ "patterns_merged": surviving.len() }),
            },
            changes: EventChanges {
                before,
                after: sections_json(&model),
                impact_areas: report
                    .changes
                    .iter()
                    .filter_map(|path| path.split('.').next())
                    .map(String::from)
                    .collect(),
            },
            metrics,
            occurred_at: now_utc(),
        };
        let _ = self.journal(&mut store, &input)?;

        Ok(Some(report))
    }

    /// Appends a journal entry, folds it into the brand summary, and
    /// notifies the sink when the event clears the significance gate.
    pub fn record_event(&self, input: &EvolutionEventInput) -> Result<EvolutionEvent> {
        let lock = self.brand_lock(input.brand_id)?;
        let _guard = lock.lock().map_err(|_| {
            EvolutionError::ConcurrentUpdateConflict {
                brand_id: input.brand_id,
            }
        })?;
        let mut store = self.store_guard()?;
        self.journal(&mut store, input)
    }

    pub fn query_events(
        &self,
        brand_id: BrandId,
        filter: &EventFilter,
    ) -> Result<Vec<EvolutionEvent>> {
        self.store_guard()?.query_events(brand_id, filter)
    }

    /// Retrospective audit: events whose |delta| cleared `threshold` at
    /// reasonable confidence, regardless of sample size.
    pub fn significant_changes(
        &self,
        brand_id: BrandId,
        threshold: f64,
    ) -> Result<Vec<EvolutionEvent>> {
        self.store_guard()?.notable_events(brand_id, threshold)
    }

    pub fn summary(&self, brand_id: BrandId) -> Result<Option<EvolutionSummary>> {
        self.store_guard()?.get_summary(brand_id)
    }

    pub fn patterns(&self, brand_id: BrandId) -> Result<Vec<PerformancePattern>> {
        self.store_guard()?.list_patterns(brand_id)
    }

    pub fn model_versions(&self, brand_id: BrandId) -> Result<Vec<ModelVersion>> {
        self.store_guard()?.list_model_versions(brand_id)
    }

    /// Scores `content` against the brand's tone fingerprint. A deviation
    /// stamps the model with a review marker and journals the miss; the
    /// analysis is returned either way.
    pub fn check_tone(
        &self,
        brand_id: BrandId,
        content: &str,
        content_type: &str,
        estimator: &dyn VoiceTraitEstimator,
    ) -> Result<ToneAnalysis> {
        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let model = self.load_or_init(&mut store, brand_id, BrandPlan::Starter)?;
        let Some(fingerprint) = &model.tone_fingerprint else {
            return Err(EvolutionError::FingerprintMissing { brand_id }.into());
        };

        let analysis = tone::analyze(fingerprint, content, estimator);
        if analysis.matches_brand {
            return Ok(analysis);
        }

        let marker = DeviationMarker {
            at: now_utc(),
            issues: analysis.issues.clone(),
            requires_review: analysis.has_high_severity_issue(),
        };
        let before = match &model.last_deviation {
            Some(previous) => serde_json::to_value(previous)?,
            None => Value::Null,
        };
        let updates = ModelUpdates {
            last_deviation: Some(marker.clone()),
            ..ModelUpdates::default()
        };
        let _ = self.merge_and_store(&mut store, brand_id, &updates)?;

        let input = EvolutionEventInput {
            event_id: None,
            brand_id,
            event_type: EvolutionEventType::PatternPerformance,
            trigger: EventTrigger {
                source: "tone_guard".to_string(),
                action: "tone deviation detected".to_string(),
                metadata: json!({ "content_type": content_type }),
            },
            changes: EventChanges {
                before,
                after: serde_json::to_value(&marker)?,
                impact_areas: std::iter::once("brand_voice".to_string()).collect(),
            },
            metrics: None,
            occurred_at: now_utc(),
        };
        let _ = self.journal(&mut store, &input)?;

        Ok(analysis)
    }

    /// Applies manual tuning dials. Gated on the brand's plan; weights
    /// outside `[0, 1]` are clamped, not rejected.
    pub fn apply_tuning(
        &self,
        brand_id: BrandId,
        tuning: PatternTuning,
        applied_by: &str,
    ) -> Result<TuningReport> {
        let lock = self.brand_lock(brand_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| EvolutionError::ConcurrentUpdateConflict { brand_id })?;
        let mut store = self.store_guard()?;

        let model = self.load_or_init(&mut store, brand_id, BrandPlan::Starter)?;
        if !model.plan.allows_tuning() {
            return Err(EvolutionError::PlanIneligible {
                plan: model.plan.as_str().to_string(),
            }
            .into());
        }

        let tuning = tuning.clamped();
        tuning.validate()?;

        let diff = tuning_diff(model.tuning.as_ref(), &tuning);
        let before = match &model.tuning {
            Some(previous) => serde_json::to_value(previous)?,
            None => Value::Null,
        };
        let after = serde_json::to_value(&tuning)?;

        let updates = ModelUpdates {
            tuning: Some(tuning),
            ..ModelUpdates::default()
        };
        let (_, report) = self.merge_and_store(&mut store, brand_id, &updates)?;

        let input = EvolutionEventInput {
            event_id: None,
            brand_id,
            event_type: EvolutionEventType::AdminTuning,
            trigger: EventTrigger {
                source: applied_by.to_string(),
                action: "manual pattern tuning".to_string(),
                metadata: Value::Null,
            },
            changes: EventChanges {
                before,
                after,
                impact_areas: diff.impact_areas.clone(),
            },
            metrics: None,
            occurred_at: now_utc(),
        };
        let _ = self.journal(&mut store, &input)?;

        Ok(TuningReport {
            brand_id,
            version: report.version,
            changes: diff.changes,
            impact_areas: diff.impact_areas,
        })
    }

    fn load_or_init(
        &self,
        store: &mut SqliteEvolutionStore,
        brand_id: BrandId,
        plan: BrandPlan,
    ) -> Result<BrandModel> {
        if let Some(model) = store.get_brand_model(brand_id)? {
            return Ok(model);
        }

        let model = BrandModel::initial(brand_id, plan, now_utc());
        match store.put_brand_model(&model, None) {
            Ok(()) => Ok(model),
            // Another process created the brand between read and insert.
            Err(err) if is_conflict(&err) => store
                .get_brand_model(brand_id)?
                .ok_or_else(|| anyhow!("brand model vanished after insert conflict")),
            Err(err) => Err(err),
        }
    }

    /// Read-merge-write with one retry on a stale version, in case an
    /// out-of-process writer raced this one.
    fn merge_and_store(
        &self,
        store: &mut SqliteEvolutionStore,
        brand_id: BrandId,
        updates: &ModelUpdates,
    ) -> Result<(BrandModel, VersionReport)> {
        let mut retried = false;
        loop {
            let mut model = self.load_or_init(store, brand_id, BrandPlan::Starter)?;
            let expected = model.current_version();
            let changes = model.apply_updates(updates);
            let performance = ModelPerformance::evaluate(&store.list_patterns(brand_id)?);
            let version = model.push_version(changes.clone(), performance, now_utc());

            match store.put_brand_model(&model, Some(expected)) {
                Ok(()) => {
                    self.invalidate(brand_id)?;
                    let report = VersionReport {
                        brand_id,
                        version,
                        changes,
                    };
                    return Ok((model, report));
                }
                Err(err) if !retried && is_conflict(&err) => {
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn journal(
        &self,
        store: &mut SqliteEvolutionStore,
        input: &EvolutionEventInput,
    ) -> Result<EvolutionEvent> {
        let event = store.append_event(input)?;

        let mut summary = match store.get_summary(event.brand_id)? {
            Some(existing) => existing,
            None => EvolutionSummary::new(event.brand_id, event.recorded_at),
        };
        let significant = summary.apply(&event);
        store.put_summary(&summary)?;

        if significant {
            if let Some(metrics) = &event.metrics {
                let severity = if metrics.performance_delta.abs() >= 2.0 * SIGNIFICANT_DELTA {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let message = format!(
                    "{} moved performance by {:+.3} (confidence {:.2}, {} samples)",
                    event.event_type.as_str(),
                    metrics.performance_delta,
                    metrics.confidence_score,
                    metrics.sample_size,
                );
                if let Err(err) = self.sink.notify(event.brand_id, &message, severity) {
                    log::warn!(
                        "notification sink failed for brand {}: {err:#}",
                        event.brand_id
                    );
                }
            }
        }

        Ok(event)
    }
}

fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<EvolutionError>(),
        Some(EvolutionError::ConcurrentUpdateConflict { .. })
    )
}

fn sections_json(model: &BrandModel) -> Value {
    json!({
        "tone_preferences": model.tone_preferences,
        "content_formats": model.content_formats,
        "visual_preferences": model.visual_preferences,
        "audience_signals": model.audience_signals,
        "industry_context": model.industry_context,
    })
}

/// Event metrics for an automatic merge: the mean deviation of the
/// surviving patterns from benchmark, their weakest confidence, and
/// their pooled sample count.
fn aggregate_metrics(surviving: &[&PerformancePattern]) -> Option<EventMetrics> {
    if surviving.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let count = surviving.len() as f64;
    let mean_delta: f64 = surviving
        .iter()
        .map(|pattern| pattern.success_rate - 1.0)
        .sum::<f64>()
        / count;
    let min_confidence = surviving
        .iter()
        .map(|pattern| pattern.confidence_score)
        .fold(1.0_f64, f64::min);
    let total_samples: u64 = surviving.iter().map(|pattern| pattern.sample_size).sum();

    Some(EventMetrics {
        performance_delta: mean_delta,
        confidence_score: min_confidence,
        sample_size: total_samples,
    })
}
