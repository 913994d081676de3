//! The versioned per-brand preference model. Every mutation appends a
//! version record; the model is never edited in place without one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::pattern::{PatternType, PerformancePattern};
use crate::tone::{ToneFingerprint, ToneIssue};
use crate::tuning::{BrandPlan, PatternTuning};
use crate::{BrandId, EvolutionError};

/// Cap on the sample-size weight in the model confidence formula.
const CONFIDENCE_SAMPLE_CAP: u64 = 100;

pub type WeightMap = BTreeMap<String, f64>;

/// Snapshot of model quality recorded with each version.
///
/// Note this confidence formula is deliberately distinct from the pattern
/// analyzer's ramp; the two are calibrated per-component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPerformance {
    pub accuracy: f64,
    pub confidence: f64,
    pub sample_size: u64,
}

impl ModelPerformance {
    /// Evaluates accuracy and confidence from the brand's tracked patterns.
    /// Accuracy is the fraction of patterns trending above benchmark;
    /// confidence is base 0.5 plus up to 0.5 scaled by accuracy and a
    /// sample-size weight capped at 100 samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(patterns: &[PerformancePattern]) -> Self {
        let sample_size: u64 = patterns.iter().map(|pattern| pattern.sample_size).sum();
        let accuracy = if patterns.is_empty() {
            0.0
        } else {
            let improving = patterns
                .iter()
                .filter(|pattern| pattern.success_rate > 1.0)
                .count();
            improving as f64 / patterns.len() as f64
        };
        let sample_weight = sample_size.min(CONFIDENCE_SAMPLE_CAP) as f64
            / CONFIDENCE_SAMPLE_CAP as f64;
        Self {
            accuracy,
            confidence: 0.5 + 0.5 * accuracy * sample_weight,
            sample_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelVersion {
    pub version: u32,
    pub timestamp: OffsetDateTime,
    pub changes: Vec<String>,
    pub performance_metrics: ModelPerformance,
}

/// Marker left on the model when Tone Guard catches a deviation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviationMarker {
    pub at: OffsetDateTime,
    pub issues: Vec<ToneIssue>,
    pub requires_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandModel {
    pub brand_id: BrandId,
    pub plan: BrandPlan,
    pub tone_preferences: WeightMap,
    pub content_formats: WeightMap,
    pub visual_preferences: WeightMap,
    pub audience_signals: WeightMap,
    pub industry_context: WeightMap,
    pub tone_fingerprint: Option<ToneFingerprint>,
    pub last_deviation: Option<DeviationMarker>,
    pub tuning: Option<PatternTuning>,
    pub version_history: Vec<ModelVersion>,
}

impl BrandModel {
    /// Version 1 defaults for a lazily provisioned brand.
    #[must_use]
    pub fn initial(
        brand_id: BrandId,
        plan: BrandPlan,
        timestamp: OffsetDateTime,
    ) -> Self {
        let mut tone_preferences = WeightMap::new();
        tone_preferences.insert("professional".to_string(), 0.6);
        tone_preferences.insert("conversational".to_string(), 0.4);

        let mut content_formats = WeightMap::new();
        content_formats.insert("short_form".to_string(), 0.5);
        content_formats.insert("long_form".to_string(), 0.5);

        Self {
            brand_id,
            plan,
            tone_preferences,
            content_formats,
            visual_preferences: WeightMap::new(),
            audience_signals: WeightMap::new(),
            industry_context: WeightMap::new(),
            tone_fingerprint: None,
            last_deviation: None,
            tuning: None,
            version_history: vec![ModelVersion {
                version: 1,
                timestamp,
                changes: Vec::new(),
                performance_metrics: ModelPerformance::evaluate(&[]),
            }],
        }
    }

    #[must_use]
    pub fn current_version(&self) -> u32 {
        self.version_history
            .last()
            .map_or(0, |entry| entry.version)
    }

    /// Shallow-merges `updates` into the model and returns the list of
    /// field paths that actually differed. Map sections merge key-by-key;
    /// whole-value fields replace.
    pub fn apply_updates(&mut self, updates: &ModelUpdates) -> Vec<String> {
        let mut changes = Vec::new();

        merge_section(
            &mut self.tone_preferences,
            updates.tone_preferences.as_ref(),
            "tone_preferences",
            &mut changes,
        );
        merge_section(
            &mut self.content_formats,
            updates.content_formats.as_ref(),
            "content_formats",
            &mut changes,
        );
        merge_section(
            &mut self.visual_preferences,
            updates.visual_preferences.as_ref(),
            "visual_preferences",
            &mut changes,
        );
        merge_section(
            &mut self.audience_signals,
            updates.audience_signals.as_ref(),
            "audience_signals",
            &mut changes,
        );
        merge_section(
            &mut self.industry_context,
            updates.industry_context.as_ref(),
            "industry_context",
            &mut changes,
        );

        if let Some(fingerprint) = &updates.tone_fingerprint {
            if self.tone_fingerprint.as_ref() != Some(fingerprint) {
                self.tone_fingerprint = Some(fingerprint.clone());
                changes.push("tone_fingerprint".to_string());
            }
        }
        if let Some(deviation) = &updates.last_deviation {
            if self.last_deviation.as_ref() != Some(deviation) {
                self.last_deviation = Some(deviation.clone());
                changes.push("last_deviation".to_string());
            }
        }
        if let Some(tuning) = &updates.tuning {
            if self.tuning.as_ref() != Some(tuning) {
                self.tuning = Some(tuning.clone());
                changes.push("tuning".to_string());
            }
        }

        changes
    }

    /// Appends the version entry for an already-applied merge. The version
    /// counter always increments, even for an empty change list.
    pub fn push_version(
        &mut self,
        changes: Vec<String>,
        performance_metrics: ModelPerformance,
        timestamp: OffsetDateTime,
    ) -> u32 {
        let version = self.current_version() + 1;
        self.version_history.push(ModelVersion {
            version,
            timestamp,
            changes,
            performance_metrics,
        });
        version
    }
}

fn merge_section(
    section: &mut WeightMap,
    updates: Option<&WeightMap>,
    name: &str,
    changes: &mut Vec<String>,
) {
    let Some(updates) = updates else {
        return;
    };
    for (key, value) in updates {
        let differs = section
            .get(key)
            .map_or(true, |existing| (existing - value).abs() > f64::EPSILON);
        if differs {
            section.insert(key.clone(), *value);
            changes.push(format!("{name}.{key}"));
        }
    }
}

/// Partial updates for a shallow merge into [`BrandModel`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_preferences: Option<WeightMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_formats: Option<WeightMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_preferences: Option<WeightMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_signals: Option<WeightMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_context: Option<WeightMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_fingerprint: Option<ToneFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deviation: Option<DeviationMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<PatternTuning>,
}

impl ModelUpdates {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Thresholds a pattern must clear before it may nudge the model. The
/// guard against over-fitting to small samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MergePolicy {
    pub min_confidence: f64,
    pub min_samples: u64,
}

impl MergePolicy {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            min_confidence: 0.7,
            min_samples: 20,
        }
    }

    /// Validates the merge thresholds.
    ///
    /// # Errors
    /// Returns [`EvolutionError::Configuration`] when `min_confidence` is
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EvolutionError::Configuration(
                "min_confidence MUST be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }

    fn clears(&self, pattern: &PerformancePattern) -> bool {
        pattern.confidence_score > self.min_confidence && pattern.sample_size > self.min_samples
    }
}

/// Filters patterns through the merge policy and, when any survive,
/// produces per-type weight maps normalized by success rate. Returns
/// `None` when no pattern clears both thresholds; no mutation occurs.
#[must_use]
pub fn significant_pattern_updates(
    patterns: &[PerformancePattern],
    policy: &MergePolicy,
) -> Option<ModelUpdates> {
    let surviving: Vec<&PerformancePattern> = patterns
        .iter()
        .filter(|pattern| policy.clears(pattern))
        .collect();
    if surviving.is_empty() {
        return None;
    }

    let mut updates = ModelUpdates::default();
    for pattern_type in [
        PatternType::Framework,
        PatternType::Tone,
        PatternType::Structure,
    ] {
        let of_type: Vec<&&PerformancePattern> = surviving
            .iter()
            .filter(|pattern| pattern.pattern_type == pattern_type)
            .collect();
        if of_type.is_empty() {
            continue;
        }

        let total: f64 = of_type.iter().map(|pattern| pattern.success_rate).sum();
        if total <= 0.0 {
            continue;
        }

        let mut weights = WeightMap::new();
        for pattern in of_type {
            weights.insert(pattern.pattern_value.clone(), pattern.success_rate / total);
        }

        match pattern_type {
            PatternType::Framework => updates.content_formats = Some(weights),
            PatternType::Tone => updates.tone_preferences = Some(weights),
            PatternType::Structure => updates.audience_signals = Some(weights),
        }
    }

    if updates.is_empty() {
        None
    } else {
        Some(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_utc;
    use crate::pattern::PatternKey;

    fn fixture_model() -> BrandModel {
        BrandModel::initial(BrandId::new(), BrandPlan::Growth, now_utc())
    }

    fn fixture_pattern(
        pattern_type: PatternType,
        value: &str,
        rate: f64,
        samples: u64,
        confidence: f64,
    ) -> PerformancePattern {
        let mut pattern = PerformancePattern::fresh(
            BrandId::new(),
            &PatternKey {
                pattern_type,
                pattern_value: value.to_string(),
            },
        );
        pattern.success_rate = rate;
        pattern.sample_size = samples;
        pattern.confidence_score = confidence;
        pattern
    }

    #[test]
    fn initial_model_starts_at_version_one() {
        let model = fixture_model();
        assert_eq!(model.current_version(), 1);
        assert_eq!(model.version_history.len(), 1);
        assert!(model.version_history[0].changes.is_empty());
    }

    #[test]
    fn merge_records_only_differing_paths() {
        let mut model = fixture_model();
        let mut tone = WeightMap::new();
        tone.insert("professional".to_string(), 0.6); // unchanged
        tone.insert("playful".to_string(), 0.2); // new

        let updates = ModelUpdates {
            tone_preferences: Some(tone),
            ..ModelUpdates::default()
        };
        let changes = model.apply_updates(&updates);
        assert_eq!(changes, vec!["tone_preferences.playful".to_string()]);
        assert!((model.tone_preferences["playful"] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn empty_update_still_increments_version() {
        let mut model = fixture_model();
        let changes = model.apply_updates(&ModelUpdates::default());
        assert!(changes.is_empty());

        let version = model.push_version(changes, ModelPerformance::evaluate(&[]), now_utc());
        assert_eq!(version, 2);
        assert_eq!(model.version_history.len(), 2);
        assert!(model.version_history[1].changes.is_empty());
    }

    #[test]
    fn whole_value_fields_replace() {
        let mut model = fixture_model();
        let tuning = PatternTuning {
            voice_scale: 0.8,
            cta_style: crate::tuning::CtaStyle::Hard,
            positioning: crate::tuning::Positioning::Luxury,
            custom_weights: WeightMap::new(),
        };
        let updates = ModelUpdates {
            tuning: Some(tuning.clone()),
            ..ModelUpdates::default()
        };
        let changes = model.apply_updates(&updates);
        assert_eq!(changes, vec!["tuning".to_string()]);

        // Re-applying the identical value is not a change.
        let changes = model.apply_updates(&updates);
        assert!(changes.is_empty());
    }

    #[test]
    fn model_confidence_scales_with_accuracy_and_samples() {
        let patterns = vec![
            fixture_pattern(PatternType::Framework, "AIDA", 1.4, 60, 0.5),
            fixture_pattern(PatternType::Tone, "urgent", 0.8, 40, 0.3),
        ];
        let performance = ModelPerformance::evaluate(&patterns);
        assert!((performance.accuracy - 0.5).abs() < 1e-12);
        assert_eq!(performance.sample_size, 100);
        assert!((performance.confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn no_patterns_means_base_confidence() {
        let performance = ModelPerformance::evaluate(&[]);
        assert!((performance.confidence - 0.5).abs() < 1e-12);
        assert_eq!(performance.sample_size, 0);
    }

    #[test]
    fn low_confidence_patterns_never_reach_the_model() {
        // 15 samples: confidence (15-10)/90 ~ 0.056 and sample_size <= 20,
        // so both thresholds independently block the merge.
        let pattern = fixture_pattern(PatternType::Framework, "AIDA", 1.5, 15, 5.0 / 90.0);
        let updates = significant_pattern_updates(&[pattern], &MergePolicy::v1());
        assert!(updates.is_none());
    }

    #[test]
    fn high_samples_but_low_confidence_still_blocked() {
        let pattern = fixture_pattern(PatternType::Framework, "AIDA", 1.5, 50, 0.4);
        assert!(significant_pattern_updates(&[pattern], &MergePolicy::v1()).is_none());
    }

    #[test]
    fn high_confidence_but_small_sample_still_blocked() {
        let pattern = fixture_pattern(PatternType::Framework, "AIDA", 1.5, 15, 0.9);
        assert!(significant_pattern_updates(&[pattern], &MergePolicy::v1()).is_none());
    }

    #[test]
    fn surviving_patterns_normalize_per_type() {
        let patterns = vec![
            fixture_pattern(PatternType::Framework, "AIDA", 1.5, 40, 0.8),
            fixture_pattern(PatternType::Framework, "PAS", 0.5, 30, 0.75),
            fixture_pattern(PatternType::Tone, "urgent", 1.2, 25, 0.9),
        ];
        let updates = match significant_pattern_updates(&patterns, &MergePolicy::v1()) {
            Some(value) => value,
            None => panic!("expected surviving patterns"),
        };

        let formats = match updates.content_formats {
            Some(value) => value,
            None => panic!("expected framework weights"),
        };
        assert!((formats["AIDA"] - 0.75).abs() < 1e-12);
        assert!((formats["PAS"] - 0.25).abs() < 1e-12);

        let tones = match updates.tone_preferences {
            Some(value) => value,
            None => panic!("expected tone weights"),
        };
        assert!((tones["urgent"] - 1.0).abs() < 1e-12);
    }
}
