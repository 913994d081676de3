//! Pattern analysis: running confidence-weighted success rates per tagged
//! content attribute, updated by incremental weighted mean.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{clamp, BrandId, EvolutionError, VariantId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Framework,
    Tone,
    Structure,
}

impl PatternType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Framework => "framework",
            Self::Tone => "tone",
            Self::Structure => "structure",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "framework" => Some(Self::Framework),
            "tone" => Some(Self::Tone),
            "structure" => Some(Self::Structure),
            _ => None,
        }
    }
}

/// A tagged attribute on a content variant, the unit the analyzer tracks.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
pub struct PatternKey {
    pub pattern_type: PatternType,
    pub pattern_value: String,
}

impl Display for PatternKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.pattern_type.as_str(), self.pattern_value)
    }
}

/// A content variant with its tagged attributes. Immutable once created;
/// owned by whichever campaign or test created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentVariant {
    pub id: VariantId,
    pub rendered_content: String,
    pub frameworks_used: BTreeSet<String>,
    pub tone_markers: BTreeSet<String>,
    pub structural_signature: String,
}

impl ContentVariant {
    /// One key per framework used, one per tone marker, plus the
    /// structural signature.
    #[must_use]
    pub fn pattern_keys(&self) -> Vec<PatternKey> {
        let mut keys = Vec::new();
        for framework in &self.frameworks_used {
            keys.push(PatternKey {
                pattern_type: PatternType::Framework,
                pattern_value: framework.clone(),
            });
        }
        for marker in &self.tone_markers {
            keys.push(PatternKey {
                pattern_type: PatternType::Tone,
                pattern_value: marker.clone(),
            });
        }
        if !self.structural_signature.trim().is_empty() {
            keys.push(PatternKey {
                pattern_type: PatternType::Structure,
                pattern_value: self.structural_signature.clone(),
            });
        }
        keys
    }
}

/// Analyzer constants. `min_samples`/`max_samples` bound the confidence
/// ramp; below the floor confidence is 0, at or above the ceiling it is 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct AnalyzerConfig {
    pub min_samples: u64,
    pub max_samples: u64,
}

impl AnalyzerConfig {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            min_samples: 10,
            max_samples: 100,
        }
    }

    /// Validates the confidence ramp bounds.
    ///
    /// # Errors
    /// Returns [`EvolutionError::Configuration`] when the ramp is empty or
    /// inverted.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.min_samples >= self.max_samples {
            return Err(EvolutionError::Configuration(
                "min_samples MUST be < max_samples".to_string(),
            ));
        }
        Ok(())
    }
}

/// Running success rate for one (brand, type, value) tuple. Never deleted,
/// only updated by [`PerformancePattern::observe`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformancePattern {
    pub brand_id: BrandId,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub success_rate: f64,
    pub sample_size: u64,
    pub confidence_score: f64,
}

impl PerformancePattern {
    #[must_use]
    pub fn fresh(brand_id: BrandId, key: &PatternKey) -> Self {
        Self {
            brand_id,
            pattern_type: key.pattern_type,
            pattern_value: key.pattern_value.clone(),
            success_rate: 0.0,
            sample_size: 0,
            confidence_score: 0.0,
        }
    }

    /// Folds one success score into the running average. New evidence
    /// always shifts the rate; per-update influence shrinks as the sample
    /// grows.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, success_score: f64, config: &AnalyzerConfig) {
        let next = self.sample_size + 1;
        let next_f = next as f64;
        self.success_rate =
            self.success_rate * (next_f - 1.0) / next_f + success_score / next_f;
        self.sample_size = next;
        self.confidence_score = confidence_for(next, config);
    }
}

#[allow(clippy::cast_precision_loss)]
fn confidence_for(sample_size: u64, config: &AnalyzerConfig) -> f64 {
    let span = (config.max_samples - config.min_samples) as f64;
    let progress = sample_size as f64 - config.min_samples as f64;
    clamp(progress / span, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_key() -> PatternKey {
        PatternKey {
            pattern_type: PatternType::Framework,
            pattern_value: "AIDA".to_string(),
        }
    }

    fn observed(scores: &[f64]) -> PerformancePattern {
        let config = AnalyzerConfig::v1();
        let mut pattern = PerformancePattern::fresh(BrandId::new(), &fixture_key());
        for score in scores {
            pattern.observe(*score, &config);
        }
        pattern
    }

    #[test]
    fn first_observation_sets_rate_directly() {
        let pattern = observed(&[1.4]);
        assert!((pattern.success_rate - 1.4).abs() < 1e-12);
        assert_eq!(pattern.sample_size, 1);
        assert!((pattern.confidence_score - 0.0).abs() < 1e-12);
    }

    #[test]
    fn running_mean_matches_arithmetic_mean() {
        let pattern = observed(&[1.0, 2.0, 0.5, 1.5]);
        assert_eq!(pattern.sample_size, 4);
        assert!((pattern.success_rate - 1.25).abs() < 1e-12);
    }

    #[test]
    fn replaying_a_sequence_is_deterministic() {
        let scores = [0.3, 1.7, 1.1, 0.9, 2.0, 0.0, 1.3];
        let first = observed(&scores);
        let second = observed(&scores);
        assert_eq!(first.success_rate.to_bits(), second.success_rate.to_bits());
        assert_eq!(first.sample_size, second.sample_size);
        assert_eq!(
            first.confidence_score.to_bits(),
            second.confidence_score.to_bits()
        );
    }

    #[test]
    fn confidence_ramp_clamps_at_both_ends() {
        let config = AnalyzerConfig::v1();
        assert!((confidence_for(0, &config) - 0.0).abs() < 1e-12);
        assert!((confidence_for(10, &config) - 0.0).abs() < 1e-12);
        assert!((confidence_for(100, &config) - 1.0).abs() < 1e-12);
        assert!((confidence_for(250, &config) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_monotonic_over_the_ramp() {
        let config = AnalyzerConfig::v1();
        let mut previous = 0.0;
        for sample_size in 10..=100 {
            let current = confidence_for(sample_size, &config);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn fifteen_samples_yield_expected_confidence() {
        // (15 - 10) / (100 - 10) per the ramp formula.
        let config = AnalyzerConfig::v1();
        let confidence = confidence_for(15, &config);
        assert!((confidence - 5.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn variant_keys_cover_all_attribute_values() {
        let variant = ContentVariant {
            id: VariantId::new(),
            rendered_content: "Buy now.".to_string(),
            frameworks_used: ["AIDA".to_string(), "PAS".to_string()].into(),
            tone_markers: ["urgent".to_string()].into(),
            structural_signature: "hook-body-cta".to_string(),
        };

        let keys = variant.pattern_keys();
        assert_eq!(keys.len(), 4);
        assert!(keys.iter().any(|key| {
            key.pattern_type == PatternType::Structure && key.pattern_value == "hook-body-cta"
        }));
    }

    #[test]
    fn blank_signature_is_skipped() {
        let variant = ContentVariant {
            id: VariantId::new(),
            rendered_content: String::new(),
            frameworks_used: BTreeSet::new(),
            tone_markers: BTreeSet::new(),
            structural_signature: "  ".to_string(),
        };
        assert!(variant.pattern_keys().is_empty());
    }

    #[test]
    fn inverted_ramp_fails_validation() {
        let config = AnalyzerConfig {
            min_samples: 100,
            max_samples: 10,
        };
        assert!(config.validate().is_err());
    }
}
