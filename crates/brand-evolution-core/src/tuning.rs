//! Pattern Tuner: bounded manual dials over a brand's model, gated by
//! plan eligibility and journaled through the Evolution Log.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{clamp, EvolutionError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BrandPlan {
    Starter,
    Growth,
    Scale,
}

impl BrandPlan {
    /// Manual tuning is reserved for the paid tiers.
    #[must_use]
    pub fn allows_tuning(self) -> bool {
        matches!(self, Self::Growth | Self::Scale)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Growth => "growth",
            Self::Scale => "scale",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "starter" => Some(Self::Starter),
            "growth" => Some(Self::Growth),
            "scale" => Some(Self::Scale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CtaStyle {
    Hard,
    Soft,
}

impl CtaStyle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hard" => Some(Self::Hard),
            "soft" => Some(Self::Soft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Positioning {
    Luxury,
    Value,
    Experimental,
}

impl Positioning {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Luxury => "luxury",
            Self::Value => "value",
            Self::Experimental => "experimental",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "luxury" => Some(Self::Luxury),
            "value" => Some(Self::Value),
            "experimental" => Some(Self::Experimental),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternTuning {
    pub voice_scale: f64,
    pub cta_style: CtaStyle,
    pub positioning: Positioning,
    #[serde(default)]
    pub custom_weights: BTreeMap<String, f64>,
}

impl PatternTuning {
    /// Clamps every custom weight into `[0, 1]`.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        for weight in self.custom_weights.values_mut() {
            *weight = clamp(*weight, 0.0, 1.0);
        }
        self
    }

    /// Validates the bounded dials.
    ///
    /// # Errors
    /// Returns [`EvolutionError::Validation`] when `voice_scale` is outside
    /// `[0, 1]` or a custom weight key is blank.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if !(0.0..=1.0).contains(&self.voice_scale) {
            return Err(EvolutionError::Validation(
                "voice_scale MUST be in [0.0, 1.0]".to_string(),
            ));
        }
        if self.custom_weights.keys().any(|key| key.trim().is_empty()) {
            return Err(EvolutionError::Validation(
                "custom_weights keys MUST be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuningDiff {
    pub changes: Vec<String>,
    pub impact_areas: BTreeSet<String>,
}

/// Diffs two tuning states at the dial level. Impact areas derive purely
/// from which top-level keys changed.
#[must_use]
pub fn tuning_diff(before: Option<&PatternTuning>, after: &PatternTuning) -> TuningDiff {
    let mut changes = Vec::new();
    let mut impact_areas = BTreeSet::new();

    let voice_changed = before.map_or(true, |prev| {
        (prev.voice_scale - after.voice_scale).abs() > f64::EPSILON
    });
    if voice_changed {
        changes.push("voice_scale".to_string());
        impact_areas.insert("brand_voice".to_string());
    }

    if before.map_or(true, |prev| prev.cta_style != after.cta_style) {
        changes.push("cta_style".to_string());
        impact_areas.insert("conversion_elements".to_string());
    }

    if before.map_or(true, |prev| prev.positioning != after.positioning) {
        changes.push("positioning".to_string());
        impact_areas.insert("market_positioning".to_string());
    }

    if before.map_or(!after.custom_weights.is_empty(), |prev| {
        prev.custom_weights != after.custom_weights
    }) {
        changes.push("custom_weights".to_string());
        impact_areas.insert("scoring_weights".to_string());
    }

    TuningDiff {
        changes,
        impact_areas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_tuning() -> PatternTuning {
        PatternTuning {
            voice_scale: 0.6,
            cta_style: CtaStyle::Soft,
            positioning: Positioning::Value,
            custom_weights: BTreeMap::new(),
        }
    }

    #[test]
    fn starter_plan_is_ineligible() {
        assert!(!BrandPlan::Starter.allows_tuning());
        assert!(BrandPlan::Growth.allows_tuning());
        assert!(BrandPlan::Scale.allows_tuning());
    }

    #[test]
    fn out_of_range_voice_scale_fails_validation() {
        let mut tuning = fixture_tuning();
        tuning.voice_scale = 1.2;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn custom_weights_are_clamped_not_rejected() {
        let mut tuning = fixture_tuning();
        tuning.custom_weights.insert("novelty".to_string(), 3.5);
        tuning.custom_weights.insert("warmth".to_string(), -0.2);
        let clamped = tuning.clamped();
        assert!((clamped.custom_weights["novelty"] - 1.0).abs() < 1e-12);
        assert!((clamped.custom_weights["warmth"] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn cta_change_implies_conversion_elements() {
        let before = fixture_tuning();
        let mut after = before.clone();
        after.cta_style = CtaStyle::Hard;

        let diff = tuning_diff(Some(&before), &after);
        assert_eq!(diff.changes, vec!["cta_style".to_string()]);
        assert!(diff.impact_areas.contains("conversion_elements"));
        assert_eq!(diff.impact_areas.len(), 1);
    }

    #[test]
    fn first_tuning_touches_every_dial() {
        let diff = tuning_diff(None, &fixture_tuning());
        assert_eq!(diff.changes.len(), 3);
        assert!(diff.impact_areas.contains("brand_voice"));
        assert!(diff.impact_areas.contains("market_positioning"));
        // No custom weights supplied, so scoring weights are untouched.
        assert!(!diff.impact_areas.contains("scoring_weights"));
    }

    #[test]
    fn identical_tuning_produces_empty_diff() {
        let tuning = fixture_tuning();
        let diff = tuning_diff(Some(&tuning), &tuning);
        assert!(diff.changes.is_empty());
        assert!(diff.impact_areas.is_empty());
    }
}
