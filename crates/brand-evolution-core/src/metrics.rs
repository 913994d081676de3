//! Metric normalization: raw performance counters into derived ratios and
//! a unitless success score measured against fixed benchmarks.

use serde::{Deserialize, Serialize};

use crate::{clamp, EvolutionError, VariantId};

/// Raw counters for one content variant over one observation window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSample {
    pub variant_id: VariantId,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub spend: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DerivedMetrics {
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub return_on_spend: f64,
}

/// Fixed reference benchmarks and sub-score weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricBenchmarks {
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub return_on_spend: f64,
    pub click_weight: f64,
    pub conversion_weight: f64,
    pub return_weight: f64,
}

impl MetricBenchmarks {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            click_rate: 0.02,
            conversion_rate: 0.03,
            return_on_spend: 2.0,
            click_weight: 0.3,
            conversion_weight: 0.4,
            return_weight: 0.3,
        }
    }

    /// Validates benchmark thresholds and weights.
    ///
    /// # Errors
    /// Returns [`EvolutionError::Configuration`] when a threshold is not
    /// positive or the weights do not sum to 1.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        for (name, value) in [
            ("click_rate", self.click_rate),
            ("conversion_rate", self.conversion_rate),
            ("return_on_spend", self.return_on_spend),
        ] {
            if value <= 0.0 {
                return Err(EvolutionError::Configuration(format!(
                    "{name} benchmark MUST be positive"
                )));
            }
        }

        let weight_sum = self.click_weight + self.conversion_weight + self.return_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(EvolutionError::Configuration(
                "sub-score weights MUST sum to 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

impl PerformanceSample {
    /// Computes click-rate, conversion-rate, and return-on-spend.
    ///
    /// # Errors
    /// Returns [`EvolutionError::MetricUndefined`] for any zero denominator.
    /// Callers must treat an undefined metric as insufficient data, never
    /// substitute zero.
    pub fn derive(&self) -> Result<DerivedMetrics, EvolutionError> {
        Ok(DerivedMetrics {
            click_rate: ratio(self.clicks, self.impressions, "click_rate")?,
            conversion_rate: ratio(self.conversions, self.clicks, "conversion_rate")?,
            return_on_spend: money_ratio(self.revenue, self.spend, "return_on_spend")?,
        })
    }
}

impl DerivedMetrics {
    /// Weighted success score in `[0, 2]`: each sub-score is the metric's
    /// ratio to its benchmark capped at 2x.
    #[must_use]
    pub fn success_score(&self, benchmarks: &MetricBenchmarks) -> f64 {
        let click = sub_score(self.click_rate, benchmarks.click_rate);
        let conversion = sub_score(self.conversion_rate, benchmarks.conversion_rate);
        let roi = sub_score(self.return_on_spend, benchmarks.return_on_spend);

        benchmarks.click_weight * click
            + benchmarks.conversion_weight * conversion
            + benchmarks.return_weight * roi
    }
}

/// Derives metrics and scores them in one step.
///
/// # Errors
/// Returns [`EvolutionError::MetricUndefined`] when any ratio has a zero
/// denominator.
pub fn success_score(
    sample: &PerformanceSample,
    benchmarks: &MetricBenchmarks,
) -> Result<f64, EvolutionError> {
    Ok(sample.derive()?.success_score(benchmarks))
}

fn sub_score(actual: f64, benchmark: f64) -> f64 {
    clamp(actual / benchmark, 0.0, 2.0)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64, metric: &'static str) -> Result<f64, EvolutionError> {
    if denominator == 0 {
        return Err(EvolutionError::MetricUndefined { metric });
    }
    Ok(numerator as f64 / denominator as f64)
}

fn money_ratio(numerator: f64, denominator: f64, metric: &'static str) -> Result<f64, EvolutionError> {
    if denominator == 0.0 {
        return Err(EvolutionError::MetricUndefined { metric });
    }
    Ok(numerator / denominator)
}
