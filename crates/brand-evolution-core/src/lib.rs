pub mod evolution;
pub mod metrics;
pub mod model;
pub mod pattern;
pub mod tone;
pub mod tuning;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EvolutionError {
    #[error("metric undefined: {metric} has a zero denominator")]
    MetricUndefined { metric: &'static str },
    #[error("no tone fingerprint derived for brand {brand_id}")]
    FingerprintMissing { brand_id: BrandId },
    #[error("plan {plan} is not eligible for pattern tuning")]
    PlanIneligible { plan: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("concurrent update conflict for brand {brand_id}")]
    ConcurrentUpdateConflict { brand_id: BrandId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BrandId(pub Ulid);

impl BrandId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BrandId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BrandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VariantId(pub Ulid);

impl VariantId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for VariantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for VariantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`EvolutionError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, EvolutionError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| EvolutionError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(EvolutionError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`EvolutionError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, EvolutionError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            EvolutionError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

pub(crate) fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_utc_timestamps() {
        let result = parse_rfc3339_utc("2026-08-28T12:00:00+02:00");
        assert!(result.is_err());
    }

    #[test]
    fn roundtrips_utc_timestamps() {
        let parsed = match parse_rfc3339_utc("2026-08-28T12:00:00Z") {
            Ok(value) => value,
            Err(err) => panic!("expected valid timestamp: {err}"),
        };
        let formatted = match format_rfc3339(parsed) {
            Ok(value) => value,
            Err(err) => panic!("expected formattable timestamp: {err}"),
        };
        assert_eq!(formatted, "2026-08-28T12:00:00Z");
    }
}
