//! Tone Guard: scoring new content against a brand's derived tone
//! fingerprint to catch voice drift before publication.
//!
//! The fingerprint itself is a derived artifact produced by an external
//! analysis capability; this module only consumes it. Voice trait
//! measurement is behind [`VoiceTraitEstimator`] so hosts can plug in
//! their own text scoring.

use serde::{Deserialize, Serialize};

use crate::{clamp, Severity};

/// Weight of each analysis dimension in the overall match.
const ADHERENCE_WEIGHT: f64 = 0.4;
const EMOTIONAL_WEIGHT: f64 = 0.3;
const PHRASING_WEIGHT: f64 = 0.3;

/// Minimum overall weighted match for content to pass as on-brand.
pub const MATCH_THRESHOLD: f64 = 0.7;

/// Sub-scores below this raise an issue; below [`HIGH_SEVERITY_BELOW`]
/// the issue is high severity.
const ISSUE_BELOW: f64 = 0.7;
const HIGH_SEVERITY_BELOW: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VoiceTraits {
    pub formality: f64,
    pub emotion: f64,
    pub technical: f64,
    pub persuasive: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SentenceLength {
    Short,
    Medium,
    Long,
}

impl SentenceLength {
    /// Target average sentence length in words.
    #[must_use]
    pub fn target_words(self) -> f64 {
        match self {
            Self::Short => 15.0,
            Self::Medium => 25.0,
            Self::Long => 35.0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StylePreferences {
    pub sentence_length: SentenceLength,
    pub paragraph_structure: String,
    pub rhetorical_devices: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionalMarkers {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub neutral: Vec<String>,
}

impl EmotionalMarkers {
    fn all(&self) -> impl Iterator<Item = &String> {
        self.positive
            .iter()
            .chain(self.negative.iter())
            .chain(self.neutral.iter())
    }
}

/// The derived summary of a brand's target voice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneFingerprint {
    pub voice_characteristics: VoiceTraits,
    pub key_phrases: Vec<String>,
    pub avoided_terms: Vec<String>,
    pub emotional_markers: EmotionalMarkers,
    pub style_preferences: StylePreferences,
}

/// Pluggable text-trait measurement; returns each trait in `[0, 1]`.
pub trait VoiceTraitEstimator {
    fn estimate(&self, content: &str) -> VoiceTraits;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneIssue {
    pub dimension: String,
    pub severity: Severity,
    pub description: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneAnalysis {
    pub tone_adherence: f64,
    pub emotional_alignment: f64,
    pub phrasing_consistency: f64,
    pub overall_match: f64,
    pub matches_brand: bool,
    pub issues: Vec<ToneIssue>,
}

impl ToneAnalysis {
    #[must_use]
    pub fn has_high_severity_issue(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::High)
    }
}

/// Scores `content` against the fingerprint.
#[must_use]
pub fn analyze(
    fingerprint: &ToneFingerprint,
    content: &str,
    estimator: &dyn VoiceTraitEstimator,
) -> ToneAnalysis {
    let measured = estimator.estimate(content);
    let tone_adherence = adherence(&fingerprint.voice_characteristics, &measured);
    let emotional_alignment = marker_alignment(fingerprint, content);
    let phrasing_consistency = phrasing(fingerprint, content);

    let overall_match = ADHERENCE_WEIGHT * tone_adherence
        + EMOTIONAL_WEIGHT * emotional_alignment
        + PHRASING_WEIGHT * phrasing_consistency;
    let matches_brand = overall_match >= MATCH_THRESHOLD;

    let mut issues = Vec::new();
    push_issue(
        &mut issues,
        "tone_adherence",
        tone_adherence,
        "measured voice traits drift from the brand's target voice",
        "adjust formality, emotion, or technical depth toward the fingerprint targets",
    );
    push_issue(
        &mut issues,
        "emotional_alignment",
        emotional_alignment,
        "content is missing the brand's emotional marker vocabulary",
        "work the brand's positive, negative, or neutral marker terms into the copy",
    );
    push_issue(
        &mut issues,
        "phrasing_consistency",
        phrasing_consistency,
        "key phrases, avoided terms, or sentence rhythm deviate from brand style",
        "reuse key phrases, drop avoided terms, and match the preferred sentence length",
    );

    ToneAnalysis {
        tone_adherence,
        emotional_alignment,
        phrasing_consistency,
        overall_match,
        matches_brand,
        issues,
    }
}

fn push_issue(
    issues: &mut Vec<ToneIssue>,
    dimension: &str,
    score: f64,
    description: &str,
    suggestion: &str,
) {
    if score >= ISSUE_BELOW {
        return;
    }
    let severity = if score < HIGH_SEVERITY_BELOW {
        Severity::High
    } else {
        Severity::Medium
    };
    issues.push(ToneIssue {
        dimension: dimension.to_string(),
        severity,
        description: description.to_string(),
        suggestion: suggestion.to_string(),
    });
}

fn adherence(target: &VoiceTraits, measured: &VoiceTraits) -> f64 {
    let pairs = [
        (target.formality, measured.formality),
        (target.emotion, measured.emotion),
        (target.technical, measured.technical),
        (target.persuasive, measured.persuasive),
    ];
    let sum: f64 = pairs
        .iter()
        .map(|(want, got)| 1.0 - (want - got).abs())
        .sum();
    clamp(sum / 4.0, 0.0, 1.0)
}

fn marker_alignment(fingerprint: &ToneFingerprint, content: &str) -> f64 {
    let lowered = content.to_lowercase();
    let markers: Vec<&String> = fingerprint.emotional_markers.all().collect();
    presence_fraction(&markers, &lowered)
}

fn phrasing(fingerprint: &ToneFingerprint, content: &str) -> f64 {
    let lowered = content.to_lowercase();

    let key_phrases: Vec<&String> = fingerprint.key_phrases.iter().collect();
    let key_score = presence_fraction(&key_phrases, &lowered);

    let avoided: Vec<&String> = fingerprint.avoided_terms.iter().collect();
    let avoided_score = if avoided.is_empty() {
        1.0
    } else {
        1.0 - presence_fraction(&avoided, &lowered)
    };

    let target = fingerprint.style_preferences.sentence_length.target_words();
    let average = average_sentence_words(content);
    let length_score = (1.0 - (average - target).abs() / target).max(0.0);

    (key_score + avoided_score + length_score) / 3.0
}

/// Fraction of terms literally present, case-insensitive. An empty term
/// set has nothing to violate and scores 1.
fn presence_fraction(terms: &[&String], lowered_content: &str) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let hits = terms
        .iter()
        .filter(|term| lowered_content.contains(&term.to_lowercase()))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        hits as f64 / terms.len() as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn average_sentence_words(content: &str) -> f64 {
    let sentences: Vec<&str> = content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let words: usize = sentences
        .iter()
        .map(|sentence| sentence.split_whitespace().count())
        .sum();
    words as f64 / sentences.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEstimator(VoiceTraits);

    impl VoiceTraitEstimator for FixedEstimator {
        fn estimate(&self, _content: &str) -> VoiceTraits {
            self.0
        }
    }

    fn fixture_fingerprint() -> ToneFingerprint {
        ToneFingerprint {
            voice_characteristics: VoiceTraits {
                formality: 0.8,
                emotion: 0.3,
                technical: 0.6,
                persuasive: 0.7,
            },
            key_phrases: vec!["built to last".to_string(), "crafted daily".to_string()],
            avoided_terms: vec!["cheap".to_string()],
            emotional_markers: EmotionalMarkers {
                positive: vec!["reliable".to_string()],
                negative: vec![],
                neutral: vec!["everyday".to_string()],
            },
            style_preferences: StylePreferences {
                sentence_length: SentenceLength::Short,
                paragraph_structure: "single".to_string(),
                rhetorical_devices: vec![],
            },
        }
    }

    #[test]
    fn perfect_phrasing_scores_one() {
        // Every key phrase present, no avoided terms, and both sentences
        // average exactly the 15-word short target.
        let content = "This product is built to last through every season you can imagine out there again. \
                       Crafted daily by people who sweat the small details in every single piece made here.";
        let fingerprint = fixture_fingerprint();
        assert!((average_sentence_words(content) - 15.0).abs() < 1e-12);
        let score = phrasing(&fingerprint, content);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn avoided_terms_pull_phrasing_down() {
        let fingerprint = fixture_fingerprint();
        let clean = phrasing(&fingerprint, "Built to last. Crafted daily.");
        let dirty = phrasing(&fingerprint, "Built to last. Crafted daily. Cheap too.");
        assert!(dirty < clean);
    }

    #[test]
    fn marker_alignment_is_case_insensitive() {
        let fingerprint = fixture_fingerprint();
        let score = marker_alignment(&fingerprint, "RELIABLE gear for EVERYDAY use");
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn matching_traits_give_full_adherence() {
        let fingerprint = fixture_fingerprint();
        let estimator = FixedEstimator(fingerprint.voice_characteristics);
        let analysis = analyze(&fingerprint, "reliable everyday gear", &estimator);
        assert!((analysis.tone_adherence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn opposite_traits_raise_a_high_severity_issue() {
        let fingerprint = fixture_fingerprint();
        let estimator = FixedEstimator(VoiceTraits {
            formality: 0.0,
            emotion: 1.0,
            technical: 0.0,
            persuasive: 0.0,
        });
        let analysis = analyze(&fingerprint, "totally different vibes here", &estimator);
        assert!(!analysis.matches_brand);
        assert!(analysis.has_high_severity_issue());
        assert!(analysis
            .issues
            .iter()
            .any(|issue| issue.dimension == "tone_adherence"));
    }

    #[test]
    fn on_brand_content_passes_the_gate() {
        let fingerprint = fixture_fingerprint();
        let estimator = FixedEstimator(fingerprint.voice_characteristics);
        let content = "Reliable gear built to last for everyday adventures big and small alike always. \
                       Crafted daily with care so your everyday carry stays reliable trip after trip.";
        let analysis = analyze(&fingerprint, content, &estimator);
        assert!(analysis.overall_match >= MATCH_THRESHOLD);
        assert!(analysis.matches_brand);
        assert!(analysis.issues.is_empty());
    }

    #[test]
    fn empty_content_has_zero_sentence_average() {
        assert!((average_sentence_words("") - 0.0).abs() < 1e-12);
        assert!((average_sentence_words("   ") - 0.0).abs() < 1e-12);
    }
}
