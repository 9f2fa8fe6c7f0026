//! Interpretation Ladder
//!
//! Classifies one interval's scores into alignment state, confidence level
//! and dominant bias, then attaches a narrative, key factors and warnings.
//! Pure: the result depends only on the scores and the resolved config.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::ThresholdConfig;
use super::gates::{Gate, GateChecks};
use super::scores::{RawIntervalScores, WaveNumber};

/// Multi-timeframe structural agreement tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignmentState {
    Strong,
    Moderate,
    Weak,
    Disaligned,
}

impl AlignmentState {
    /// Best tier first
    pub const ALL: [AlignmentState; 4] = [Self::Strong, Self::Moderate, Self::Weak, Self::Disaligned];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strong => "STRONG",
            Self::Moderate => "MODERATE",
            Self::Weak => "WEAK",
            Self::Disaligned => "DISALIGNED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DominantBias {
    Continuation,
    Exhaustion,
    Neutral,
}

impl DominantBias {
    pub const ALL: [DominantBias; 3] = [Self::Continuation, Self::Exhaustion, Self::Neutral];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuation => "CONTINUATION",
            Self::Exhaustion => "EXHAUSTION",
            Self::Neutral => "NEUTRAL",
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),*) => {
        $(impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(AlignmentState, ConfidenceLevel, DominantBias);

/// Labels reported in `key_factors`, in candidate order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyFactor {
    #[serde(rename = "Wave 3 impulse confirmed")]
    Wave3Confirmed,
    #[serde(rename = "Wave 5 extension detected")]
    Wave5Extension,
    #[serde(rename = "Multi-timeframe stack aligned")]
    StackAligned,
    #[serde(rename = "Higher timeframe misalignment")]
    StackMisaligned,
    #[serde(rename = "Momentum expanding")]
    MomentumExpanding,
    #[serde(rename = "Volatility contracting")]
    VolatilityContracting,
    #[serde(rename = "Divergence forming")]
    DivergenceForming,
}

impl KeyFactor {
    pub fn label(self) -> &'static str {
        match self {
            Self::Wave3Confirmed => "Wave 3 impulse confirmed",
            Self::Wave5Extension => "Wave 5 extension detected",
            Self::StackAligned => "Multi-timeframe stack aligned",
            Self::StackMisaligned => "Higher timeframe misalignment",
            Self::MomentumExpanding => "Momentum expanding",
            Self::VolatilityContracting => "Volatility contracting",
            Self::DivergenceForming => "Divergence forming",
        }
    }

    /// The stack labels are mutually exclusive
    fn excludes(self, other: KeyFactor) -> bool {
        matches!(
            (self, other),
            (Self::StackAligned, Self::StackMisaligned) | (Self::StackMisaligned, Self::StackAligned)
        )
    }
}

pub const MAX_KEY_FACTORS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Warning {
    #[serde(rename = "Divergence increasing against price highs")]
    DivergenceIncreasing,
    #[serde(rename = "Lower timeframe strength lacks higher timeframe confirmation")]
    UnconfirmedStrength,
    #[serde(rename = "Volatility contraction during Wave 5")]
    Wave5VolatilityContraction,
}

impl Warning {
    pub fn label(self) -> &'static str {
        match self {
            Self::DivergenceIncreasing => "Divergence increasing against price highs",
            Self::UnconfirmedStrength => {
                "Lower timeframe strength lacks higher timeframe confirmation"
            }
            Self::Wave5VolatilityContraction => "Volatility contraction during Wave 5",
        }
    }
}

const NARRATIVE_CONTINUATION_STRONG: &str =
    "Multi-timeframe structure is aligned in Wave 3 with expanding momentum and volatility.";
const NARRATIVE_CONTINUATION_MODERATE: &str =
    "Wave 3 structure with moderate alignment and momentum support.";
const NARRATIVE_EXHAUSTION_MODERATE: &str =
    "Wave 5 structure with rising divergence suggests increasing exhaustion risk despite trend continuation.";
const NARRATIVE_EXHAUSTION_STRONG: &str =
    "Wave 5 extension with strong alignment; divergence and volatility warrant caution.";
const NARRATIVE_MIXED: &str =
    "Market structure is mixed with limited timeframe agreement and muted momentum.";
/// Returned for any pair missing from [`NARRATIVE_TABLE`]
pub const NARRATIVE_FALLBACK: &str = "Conditions are mixed; alignment and bias are inconclusive.";

/// Narrative keyed by (bias, alignment)
pub const NARRATIVE_TABLE: [(DominantBias, AlignmentState, &str); 12] = [
    (DominantBias::Continuation, AlignmentState::Strong, NARRATIVE_CONTINUATION_STRONG),
    (DominantBias::Continuation, AlignmentState::Moderate, NARRATIVE_CONTINUATION_MODERATE),
    (DominantBias::Continuation, AlignmentState::Weak, NARRATIVE_MIXED),
    (DominantBias::Continuation, AlignmentState::Disaligned, NARRATIVE_MIXED),
    (DominantBias::Exhaustion, AlignmentState::Strong, NARRATIVE_EXHAUSTION_STRONG),
    (DominantBias::Exhaustion, AlignmentState::Moderate, NARRATIVE_EXHAUSTION_MODERATE),
    (DominantBias::Exhaustion, AlignmentState::Weak, NARRATIVE_MIXED),
    (DominantBias::Exhaustion, AlignmentState::Disaligned, NARRATIVE_MIXED),
    (DominantBias::Neutral, AlignmentState::Strong, NARRATIVE_MIXED),
    (DominantBias::Neutral, AlignmentState::Moderate, NARRATIVE_MIXED),
    (DominantBias::Neutral, AlignmentState::Weak, NARRATIVE_MIXED),
    (DominantBias::Neutral, AlignmentState::Disaligned, NARRATIVE_MIXED),
];

pub fn narrative(bias: DominantBias, alignment: AlignmentState) -> &'static str {
    NARRATIVE_TABLE
        .iter()
        .find(|(b, a, _)| *b == bias && *a == alignment)
        .map(|(_, _, text)| *text)
        .unwrap_or(NARRATIVE_FALLBACK)
}

/// Derived reading of one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInterpretation {
    pub alignment_state: AlignmentState,
    pub dominant_bias: DominantBias,
    pub confidence_level: ConfidenceLevel,
    pub narrative_summary: String,
    pub key_factors: Vec<KeyFactor>,
    pub warnings: Vec<Warning>,
    pub stack_aligned: bool,
}

impl MarketInterpretation {
    pub fn has_warning(&self, warning: Warning) -> bool {
        self.warnings.contains(&warning)
    }
}

pub fn alignment_state(checks: &GateChecks) -> AlignmentState {
    if checks.passed(Gate::AlignmentStrong) {
        AlignmentState::Strong
    } else if checks.passed(Gate::AlignmentModerate) {
        AlignmentState::Moderate
    } else if checks.passed(Gate::AlignmentWeak) {
        AlignmentState::Weak
    } else {
        AlignmentState::Disaligned
    }
}

/// HIGH needs both stack and alignment; MEDIUM needs only the stack
pub fn confidence_level(checks: &GateChecks) -> ConfidenceLevel {
    if checks.all_passed(&Gate::HIGH_CONFIDENCE) {
        ConfidenceLevel::High
    } else if checks.passed(Gate::MediumConfidenceStack) {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// First match wins: CONTINUATION, then EXHAUSTION, else NEUTRAL
pub fn dominant_bias(checks: &GateChecks) -> DominantBias {
    if checks.all_passed(&Gate::CONTINUATION) {
        DominantBias::Continuation
    } else if checks.all_passed(&Gate::EXHAUSTION) {
        DominantBias::Exhaustion
    } else {
        DominantBias::Neutral
    }
}

pub fn key_factors(scores: &RawIntervalScores, config: &ThresholdConfig) -> Vec<KeyFactor> {
    let wave3 = scores.wave3_probability.unwrap_or(0.0);
    let wave5 = scores.wave5_exhaustion_probability.unwrap_or(0.0);
    let stack = scores.stack();
    let momentum = scores.momentum_strength_score.unwrap_or(0.0);
    let volatility = scores.volatility_regime_score.unwrap_or(0.0);
    // Unlike the bias ladder, missing divergence health reports no risk here
    let div_risk = scores.divergence_score.map_or(0.0, |d| 1.0 - d);

    let candidates = [
        (
            KeyFactor::Wave3Confirmed,
            wave3,
            wave3 >= config.bias_cont_wave3 && scores.is_wave(WaveNumber::Three),
        ),
        (
            KeyFactor::Wave5Extension,
            wave5,
            wave5 >= config.bias_exh_wave5 && scores.is_wave(WaveNumber::Five),
        ),
        (KeyFactor::StackAligned, stack, stack >= config.stack_aligned),
        (
            KeyFactor::StackMisaligned,
            1.0 - stack,
            stack < config.stack_aligned && 1.0 - stack >= config.key_factor_misalign,
        ),
        (
            KeyFactor::MomentumExpanding,
            momentum,
            momentum >= config.key_factor_momentum,
        ),
        (
            KeyFactor::VolatilityContracting,
            volatility,
            volatility >= config.key_factor_vol,
        ),
        (
            KeyFactor::DivergenceForming,
            div_risk,
            div_risk >= config.key_factor_div_risk,
        ),
    ];

    let mut out: Vec<KeyFactor> = Vec::with_capacity(MAX_KEY_FACTORS);
    for (factor, score, gated) in candidates {
        if !gated || score < config.key_factor_relevance {
            continue;
        }
        if out.iter().any(|f| *f == factor || f.excludes(factor)) {
            continue;
        }
        out.push(factor);
    }
    out.truncate(MAX_KEY_FACTORS);
    out
}

pub fn warnings(
    scores: &RawIntervalScores,
    alignment: AlignmentState,
    confidence: ConfidenceLevel,
    config: &ThresholdConfig,
) -> Vec<Warning> {
    let mut out = Vec::new();
    // Missing health or volatility raises no warning
    if scores.divergence_score.unwrap_or(1.0) <= config.warn_divergence_max {
        out.push(Warning::DivergenceIncreasing);
    }
    if alignment == AlignmentState::Strong && confidence == ConfidenceLevel::Low {
        out.push(Warning::UnconfirmedStrength);
    }
    if scores.is_wave(WaveNumber::Five)
        && scores.volatility_regime_score.unwrap_or(1.0) < config.warn_vol_wave5_min
    {
        out.push(Warning::Wave5VolatilityContraction);
    }
    out
}

/// Classify one interval under an already-resolved config
pub fn interpret(scores: &RawIntervalScores, config: &ThresholdConfig) -> MarketInterpretation {
    let checks = GateChecks::evaluate(scores, config);
    interpret_with_checks(scores, &checks, config)
}

pub(crate) fn interpret_with_checks(
    scores: &RawIntervalScores,
    checks: &GateChecks,
    config: &ThresholdConfig,
) -> MarketInterpretation {
    let alignment = alignment_state(checks);
    let confidence = confidence_level(checks);
    let bias = dominant_bias(checks);

    MarketInterpretation {
        alignment_state: alignment,
        dominant_bias: bias,
        confidence_level: confidence,
        narrative_summary: narrative(bias, alignment).to_string(),
        key_factors: key_factors(scores, config),
        warnings: warnings(scores, alignment, confidence, config),
        stack_aligned: scores.stack() >= config.stack_aligned,
    }
}

/// Classify a batch in parallel, preserving input order
pub fn interpret_all(
    scores: &[RawIntervalScores],
    config: &ThresholdConfig,
) -> Vec<MarketInterpretation> {
    scores.par_iter().map(|s| interpret(s, config)).collect()
}
