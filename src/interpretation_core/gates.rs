//! Threshold gate evaluation
//!
//! Every comparison the three ladders make is evaluated here exactly once
//! per interval. The ladder derives its classification from these checks,
//! and the per-bar breakdown and population gating analysis derive their
//! "fired" / "blocked by" text from the same checks, so neither can drift
//! from the thresholds actually applied.

use serde::{Deserialize, Serialize};

use super::config::ThresholdConfig;
use super::scores::{RawIntervalScores, WaveNumber};

/// One of the three classification dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    AlignmentState,
    ConfidenceLevel,
    DominantBias,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Self::AlignmentState,
        Self::ConfidenceLevel,
        Self::DominantBias,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AlignmentState => "alignment_state",
            Self::ConfidenceLevel => "confidence_level",
            Self::DominantBias => "dominant_bias",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single threshold comparison used by one of the ladders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    AlignmentStrong,
    AlignmentModerate,
    AlignmentWeak,
    HighConfidenceStack,
    HighConfidenceAlignment,
    MediumConfidenceStack,
    ContinuationWave3,
    ContinuationWaveNumber,
    ContinuationMomentum,
    ExhaustionWave5,
    ExhaustionWaveNumber,
    ExhaustionDivergenceRisk,
}

impl Gate {
    pub const ALL: [Gate; 12] = [
        Self::AlignmentStrong,
        Self::AlignmentModerate,
        Self::AlignmentWeak,
        Self::HighConfidenceStack,
        Self::HighConfidenceAlignment,
        Self::MediumConfidenceStack,
        Self::ContinuationWave3,
        Self::ContinuationWaveNumber,
        Self::ContinuationMomentum,
        Self::ExhaustionWave5,
        Self::ExhaustionWaveNumber,
        Self::ExhaustionDivergenceRisk,
    ];

    /// Gates that must all pass for HIGH confidence
    pub const HIGH_CONFIDENCE: [Gate; 2] =
        [Self::HighConfidenceStack, Self::HighConfidenceAlignment];

    /// Gates that must all pass for CONTINUATION
    pub const CONTINUATION: [Gate; 3] = [
        Self::ContinuationWave3,
        Self::ContinuationWaveNumber,
        Self::ContinuationMomentum,
    ];

    /// Gates that must all pass for EXHAUSTION
    pub const EXHAUSTION: [Gate; 3] = [
        Self::ExhaustionWave5,
        Self::ExhaustionWaveNumber,
        Self::ExhaustionDivergenceRisk,
    ];

    pub fn dimension(self) -> Dimension {
        match self {
            Self::AlignmentStrong | Self::AlignmentModerate | Self::AlignmentWeak => {
                Dimension::AlignmentState
            }
            Self::HighConfidenceStack
            | Self::HighConfidenceAlignment
            | Self::MediumConfidenceStack => Dimension::ConfidenceLevel,
            _ => Dimension::DominantBias,
        }
    }

    /// Classification this gate guards, as shown in "blocked by" text
    pub fn target(self) -> &'static str {
        match self {
            Self::AlignmentStrong => "STRONG alignment",
            Self::AlignmentModerate => "MODERATE alignment",
            Self::AlignmentWeak => "WEAK alignment",
            Self::HighConfidenceStack | Self::HighConfidenceAlignment => "HIGH confidence",
            Self::MediumConfidenceStack => "MEDIUM confidence",
            Self::ContinuationWave3 | Self::ContinuationWaveNumber | Self::ContinuationMomentum => {
                "CONTINUATION"
            }
            Self::ExhaustionWave5 | Self::ExhaustionWaveNumber | Self::ExhaustionDivergenceRisk => {
                "EXHAUSTION"
            }
        }
    }

    /// Field name the gate compares
    pub fn field(self) -> &'static str {
        match self {
            Self::AlignmentStrong
            | Self::AlignmentModerate
            | Self::AlignmentWeak
            | Self::HighConfidenceAlignment => "alignment_score",
            Self::HighConfidenceStack | Self::MediumConfidenceStack => "multi_tf_stack_score",
            Self::ContinuationWave3 => "wave3_probability",
            Self::ContinuationWaveNumber | Self::ExhaustionWaveNumber => "wave_number",
            Self::ContinuationMomentum => "momentum_strength_score",
            Self::ExhaustionWave5 => "wave5_exhaustion_probability",
            Self::ExhaustionDivergenceRisk => "divergence_risk",
        }
    }
}

/// Result of evaluating one gate against one interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateCheck {
    pub gate: Gate,
    pub dimension: Dimension,
    /// Threshold compared against; `None` for wave-number equality gates
    pub threshold: Option<f64>,
    pub passed: bool,
}

impl GateCheck {
    /// The failing condition as text, e.g. `alignment_score < 0.75`
    pub fn blocked_label(&self) -> String {
        match (self.gate, self.threshold) {
            (Gate::ContinuationWaveNumber, _) => "wave_number ≠ 3".to_string(),
            (Gate::ExhaustionWaveNumber, _) => "wave_number ≠ 5".to_string(),
            (gate, Some(t)) => format!("{} < {}", gate.field(), t),
            (gate, None) => format!("{} not met", gate.field()),
        }
    }

    /// Full blocker sentence, e.g. `STRONG alignment blocked by alignment_score < 0.75`
    pub fn blocked_rule(&self) -> String {
        format!("{} blocked by {}", self.gate.target(), self.blocked_label())
    }
}

/// All gate checks for one interval under one config
#[derive(Debug, Clone, PartialEq)]
pub struct GateChecks {
    checks: [GateCheck; 12],
}

impl GateChecks {
    pub fn evaluate(scores: &RawIntervalScores, config: &ThresholdConfig) -> Self {
        let alignment = scores.alignment();
        let stack = scores.stack();
        let wave3 = scores.wave3_probability.unwrap_or(0.0);
        let wave5 = scores.wave5_exhaustion_probability.unwrap_or(0.0);
        let momentum = scores.momentum_strength_score.unwrap_or(0.0);
        let div_risk = scores.divergence_risk();

        let checks = Gate::ALL.map(|gate| {
            let (threshold, passed) = match gate {
                Gate::AlignmentStrong => at_least(alignment, config.alignment_strong),
                Gate::AlignmentModerate => at_least(alignment, config.alignment_moderate),
                Gate::AlignmentWeak => at_least(alignment, config.alignment_weak),
                Gate::HighConfidenceStack => at_least(stack, config.conf_high_stack),
                Gate::HighConfidenceAlignment => at_least(alignment, config.conf_high_align),
                Gate::MediumConfidenceStack => at_least(stack, config.conf_medium_stack),
                Gate::ContinuationWave3 => at_least(wave3, config.bias_cont_wave3),
                Gate::ContinuationWaveNumber => (None, scores.is_wave(WaveNumber::Three)),
                Gate::ContinuationMomentum => at_least(momentum, config.bias_cont_momentum),
                Gate::ExhaustionWave5 => at_least(wave5, config.bias_exh_wave5),
                Gate::ExhaustionWaveNumber => (None, scores.is_wave(WaveNumber::Five)),
                Gate::ExhaustionDivergenceRisk => at_least(div_risk, config.bias_exh_div_risk),
            };
            GateCheck {
                gate,
                dimension: gate.dimension(),
                threshold,
                passed,
            }
        });

        Self { checks }
    }

    pub fn get(&self, gate: Gate) -> &GateCheck {
        // checks are laid out in declaration order
        &self.checks[gate as usize]
    }

    pub fn passed(&self, gate: Gate) -> bool {
        self.get(gate).passed
    }

    pub fn all_passed(&self, gates: &[Gate]) -> bool {
        gates.iter().all(|g| self.passed(*g))
    }

    /// Failing checks among `gates`, in the order given
    pub fn failed<'a>(&'a self, gates: &'a [Gate]) -> impl Iterator<Item = &'a GateCheck> + 'a {
        gates.iter().map(|g| self.get(*g)).filter(|c| !c.passed)
    }

    pub fn threshold(&self, gate: Gate) -> f64 {
        self.get(gate).threshold.unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter()
    }
}

fn at_least(value: f64, threshold: f64) -> (Option<f64>, bool) {
    (Some(threshold), value >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> RawIntervalScores {
        RawIntervalScores {
            alignment_score: Some(0.7),
            wave3_probability: Some(0.5),
            momentum_strength_score: Some(0.9),
            multi_tf_stack_score: Some(0.3),
            wave_number: Some(WaveNumber::Four),
            ..Default::default()
        }
    }

    #[test]
    fn test_gate_checks_follow_config() {
        let config = ThresholdConfig::default();
        let checks = GateChecks::evaluate(&scores(), &config);

        assert!(!checks.passed(Gate::AlignmentStrong));
        assert!(checks.passed(Gate::AlignmentModerate));
        assert!(checks.passed(Gate::HighConfidenceAlignment));
        assert!(!checks.passed(Gate::HighConfidenceStack));
        assert!(!checks.passed(Gate::MediumConfidenceStack));
        assert!(!checks.passed(Gate::ContinuationWaveNumber));
        assert!(checks.passed(Gate::ContinuationMomentum));
        // Missing divergence health is maximal risk
        assert!(checks.passed(Gate::ExhaustionDivergenceRisk));
        assert_eq!(checks.threshold(Gate::AlignmentStrong), 0.75);
    }

    #[test]
    fn test_blocked_labels_use_resolved_thresholds() {
        let config = ThresholdConfig {
            bias_cont_wave3: 0.66,
            ..Default::default()
        };
        let checks = GateChecks::evaluate(&scores(), &config);
        let labels: Vec<String> = checks
            .failed(&Gate::CONTINUATION)
            .map(|c| c.blocked_label())
            .collect();
        assert_eq!(labels, vec!["wave3_probability < 0.66", "wave_number ≠ 3"]);
        assert_eq!(
            checks.get(Gate::AlignmentStrong).blocked_rule(),
            "STRONG alignment blocked by alignment_score < 0.75"
        );
    }

    #[test]
    fn test_unknown_wave_never_matches() {
        let scores = RawIntervalScores {
            wave3_probability: Some(1.0),
            momentum_strength_score: Some(1.0),
            ..Default::default()
        };
        let checks = GateChecks::evaluate(&scores, &ThresholdConfig::default());
        assert!(!checks.passed(Gate::ContinuationWaveNumber));
        assert!(!checks.passed(Gate::ExhaustionWaveNumber));
    }

    #[test]
    fn test_dimensions() {
        for check in GateChecks::evaluate(&scores(), &ThresholdConfig::default()).iter() {
            assert_eq!(check.dimension, check.gate.dimension());
        }
        assert_eq!(Gate::ExhaustionWave5.dimension(), Dimension::DominantBias);
        assert_eq!(Dimension::ConfidenceLevel.name(), "confidence_level");
    }
}
