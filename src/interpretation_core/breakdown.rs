//! Per-bar breakdown: which rules fired and which rules are blocking a
//! better classification. Text is built from the same gate checks the
//! ladder classified with.

use serde::{Deserialize, Serialize};

use super::config::ThresholdConfig;
use super::gates::{Gate, GateChecks};
use super::ladder::{
    alignment_state, confidence_level, dominant_bias, AlignmentState, ConfidenceLevel,
    DominantBias,
};
use super::scores::RawIntervalScores;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedStates {
    pub alignment_state: AlignmentState,
    pub dominant_bias: DominantBias,
    pub confidence_level: ConfidenceLevel,
    pub stack_aligned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarBreakdown {
    #[serde(rename = "rawScores")]
    pub raw_scores: RawIntervalScores,
    pub derived: DerivedStates,
    /// One line per ladder: alignment, confidence, bias
    #[serde(rename = "rulesFired")]
    pub rules_fired: Vec<String>,
    #[serde(rename = "rulesBlocked")]
    pub rules_blocked: Vec<String>,
}

pub fn bar_breakdown(scores: &RawIntervalScores, config: &ThresholdConfig) -> BarBreakdown {
    let checks = GateChecks::evaluate(scores, config);
    let alignment = alignment_state(&checks);
    let confidence = confidence_level(&checks);
    let bias = dominant_bias(&checks);

    let rules_fired = vec![
        alignment_rule(alignment, &checks),
        confidence_rule(confidence, &checks),
        bias_rule(bias, &checks),
    ];

    BarBreakdown {
        raw_scores: scores.clone(),
        derived: DerivedStates {
            alignment_state: alignment,
            dominant_bias: bias,
            confidence_level: confidence,
            stack_aligned: scores.stack() >= config.stack_aligned,
        },
        rules_fired,
        rules_blocked: blocked_rules(&checks, alignment, confidence, bias),
    }
}

fn alignment_rule(state: AlignmentState, checks: &GateChecks) -> String {
    match state {
        AlignmentState::Strong => format!(
            "alignment_score ≥ {} → STRONG",
            checks.threshold(Gate::AlignmentStrong)
        ),
        AlignmentState::Moderate => format!(
            "alignment_score ≥ {} → MODERATE",
            checks.threshold(Gate::AlignmentModerate)
        ),
        AlignmentState::Weak => format!(
            "alignment_score ≥ {} → WEAK",
            checks.threshold(Gate::AlignmentWeak)
        ),
        AlignmentState::Disaligned => format!(
            "alignment_score < {} → DISALIGNED",
            checks.threshold(Gate::AlignmentWeak)
        ),
    }
}

fn confidence_rule(level: ConfidenceLevel, checks: &GateChecks) -> String {
    match level {
        ConfidenceLevel::High => format!(
            "multi_tf_stack_score ≥ {} and alignment_score ≥ {} → HIGH confidence",
            checks.threshold(Gate::HighConfidenceStack),
            checks.threshold(Gate::HighConfidenceAlignment)
        ),
        ConfidenceLevel::Medium => format!(
            "multi_tf_stack_score ≥ {} → MEDIUM confidence",
            checks.threshold(Gate::MediumConfidenceStack)
        ),
        ConfidenceLevel::Low => format!(
            "multi_tf_stack_score < {} → LOW confidence",
            checks.threshold(Gate::MediumConfidenceStack)
        ),
    }
}

fn bias_rule(bias: DominantBias, checks: &GateChecks) -> String {
    match bias {
        DominantBias::Continuation => format!(
            "wave3_prob ≥ {}, wave_number=3, momentum ≥ {} → CONTINUATION",
            checks.threshold(Gate::ContinuationWave3),
            checks.threshold(Gate::ContinuationMomentum)
        ),
        DominantBias::Exhaustion => format!(
            "wave5_exhaustion ≥ {}, wave_number=5, div_risk ≥ {} → EXHAUSTION",
            checks.threshold(Gate::ExhaustionWave5),
            checks.threshold(Gate::ExhaustionDivergenceRisk)
        ),
        DominantBias::Neutral => "CONTINUATION/EXHAUSTION conditions not met → NEUTRAL".to_string(),
    }
}

/// Every failing condition standing between the bar and the next-best tier
/// of each ladder. Bias blockers are reported against CONTINUATION only.
fn blocked_rules(
    checks: &GateChecks,
    alignment: AlignmentState,
    confidence: ConfidenceLevel,
    bias: DominantBias,
) -> Vec<String> {
    let mut gates: Vec<Gate> = Vec::new();
    if alignment != AlignmentState::Strong {
        gates.push(Gate::AlignmentStrong);
    }
    if confidence != ConfidenceLevel::High {
        gates.extend(Gate::HIGH_CONFIDENCE);
    }
    if confidence == ConfidenceLevel::Low {
        gates.push(Gate::MediumConfidenceStack);
    }
    if bias != DominantBias::Continuation {
        gates.extend(Gate::CONTINUATION);
    }
    checks.failed(&gates).map(|c| c.blocked_rule()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation_core::ladder::interpret;
    use crate::interpretation_core::scores::WaveNumber;

    #[test]
    fn test_breakdown_matches_interpretation() {
        let config = ThresholdConfig::default();
        let samples = [
            RawIntervalScores::default(),
            RawIntervalScores {
                alignment_score: Some(0.8),
                multi_tf_stack_score: Some(0.75),
                wave3_probability: Some(0.7),
                wave_number: Some(WaveNumber::Three),
                momentum_strength_score: Some(0.6),
                ..Default::default()
            },
            RawIntervalScores {
                alignment_score: Some(0.6),
                multi_tf_stack_score: Some(0.5),
                wave5_exhaustion_probability: Some(0.8),
                wave_number: Some(WaveNumber::Five),
                divergence_score: Some(0.2),
                ..Default::default()
            },
        ];
        for scores in samples {
            let interp = interpret(&scores, &config);
            let breakdown = bar_breakdown(&scores, &config);
            assert_eq!(breakdown.derived.alignment_state, interp.alignment_state);
            assert_eq!(breakdown.derived.confidence_level, interp.confidence_level);
            assert_eq!(breakdown.derived.dominant_bias, interp.dominant_bias);
            assert_eq!(breakdown.derived.stack_aligned, interp.stack_aligned);
            assert_eq!(breakdown.rules_fired.len(), 3);
        }
    }

    #[test]
    fn test_best_tiers_have_no_blockers() {
        let scores = RawIntervalScores {
            alignment_score: Some(0.8),
            multi_tf_stack_score: Some(0.75),
            wave3_probability: Some(0.7),
            wave_number: Some(WaveNumber::Three),
            momentum_strength_score: Some(0.6),
            ..Default::default()
        };
        let breakdown = bar_breakdown(&scores, &ThresholdConfig::default());
        assert!(breakdown.rules_blocked.is_empty());
        assert_eq!(
            breakdown.rules_fired,
            vec![
                "alignment_score ≥ 0.75 → STRONG",
                "multi_tf_stack_score ≥ 0.7 and alignment_score ≥ 0.65 → HIGH confidence",
                "wave3_prob ≥ 0.6, wave_number=3, momentum ≥ 0.55 → CONTINUATION",
            ]
        );
    }

    #[test]
    fn test_empty_bar_blockers() {
        let breakdown = bar_breakdown(&RawIntervalScores::default(), &ThresholdConfig::default());
        assert_eq!(
            breakdown.rules_blocked,
            vec![
                "STRONG alignment blocked by alignment_score < 0.75",
                "HIGH confidence blocked by multi_tf_stack_score < 0.7",
                "HIGH confidence blocked by alignment_score < 0.65",
                "MEDIUM confidence blocked by multi_tf_stack_score < 0.4",
                "CONTINUATION blocked by wave3_probability < 0.6",
                "CONTINUATION blocked by wave_number ≠ 3",
                "CONTINUATION blocked by momentum_strength_score < 0.55",
            ]
        );
        assert_eq!(breakdown.rules_fired[0], "alignment_score < 0.35 → DISALIGNED");
        assert_eq!(breakdown.rules_fired[1], "multi_tf_stack_score < 0.4 → LOW confidence");
    }

    #[test]
    fn test_breakdown_text_tracks_overrides() {
        let config = ThresholdConfig {
            alignment_strong: 0.9,
            conf_medium_stack: 0.2,
            ..Default::default()
        };
        let scores = RawIntervalScores {
            alignment_score: Some(0.8),
            multi_tf_stack_score: Some(0.3),
            ..Default::default()
        };
        let breakdown = bar_breakdown(&scores, &config);
        assert_eq!(breakdown.derived.alignment_state, AlignmentState::Moderate);
        assert!(breakdown
            .rules_blocked
            .contains(&"STRONG alignment blocked by alignment_score < 0.9".to_string()));
        assert_eq!(breakdown.rules_fired[1], "multi_tf_stack_score ≥ 0.2 → MEDIUM confidence");
    }
}
