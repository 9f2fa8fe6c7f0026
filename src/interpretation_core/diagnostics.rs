//! Population diagnostics
//!
//! Reduces a collection of interpreted bars into:
//! - Per-dimension distributions (count + percentage per category)
//! - Multi-timeframe stack score bands
//! - Gating analysis: which failing gates keep bars out of the best tier
//! - Rare, unreachable and overrepresented states
//!
//! Every bar in one aggregation must have been interpreted with the same
//! config that is passed here; the gating labels are derived from it.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

use super::config::ThresholdConfig;
use super::gates::{Dimension, Gate, GateChecks};
use super::ladder::{
    interpret_all, AlignmentState, ConfidenceLevel, DominantBias, MarketInterpretation, Warning,
};
use super::scores::RawIntervalScores;

/// Below this percentage a reached state counts as rare
pub const RARE_PCT: f64 = 5.0;
/// Above this percentage a state counts as overrepresented
pub const OVERREPRESENTED_PCT: f64 = 80.0;

/// Composite label for a non-CONTINUATION bar with no attributable blocker
pub const CONTINUATION_NOT_MET: &str = "continuation conditions not met";

/// Round `count / total * 100` to two decimals; zero when `total` is zero
pub fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// One raw-scores / interpretation pair
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretedBar {
    pub scores: RawIntervalScores,
    pub interpretation: MarketInterpretation,
}

/// Interpret every bar (in parallel) and pair it with its scores
pub fn interpret_population(
    scores: Vec<RawIntervalScores>,
    config: &ThresholdConfig,
) -> Vec<InterpretedBar> {
    let interpretations = interpret_all(&scores, config);
    scores
        .into_iter()
        .zip(interpretations)
        .map(|(scores, interpretation)| InterpretedBar {
            scores,
            interpretation,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Share {
    pub count: usize,
    pub pct: f64,
}

/// Category → share, serialized as a JSON object in fixed category order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Distribution {
    entries: Vec<(&'static str, Share)>,
}

impl Distribution {
    fn from_counts(categories: &[&'static str], counts: &[usize], total: usize) -> Self {
        let entries = categories
            .iter()
            .zip(counts)
            .map(|(&name, &count)| {
                (
                    name,
                    Share {
                        count,
                        pct: pct(count, total),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, category: &str) -> Option<Share> {
        self.entries
            .iter()
            .find(|(name, _)| *name == category)
            .map(|(_, share)| *share)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, Share)> {
        self.entries.iter()
    }

    pub fn total_pct(&self) -> f64 {
        self.entries.iter().map(|(_, s)| s.pct).sum()
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, share) in &self.entries {
            map.serialize_entry(name, share)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StateDistribution {
    pub alignment_state: Distribution,
    pub confidence_level: Distribution,
    pub dominant_bias: Distribution,
    pub divergence_warning_count: usize,
    pub wave3_continuation_count: usize,
    pub wave5_exhaustion_count: usize,
}

impl StateDistribution {
    pub fn dimension(&self, dimension: Dimension) -> &Distribution {
        match dimension {
            Dimension::AlignmentState => &self.alignment_state,
            Dimension::ConfidenceLevel => &self.confidence_level,
            Dimension::DominantBias => &self.dominant_bias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockerCount {
    pub label: String,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GatingAnalysis {
    /// Blockers among bars that are not STRONG
    #[serde(rename = "strongAlignment")]
    pub strong_alignment: Vec<BlockerCount>,
    /// Blockers among bars that are not HIGH confidence
    #[serde(rename = "highConfidence")]
    pub high_confidence: Vec<BlockerCount>,
    /// Composite blockers among bars that are not CONTINUATION
    #[serde(rename = "continuationBias")]
    pub continuation_bias: Vec<BlockerCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRef {
    pub state: Dimension,
    pub value: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateShare {
    pub state: Dimension,
    pub value: &'static str,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RareStates {
    pub rare: Vec<StateShare>,
    pub unreachable: Vec<StateRef>,
    pub overrepresented: Vec<StateShare>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiagnosticsResult {
    #[serde(rename = "totalBars")]
    pub total_bars: usize,
    pub distribution: StateDistribution,
    #[serde(rename = "multiTfStackBands")]
    pub multi_tf_stack_bands: Distribution,
    #[serde(rename = "gatingAnalysis")]
    pub gating_analysis: GatingAnalysis,
    #[serde(rename = "rareStates")]
    pub rare_states: RareStates,
}

const ALIGNMENT_CATEGORIES: [&str; 4] = ["STRONG", "MODERATE", "WEAK", "DISALIGNED"];
const CONFIDENCE_CATEGORIES: [&str; 3] = ["HIGH", "MEDIUM", "LOW"];
const BIAS_CATEGORIES: [&str; 3] = ["CONTINUATION", "EXHAUSTION", "NEUTRAL"];

/// Stack score bands: `>= 0.7`, `[0.4, 0.7)`, `< 0.4`
pub const STACK_BANDS: [&str; 3] = [">= 0.7", "0.4-0.69", "< 0.4"];

fn stack_band(stack: f64) -> usize {
    if stack >= 0.7 {
        0
    } else if stack >= 0.4 {
        1
    } else {
        2
    }
}

/// Tallies blocker labels in first-seen order
#[derive(Default)]
struct BlockerTally {
    order: Vec<String>,
    counts: HashMap<String, usize>,
    denominator: usize,
}

impl BlockerTally {
    fn add(&mut self, label: String) {
        match self.counts.get_mut(&label) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(label.clone(), 1);
                self.order.push(label);
            }
        }
    }

    /// Sorted by count descending; ties keep first-seen order
    fn ranked(self) -> Vec<BlockerCount> {
        let denominator = self.denominator;
        let mut ranked: Vec<BlockerCount> = self
            .order
            .into_iter()
            .map(|label| {
                let count = self.counts.get(&label).copied().unwrap_or(0);
                BlockerCount {
                    label,
                    count,
                    pct: pct(count, denominator),
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked
    }
}

/// Aggregate an interpreted population under the config that produced it
pub fn run_diagnostics(bars: &[InterpretedBar], config: &ThresholdConfig) -> DiagnosticsResult {
    let n = bars.len();
    if n == 0 {
        debug!("Diagnostics over empty population");
        return empty_result();
    }

    let mut alignment_counts = [0usize; 4];
    let mut confidence_counts = [0usize; 3];
    let mut bias_counts = [0usize; 3];
    let mut band_counts = [0usize; 3];
    let mut divergence_warning_count = 0;

    let mut strong = BlockerTally::default();
    let mut high = BlockerTally::default();
    let mut continuation = BlockerTally::default();

    for bar in bars {
        let interp = &bar.interpretation;
        alignment_counts[index_of(&AlignmentState::ALL, interp.alignment_state)] += 1;
        confidence_counts[index_of(&ConfidenceLevel::ALL, interp.confidence_level)] += 1;
        bias_counts[index_of(&DominantBias::ALL, interp.dominant_bias)] += 1;
        band_counts[stack_band(bar.scores.stack())] += 1;
        if interp.has_warning(Warning::DivergenceIncreasing) {
            divergence_warning_count += 1;
        }

        let checks = GateChecks::evaluate(&bar.scores, config);

        if interp.alignment_state != AlignmentState::Strong {
            strong.denominator += 1;
            for check in checks.failed(&[Gate::AlignmentStrong]) {
                strong.add(check.blocked_label());
            }
        }

        if interp.confidence_level != ConfidenceLevel::High {
            high.denominator += 1;
            for check in checks.failed(&Gate::HIGH_CONFIDENCE) {
                high.add(check.blocked_label());
            }
            if interp.confidence_level == ConfidenceLevel::Low {
                for check in checks.failed(&[Gate::MediumConfidenceStack]) {
                    high.add(check.blocked_label());
                }
            }
        }

        if interp.dominant_bias != DominantBias::Continuation {
            continuation.denominator += 1;
            let why: Vec<String> = checks
                .failed(&Gate::CONTINUATION)
                .map(|c| c.blocked_label())
                .collect();
            let label = if why.is_empty() {
                CONTINUATION_NOT_MET.to_string()
            } else {
                why.join(", ")
            };
            continuation.add(label);
        }
    }

    let distribution = StateDistribution {
        alignment_state: Distribution::from_counts(&ALIGNMENT_CATEGORIES, &alignment_counts, n),
        confidence_level: Distribution::from_counts(&CONFIDENCE_CATEGORIES, &confidence_counts, n),
        dominant_bias: Distribution::from_counts(&BIAS_CATEGORIES, &bias_counts, n),
        divergence_warning_count,
        wave3_continuation_count: bias_counts[0],
        wave5_exhaustion_count: bias_counts[1],
    };
    let rare_states = classify_rare_states(&distribution);

    debug!(
        "Diagnostics over {} bars: {} not STRONG, {} not HIGH, {} not CONTINUATION",
        n, strong.denominator, high.denominator, continuation.denominator
    );

    DiagnosticsResult {
        total_bars: n,
        multi_tf_stack_bands: Distribution::from_counts(&STACK_BANDS, &band_counts, n),
        gating_analysis: GatingAnalysis {
            strong_alignment: strong.ranked(),
            high_confidence: high.ranked(),
            continuation_bias: continuation.ranked(),
        },
        distribution,
        rare_states,
    }
}

/// Interpret already-normalized scores, then aggregate them
pub fn diagnose(scores: Vec<RawIntervalScores>, config: &ThresholdConfig) -> DiagnosticsResult {
    let bars = interpret_population(scores, config);
    run_diagnostics(&bars, config)
}

fn index_of<T: PartialEq>(all: &[T], value: T) -> usize {
    all.iter().position(|v| *v == value).unwrap_or(0)
}

/// Each (dimension, category) lands in at most one list; anything between
/// the rare and overrepresented cuts is expected and left out.
fn classify_rare_states(distribution: &StateDistribution) -> RareStates {
    let mut out = RareStates::default();
    for dimension in Dimension::ALL {
        for &(value, share) in distribution.dimension(dimension).iter() {
            let p = share.pct;
            if p == 0.0 {
                out.unreachable.push(StateRef {
                    state: dimension,
                    value,
                });
            } else if p < RARE_PCT {
                out.rare.push(StateShare {
                    state: dimension,
                    value,
                    pct: p,
                });
            } else if p > OVERREPRESENTED_PCT {
                out.overrepresented.push(StateShare {
                    state: dimension,
                    value,
                    pct: p,
                });
            }
        }
    }
    out
}

fn empty_result() -> DiagnosticsResult {
    let zeros = [0usize; 4];
    DiagnosticsResult {
        total_bars: 0,
        distribution: StateDistribution {
            alignment_state: Distribution::from_counts(&ALIGNMENT_CATEGORIES, &zeros, 0),
            confidence_level: Distribution::from_counts(&CONFIDENCE_CATEGORIES, &zeros, 0),
            dominant_bias: Distribution::from_counts(&BIAS_CATEGORIES, &zeros, 0),
            ..Default::default()
        },
        multi_tf_stack_bands: Distribution::from_counts(&STACK_BANDS, &zeros, 0),
        ..Default::default()
    }
}
