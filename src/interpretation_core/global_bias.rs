//! Cross-timeframe banner: counts discrete states across one
//! interpretation per timeframe. Scores are never averaged.

use super::ladder::{AlignmentState, DominantBias, MarketInterpretation};

pub const EXPANSION_BANNER: &str = "Market in expansion phase";
pub const LATE_STAGE_BANNER: &str = "Late-stage / risk-aware conditions";

pub fn global_bias_banner(interpretations: &[MarketInterpretation]) -> Option<&'static str> {
    let strong = interpretations
        .iter()
        .filter(|i| i.alignment_state == AlignmentState::Strong)
        .count();
    let continuation = interpretations
        .iter()
        .filter(|i| i.dominant_bias == DominantBias::Continuation)
        .count();
    let exhaustion = interpretations
        .iter()
        .filter(|i| i.dominant_bias == DominantBias::Exhaustion)
        .count();

    if strong >= 1 && continuation >= 2 {
        Some(EXPANSION_BANNER)
    } else if exhaustion >= 2 {
        Some(LATE_STAGE_BANNER)
    } else {
        None
    }
}
