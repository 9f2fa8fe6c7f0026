//! Interpretation Core - pure classification logic shared by the server and batch CLI
//!
//! This module contains the interpretation components:
//! - Threshold config resolution (defaults + overrides)
//! - Score row normalization
//! - Gate evaluation shared by every ladder
//! - Interpretation ladder (alignment, confidence, bias)
//! - Per-bar rule breakdown
//! - Population diagnostics
//! - Cross-timeframe global bias banner

pub mod config;
pub mod scores;
pub mod gates;
pub mod ladder;
pub mod breakdown;
pub mod diagnostics;
pub mod global_bias;

// Re-export commonly used types
pub use config::{resolve, ThresholdCategory, ThresholdConfig, ThresholdKey, ThresholdOverrides};
pub use scores::{parse_score, parse_wave_number, Parsed, RawIntervalRow, RawIntervalScores, WaveNumber};
pub use gates::{Dimension, Gate, GateCheck, GateChecks};
pub use ladder::{
    interpret, interpret_all, narrative, AlignmentState, ConfidenceLevel, DominantBias, KeyFactor,
    MarketInterpretation, Warning,
};
pub use breakdown::{bar_breakdown, BarBreakdown, DerivedStates};
pub use diagnostics::{
    diagnose, interpret_population, run_diagnostics, DiagnosticsResult, InterpretedBar,
};
pub use global_bias::global_bias_banner;
