//! Per-interval score rows and their normalization
//!
//! Rows arrive loosely typed (numbers, numeric strings, nulls, or missing
//! keys). They are normalized exactly once into [`RawIntervalScores`], after
//! which the ladders only ever see `Option<f64>` and `Option<WaveNumber>`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Outcome of normalizing one loosely-typed field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Absent,
    Invalid,
}

impl<T> Parsed<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Parsed::Value(v) => Some(v),
            Parsed::Absent | Parsed::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Parsed::Invalid)
    }
}

/// Normalize a number or numeric string to a finite float
pub fn parse_score(value: Option<&Value>) -> Parsed<f64> {
    match value {
        None | Some(Value::Null) => Parsed::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Parsed::Value(f),
            _ => Parsed::Invalid,
        },
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Parsed::Value(f),
            _ => Parsed::Invalid,
        },
        Some(_) => Parsed::Invalid,
    }
}

/// Elliott-style wave label supplied by the upstream wave engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaveNumber {
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "NONE")]
    NoWave,
}

impl WaveNumber {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "3" => Some(Self::Three),
            "4" => Some(Self::Four),
            "5" => Some(Self::Five),
            "NONE" | "" => Some(Self::NoWave),
            _ => None,
        }
    }
}

impl std::fmt::Display for WaveNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Three => write!(f, "3"),
            Self::Four => write!(f, "4"),
            Self::Five => write!(f, "5"),
            Self::NoWave => write!(f, "NONE"),
        }
    }
}

/// Normalize a wave label; unrecognized labels are Invalid and never match
pub fn parse_wave_number(value: Option<&Value>) -> Parsed<WaveNumber> {
    let parsed = match value {
        None | Some(Value::Null) => return Parsed::Absent,
        Some(Value::String(s)) => WaveNumber::from_label(s),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => WaveNumber::from_label(&format!("{}", f as i64)),
            _ => None,
        },
        Some(_) => None,
    };
    match parsed {
        Some(wave) => Parsed::Value(wave),
        None => Parsed::Invalid,
    }
}

fn value_to_text(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// One row as delivered by the row store, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIntervalRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub alignment_score: Option<Value>,
    #[serde(default)]
    pub wave3_probability: Option<Value>,
    #[serde(default)]
    pub wave5_exhaustion_probability: Option<Value>,
    #[serde(default)]
    pub momentum_strength_score: Option<Value>,
    #[serde(default)]
    pub multi_tf_stack_score: Option<Value>,
    #[serde(default)]
    pub volatility_regime_score: Option<Value>,
    /// Health score: higher = less divergence risk
    #[serde(default)]
    pub divergence_score: Option<Value>,
    #[serde(default)]
    pub wave_number: Option<Value>,
    #[serde(default)]
    pub trend_direction: Option<Value>,
    #[serde(default)]
    pub wave_phase: Option<Value>,
}

impl RawIntervalRow {
    /// Join a score row with the wave-engine state row for the same timestamp.
    /// The state row's wave number wins when present; trend direction and
    /// wave phase only ever come from the state row.
    pub fn with_wave_state(mut self, state: Option<&RawIntervalRow>) -> Self {
        let state_wave = state.and_then(|s| s.wave_number.clone()).filter(|v| !v.is_null());
        if state_wave.is_some() {
            self.wave_number = state_wave;
        }
        self.trend_direction = state.and_then(|s| s.trend_direction.clone());
        self.wave_phase = state.and_then(|s| s.wave_phase.clone());
        self
    }
}

/// Strictly-typed measurements for one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIntervalScores {
    pub alignment_score: Option<f64>,
    pub wave3_probability: Option<f64>,
    pub wave5_exhaustion_probability: Option<f64>,
    pub momentum_strength_score: Option<f64>,
    pub multi_tf_stack_score: Option<f64>,
    pub volatility_regime_score: Option<f64>,
    pub divergence_score: Option<f64>,
    pub wave_number: Option<WaveNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_phase: Option<String>,
}

impl RawIntervalScores {
    /// Normalize a loosely-typed row. Never fails: unparseable fields become `None`.
    pub fn from_row(row: &RawIntervalRow) -> Self {
        let fields = [
            ("alignment_score", parse_score(row.alignment_score.as_ref())),
            ("wave3_probability", parse_score(row.wave3_probability.as_ref())),
            (
                "wave5_exhaustion_probability",
                parse_score(row.wave5_exhaustion_probability.as_ref()),
            ),
            (
                "momentum_strength_score",
                parse_score(row.momentum_strength_score.as_ref()),
            ),
            ("multi_tf_stack_score", parse_score(row.multi_tf_stack_score.as_ref())),
            (
                "volatility_regime_score",
                parse_score(row.volatility_regime_score.as_ref()),
            ),
            ("divergence_score", parse_score(row.divergence_score.as_ref())),
        ];
        let wave = parse_wave_number(row.wave_number.as_ref());

        let invalid: Vec<&str> = fields
            .iter()
            .filter(|(_, p)| p.is_invalid())
            .map(|(name, _)| *name)
            .chain(wave.is_invalid().then_some("wave_number"))
            .collect();
        if !invalid.is_empty() {
            debug!(
                "Row {:?}: unparseable fields treated as missing: {:?}",
                row.timestamp, invalid
            );
        }

        let [alignment, wave3, wave5, momentum, stack, volatility, divergence] =
            fields.map(|(_, p)| p.value());

        Self {
            alignment_score: alignment,
            wave3_probability: wave3,
            wave5_exhaustion_probability: wave5,
            momentum_strength_score: momentum,
            multi_tf_stack_score: stack,
            volatility_regime_score: volatility,
            divergence_score: divergence,
            wave_number: wave.value(),
            trend_direction: value_to_text(&row.trend_direction),
            wave_phase: value_to_text(&row.wave_phase),
        }
    }

    /// alignment_score with missing treated as 0
    pub fn alignment(&self) -> f64 {
        self.alignment_score.unwrap_or(0.0)
    }

    /// multi_tf_stack_score with missing treated as 0
    pub fn stack(&self) -> f64 {
        self.multi_tf_stack_score.unwrap_or(0.0)
    }

    /// Complement of the divergence health score; missing health is maximal risk
    pub fn divergence_risk(&self) -> f64 {
        self.divergence_score.map_or(1.0, |d| 1.0 - d)
    }

    pub fn is_wave(&self, wave: WaveNumber) -> bool {
        self.wave_number == Some(wave)
    }
}

impl From<&RawIntervalRow> for RawIntervalScores {
    fn from(row: &RawIntervalRow) -> Self {
        Self::from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_score_shapes() {
        assert_eq!(parse_score(Some(&json!(0.42))), Parsed::Value(0.42));
        assert_eq!(parse_score(Some(&json!(" 0.5 "))), Parsed::Value(0.5));
        assert_eq!(parse_score(Some(&json!(1))), Parsed::Value(1.0));
        assert_eq!(parse_score(None), Parsed::Absent);
        assert_eq!(parse_score(Some(&Value::Null)), Parsed::Absent);
        assert_eq!(parse_score(Some(&json!("abc"))), Parsed::Invalid);
        assert_eq!(parse_score(Some(&json!("NaN"))), Parsed::Invalid);
        assert_eq!(parse_score(Some(&json!(true))), Parsed::Invalid);
        assert_eq!(parse_score(Some(&json!([0.5]))), Parsed::Invalid);
    }

    #[test]
    fn test_parse_wave_number() {
        assert_eq!(parse_wave_number(Some(&json!("3"))), Parsed::Value(WaveNumber::Three));
        assert_eq!(parse_wave_number(Some(&json!(5))), Parsed::Value(WaveNumber::Five));
        assert_eq!(parse_wave_number(Some(&json!(" none "))), Parsed::Value(WaveNumber::NoWave));
        assert_eq!(parse_wave_number(Some(&json!(""))), Parsed::Value(WaveNumber::NoWave));
        assert_eq!(parse_wave_number(Some(&json!("wave3"))), Parsed::Invalid);
        assert_eq!(parse_wave_number(Some(&json!(3.5))), Parsed::Invalid);
        assert_eq!(parse_wave_number(None), Parsed::Absent);
    }

    #[test]
    fn test_from_row_never_fails() {
        let row: RawIntervalRow = serde_json::from_value(json!({
            "alignment_score": "0.81",
            "wave3_probability": "garbage",
            "multi_tf_stack_score": null,
            "wave_number": "7",
            "trend_direction": 1
        }))
        .unwrap();
        let scores = RawIntervalScores::from_row(&row);

        assert_eq!(scores.alignment_score, Some(0.81));
        assert_eq!(scores.wave3_probability, None);
        assert_eq!(scores.multi_tf_stack_score, None);
        assert_eq!(scores.momentum_strength_score, None);
        assert_eq!(scores.wave_number, None);
        assert_eq!(scores.trend_direction.as_deref(), Some("1"));
        assert_eq!(scores.stack(), 0.0);
        assert_eq!(scores.divergence_risk(), 1.0);
    }

    #[test]
    fn test_wave_state_join() {
        let scores: RawIntervalRow = serde_json::from_value(json!({
            "timestamp": "2025-01-02T00:00:00Z",
            "alignment_score": 0.5,
            "wave_number": "4"
        }))
        .unwrap();
        let state: RawIntervalRow = serde_json::from_value(json!({
            "wave_number": "3",
            "trend_direction": "up",
            "wave_phase": "impulse"
        }))
        .unwrap();

        let joined = scores.clone().with_wave_state(Some(&state));
        assert_eq!(joined.wave_number, Some(json!("3")));
        assert_eq!(joined.wave_phase, Some(json!("impulse")));

        let unjoined = scores.with_wave_state(None);
        assert_eq!(unjoined.wave_number, Some(json!("4")));
        assert_eq!(unjoined.trend_direction, None);
    }
}
