//! Threshold configuration for the interpretation ladders
//!
//! Every numeric gate the ladders compare against lives here. A config is
//! resolved once per request from the defaults plus an optional set of
//! per-key overrides, then passed by reference into every classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// The full set of thresholds used by one classification run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// alignment_score >= this → STRONG
    pub alignment_strong: f64,
    /// alignment_score >= this → MODERATE
    pub alignment_moderate: f64,
    /// alignment_score >= this → WEAK
    pub alignment_weak: f64,
    /// multi_tf_stack_score needed for HIGH confidence
    pub conf_high_stack: f64,
    /// alignment_score needed for HIGH confidence
    pub conf_high_align: f64,
    /// multi_tf_stack_score needed for MEDIUM confidence
    pub conf_medium_stack: f64,
    /// multi_tf_stack_score >= this → stack aligned
    pub stack_aligned: f64,
    pub bias_cont_wave3: f64,
    pub bias_cont_momentum: f64,
    pub bias_exh_wave5: f64,
    /// Divergence risk (1 - divergence_score) needed for EXHAUSTION
    pub bias_exh_div_risk: f64,
    /// Minimum candidate score for a key factor to be reported
    pub key_factor_relevance: f64,
    pub key_factor_momentum: f64,
    pub key_factor_vol: f64,
    pub key_factor_div_risk: f64,
    /// 1 - multi_tf_stack_score >= this → higher timeframe misalignment
    pub key_factor_misalign: f64,
    /// divergence_score <= this → divergence warning
    pub warn_divergence_max: f64,
    /// volatility_regime_score < this during Wave 5 → volatility warning
    pub warn_vol_wave5_min: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            alignment_strong: 0.75,
            alignment_moderate: 0.55,
            alignment_weak: 0.35,
            conf_high_stack: 0.7,
            conf_high_align: 0.65,
            conf_medium_stack: 0.4,
            stack_aligned: 0.6,
            bias_cont_wave3: 0.6,
            bias_cont_momentum: 0.55,
            bias_exh_wave5: 0.6,
            bias_exh_div_risk: 0.5,
            key_factor_relevance: 0.6,
            key_factor_momentum: 0.6,
            key_factor_vol: 0.6,
            key_factor_div_risk: 0.6,
            key_factor_misalign: 0.6,
            warn_divergence_max: 0.4,
            warn_vol_wave5_min: 0.4,
        }
    }
}

impl ThresholdConfig {
    /// Merge overrides over the defaults. Overrides win per key; absent or
    /// empty overrides yield exactly the defaults.
    pub fn resolve(overrides: Option<&ThresholdOverrides>) -> Self {
        let mut config = Self::default();
        if let Some(overrides) = overrides {
            for (&key, &value) in overrides.iter() {
                key.set(&mut config, value);
            }
        }
        config
    }

    pub fn get(&self, key: ThresholdKey) -> f64 {
        match key {
            ThresholdKey::AlignmentStrong => self.alignment_strong,
            ThresholdKey::AlignmentModerate => self.alignment_moderate,
            ThresholdKey::AlignmentWeak => self.alignment_weak,
            ThresholdKey::ConfHighStack => self.conf_high_stack,
            ThresholdKey::ConfHighAlign => self.conf_high_align,
            ThresholdKey::ConfMediumStack => self.conf_medium_stack,
            ThresholdKey::StackAligned => self.stack_aligned,
            ThresholdKey::BiasContWave3 => self.bias_cont_wave3,
            ThresholdKey::BiasContMomentum => self.bias_cont_momentum,
            ThresholdKey::BiasExhWave5 => self.bias_exh_wave5,
            ThresholdKey::BiasExhDivRisk => self.bias_exh_div_risk,
            ThresholdKey::KeyFactorRelevance => self.key_factor_relevance,
            ThresholdKey::KeyFactorMomentum => self.key_factor_momentum,
            ThresholdKey::KeyFactorVol => self.key_factor_vol,
            ThresholdKey::KeyFactorDivRisk => self.key_factor_div_risk,
            ThresholdKey::KeyFactorMisalign => self.key_factor_misalign,
            ThresholdKey::WarnDivergenceMax => self.warn_divergence_max,
            ThresholdKey::WarnVolWave5Min => self.warn_vol_wave5_min,
        }
    }

    /// Every key paired with its value, in inventory order
    pub fn entries(&self) -> Vec<(ThresholdKey, f64)> {
        ThresholdKey::ALL.iter().map(|&k| (k, self.get(k))).collect()
    }

    /// Snapshot this config as a complete override set (all 18 keys)
    pub fn to_overrides(&self) -> ThresholdOverrides {
        ThresholdOverrides {
            values: self.entries().into_iter().collect(),
        }
    }
}

/// Shorthand for [`ThresholdConfig::resolve`]
pub fn resolve(overrides: Option<&ThresholdOverrides>) -> ThresholdConfig {
    ThresholdConfig::resolve(overrides)
}

/// Grouping used when listing thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdCategory {
    Alignment,
    Confidence,
    Stack,
    Bias,
    KeyFactors,
    Warnings,
}

impl std::fmt::Display for ThresholdCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alignment => write!(f, "Step 1: Alignment"),
            Self::Confidence => write!(f, "Step 2: Confidence"),
            Self::Stack => write!(f, "Stack aligned"),
            Self::Bias => write!(f, "Step 3: Bias"),
            Self::KeyFactors => write!(f, "Key factors"),
            Self::Warnings => write!(f, "Warnings"),
        }
    }
}

/// Name of one tunable threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKey {
    AlignmentStrong,
    AlignmentModerate,
    AlignmentWeak,
    ConfHighStack,
    ConfHighAlign,
    ConfMediumStack,
    StackAligned,
    BiasContWave3,
    BiasContMomentum,
    BiasExhWave5,
    BiasExhDivRisk,
    KeyFactorRelevance,
    KeyFactorMomentum,
    KeyFactorVol,
    KeyFactorDivRisk,
    KeyFactorMisalign,
    WarnDivergenceMax,
    WarnVolWave5Min,
}

impl ThresholdKey {
    pub const ALL: [ThresholdKey; 18] = [
        Self::AlignmentStrong,
        Self::AlignmentModerate,
        Self::AlignmentWeak,
        Self::ConfHighStack,
        Self::ConfHighAlign,
        Self::ConfMediumStack,
        Self::StackAligned,
        Self::BiasContWave3,
        Self::BiasContMomentum,
        Self::BiasExhWave5,
        Self::BiasExhDivRisk,
        Self::KeyFactorRelevance,
        Self::KeyFactorMomentum,
        Self::KeyFactorVol,
        Self::KeyFactorDivRisk,
        Self::KeyFactorMisalign,
        Self::WarnDivergenceMax,
        Self::WarnVolWave5Min,
    ];

    /// Wire name, as used in override blobs
    pub fn name(self) -> &'static str {
        match self {
            Self::AlignmentStrong => "alignment_strong",
            Self::AlignmentModerate => "alignment_moderate",
            Self::AlignmentWeak => "alignment_weak",
            Self::ConfHighStack => "conf_high_stack",
            Self::ConfHighAlign => "conf_high_align",
            Self::ConfMediumStack => "conf_medium_stack",
            Self::StackAligned => "stack_aligned",
            Self::BiasContWave3 => "bias_cont_wave3",
            Self::BiasContMomentum => "bias_cont_momentum",
            Self::BiasExhWave5 => "bias_exh_wave5",
            Self::BiasExhDivRisk => "bias_exh_div_risk",
            Self::KeyFactorRelevance => "key_factor_relevance",
            Self::KeyFactorMomentum => "key_factor_momentum",
            Self::KeyFactorVol => "key_factor_vol",
            Self::KeyFactorDivRisk => "key_factor_div_risk",
            Self::KeyFactorMisalign => "key_factor_misalign",
            Self::WarnDivergenceMax => "warn_divergence_max",
            Self::WarnVolWave5Min => "warn_vol_wave5_min",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AlignmentStrong => "STRONG (≥)",
            Self::AlignmentModerate => "MODERATE (≥)",
            Self::AlignmentWeak => "WEAK (≥)",
            Self::ConfHighStack => "HIGH stack (≥)",
            Self::ConfHighAlign => "HIGH alignment (≥)",
            Self::ConfMediumStack => "MEDIUM stack (≥)",
            Self::StackAligned => "Stack aligned (≥)",
            Self::BiasContWave3 => "CONT wave3_prob (≥)",
            Self::BiasContMomentum => "CONT momentum (≥)",
            Self::BiasExhWave5 => "EXH wave5 (≥)",
            Self::BiasExhDivRisk => "EXH div risk (≥)",
            Self::KeyFactorRelevance => "Key factor relevance (≥)",
            Self::KeyFactorMomentum => "Momentum expanding (≥)",
            Self::KeyFactorVol => "Volatility contracting (≥)",
            Self::KeyFactorDivRisk => "Divergence forming (≥)",
            Self::KeyFactorMisalign => "HTF misalignment (≥)",
            Self::WarnDivergenceMax => "Divergence warning (≤)",
            Self::WarnVolWave5Min => "Wave 5 vol warning (<)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::AlignmentStrong => "alignment_score ≥ → STRONG",
            Self::AlignmentModerate => "alignment_score ≥ → MODERATE",
            Self::AlignmentWeak => "alignment_score ≥ → WEAK",
            Self::ConfHighStack => "multi_tf_stack_score ≥ → HIGH",
            Self::ConfHighAlign => "alignment_score ≥ for HIGH",
            Self::ConfMediumStack => "multi_tf_stack_score ≥ → MEDIUM",
            Self::StackAligned => "stack_aligned rail / key factor",
            Self::BiasContWave3 => "wave3_probability ≥ for CONTINUATION",
            Self::BiasContMomentum => "momentum_strength ≥ for CONTINUATION",
            Self::BiasExhWave5 => "wave5_exhaustion_prob ≥ for EXHAUSTION",
            Self::BiasExhDivRisk => "divergence_risk ≥ for EXHAUSTION",
            Self::KeyFactorRelevance => "Min score to include key factor",
            Self::KeyFactorMomentum | Self::KeyFactorVol => "Key factor threshold",
            Self::KeyFactorDivRisk => "Key factor div risk",
            Self::KeyFactorMisalign => "1 - stack ≥ for misalign factor",
            Self::WarnDivergenceMax => "divergence_score ≤ → warning",
            Self::WarnVolWave5Min => "volatility_regime < → Wave 5 warning",
        }
    }

    pub fn category(self) -> ThresholdCategory {
        match self {
            Self::AlignmentStrong | Self::AlignmentModerate | Self::AlignmentWeak => {
                ThresholdCategory::Alignment
            }
            Self::ConfHighStack | Self::ConfHighAlign | Self::ConfMediumStack => {
                ThresholdCategory::Confidence
            }
            Self::StackAligned => ThresholdCategory::Stack,
            Self::BiasContWave3
            | Self::BiasContMomentum
            | Self::BiasExhWave5
            | Self::BiasExhDivRisk => ThresholdCategory::Bias,
            Self::KeyFactorRelevance
            | Self::KeyFactorMomentum
            | Self::KeyFactorVol
            | Self::KeyFactorDivRisk
            | Self::KeyFactorMisalign => ThresholdCategory::KeyFactors,
            Self::WarnDivergenceMax | Self::WarnVolWave5Min => ThresholdCategory::Warnings,
        }
    }

    fn set(self, config: &mut ThresholdConfig, value: f64) {
        let slot = match self {
            Self::AlignmentStrong => &mut config.alignment_strong,
            Self::AlignmentModerate => &mut config.alignment_moderate,
            Self::AlignmentWeak => &mut config.alignment_weak,
            Self::ConfHighStack => &mut config.conf_high_stack,
            Self::ConfHighAlign => &mut config.conf_high_align,
            Self::ConfMediumStack => &mut config.conf_medium_stack,
            Self::StackAligned => &mut config.stack_aligned,
            Self::BiasContWave3 => &mut config.bias_cont_wave3,
            Self::BiasContMomentum => &mut config.bias_cont_momentum,
            Self::BiasExhWave5 => &mut config.bias_exh_wave5,
            Self::BiasExhDivRisk => &mut config.bias_exh_div_risk,
            Self::KeyFactorRelevance => &mut config.key_factor_relevance,
            Self::KeyFactorMomentum => &mut config.key_factor_momentum,
            Self::KeyFactorVol => &mut config.key_factor_vol,
            Self::KeyFactorDivRisk => &mut config.key_factor_div_risk,
            Self::KeyFactorMisalign => &mut config.key_factor_misalign,
            Self::WarnDivergenceMax => &mut config.warn_divergence_max,
            Self::WarnVolWave5Min => &mut config.warn_vol_wave5_min,
        };
        *slot = value;
    }
}

impl std::fmt::Display for ThresholdKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Partial set of threshold values keyed by name
///
/// Travels as a flat JSON object (`{"alignment_strong": 0.6}`). No range
/// validation is applied: out-of-range thresholds are legal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct ThresholdOverrides {
    values: BTreeMap<ThresholdKey, f64>,
}

impl ThresholdOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ThresholdKey, value: f64) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: ThresholdKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: ThresholdKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ThresholdKey, &f64)> {
        self.values.iter()
    }

    /// Parse an override blob such as the `overrides` query parameter
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let map: BTreeMap<String, f64> = serde_json::from_str(raw)?;
        Ok(Self::from(map))
    }
}

impl From<BTreeMap<String, f64>> for ThresholdOverrides {
    fn from(raw: BTreeMap<String, f64>) -> Self {
        let mut values = BTreeMap::new();
        for (name, value) in raw {
            match ThresholdKey::from_name(&name) {
                Some(key) => {
                    values.insert(key, value);
                }
                None => warn!("Ignoring unknown threshold override: {}", name),
            }
        }
        Self { values }
    }
}

impl From<ThresholdOverrides> for BTreeMap<String, f64> {
    fn from(overrides: ThresholdOverrides) -> Self {
        overrides
            .values
            .into_iter()
            .map(|(k, v)| (k.name().to_string(), v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_overrides_is_default() {
        assert_eq!(ThresholdConfig::resolve(None), ThresholdConfig::default());
        let empty = ThresholdOverrides::new();
        assert_eq!(ThresholdConfig::resolve(Some(&empty)), ThresholdConfig::default());
    }

    #[test]
    fn test_resolve_overrides_win_per_key() {
        let overrides = ThresholdOverrides::new()
            .with(ThresholdKey::AlignmentStrong, 0.6)
            .with(ThresholdKey::WarnVolWave5Min, 1.7);
        let config = resolve(Some(&overrides));
        let defaults = ThresholdConfig::default();

        for key in ThresholdKey::ALL {
            match overrides.get(key) {
                Some(v) => assert_eq!(config.get(key), v, "{}", key),
                None => assert_eq!(config.get(key), defaults.get(key), "{}", key),
            }
        }
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in ThresholdKey::ALL {
            assert_eq!(ThresholdKey::from_name(key.name()), Some(key));
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.name()));
        }
        assert_eq!(ThresholdKey::from_name("alignment_strongest"), None);
    }

    #[test]
    fn test_overrides_from_json_ignores_unknown_keys() {
        let overrides =
            ThresholdOverrides::from_json(r#"{"alignment_strong": 0.6, "bogus": 1.0}"#).unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get(ThresholdKey::AlignmentStrong), Some(0.6));
    }

    #[test]
    fn test_overrides_from_json_rejects_non_numeric() {
        assert!(ThresholdOverrides::from_json(r#"{"alignment_strong": "high"}"#).is_err());
        assert!(ThresholdOverrides::from_json("not json").is_err());
    }

    #[test]
    fn test_snapshot_covers_every_key() {
        let snapshot = ThresholdConfig::default().to_overrides();
        assert_eq!(snapshot.len(), 18);
        assert_eq!(resolve(Some(&snapshot)), ThresholdConfig::default());
    }

    #[test]
    fn test_categories() {
        assert_eq!(ThresholdKey::StackAligned.category(), ThresholdCategory::Stack);
        assert_eq!(
            ThresholdKey::KeyFactorMisalign.category(),
            ThresholdCategory::KeyFactors
        );
        let warnings = ThresholdKey::ALL
            .iter()
            .filter(|k| k.category() == ThresholdCategory::Warnings)
            .count();
        assert_eq!(warnings, 2);
    }
}
