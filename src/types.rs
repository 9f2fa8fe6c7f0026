use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::interpretation_core::{
    BarBreakdown, DiagnosticsResult, MarketInterpretation, RawIntervalRow, ThresholdCategory,
    ThresholdConfig, ThresholdKey, ThresholdOverrides,
};
use crate::versions::{ThresholdVersion, VersionRegistry};

/// POST /api/interpretation
#[derive(Debug, Clone, Deserialize)]
pub struct InterpretationRequest {
    pub row: RawIntervalRow,
    /// Wave-engine state row for the same timestamp
    #[serde(default, rename = "waveState")]
    pub wave_state: Option<RawIntervalRow>,
    #[serde(default)]
    pub overrides: Option<ThresholdOverrides>,
    #[serde(default)]
    pub breakdown: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterpretationResponse {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub timestamp: Option<String>,
    pub interpretation: MarketInterpretation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BarBreakdown>,
}

/// POST /api/interpretation/multi-tf
#[derive(Debug, Clone, Deserialize)]
pub struct MultiTimeframeRequest {
    /// One score row per timeframe
    pub rows: Vec<RawIntervalRow>,
    #[serde(default, rename = "waveStates")]
    pub wave_states: Vec<RawIntervalRow>,
    #[serde(default)]
    pub overrides: Option<ThresholdOverrides>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeframeInterpretation {
    pub timeframe: Option<String>,
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub interpretation: MarketInterpretation,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiTimeframeResponse {
    pub symbol: Option<String>,
    pub interpretations: Vec<TimeframeInterpretation>,
    #[serde(rename = "globalBiasBanner", skip_serializing_if = "Option::is_none")]
    pub global_bias_banner: Option<&'static str>,
}

/// POST /api/diagnostics
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsRequest {
    pub rows: Vec<RawIntervalRow>,
    #[serde(default, rename = "waveStates")]
    pub wave_states: Vec<RawIntervalRow>,
    #[serde(default)]
    pub overrides: Option<ThresholdOverrides>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    #[serde(rename = "thresholdsUsed")]
    pub thresholds_used: ThresholdConfig,
    #[serde(flatten)]
    pub result: DiagnosticsResult,
}

/// One entry of the threshold inventory
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdInfo {
    pub key: ThresholdKey,
    pub label: &'static str,
    pub description: &'static str,
    pub category: ThresholdCategory,
    pub value: f64,
    pub default: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdsResponse {
    #[serde(rename = "activeVersionId")]
    pub active_version_id: Option<String>,
    pub thresholds: Vec<ThresholdInfo>,
}

impl ThresholdsResponse {
    pub fn new(config: &ThresholdConfig, active_version_id: Option<String>) -> Self {
        let defaults = ThresholdConfig::default();
        let thresholds = ThresholdKey::ALL
            .iter()
            .map(|&key| ThresholdInfo {
                key,
                label: key.label(),
                description: key.description(),
                category: key.category(),
                value: config.get(key),
                default: defaults.get(key),
            })
            .collect();
        Self {
            active_version_id,
            thresholds,
        }
    }
}

/// POST /api/versions
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Values to snapshot, merged over defaults
    #[serde(default)]
    pub values: Option<ThresholdOverrides>,
}

/// POST /api/versions/active
#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveRequest {
    /// `null` returns to defaults
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<ThresholdVersion>,
    #[serde(rename = "activeVersionId")]
    pub active_version_id: Option<String>,
}

impl From<&VersionRegistry> for VersionsResponse {
    fn from(registry: &VersionRegistry) -> Self {
        Self {
            versions: registry.versions.clone(),
            active_version_id: registry.active_version_id.clone(),
        }
    }
}

/// Shared server state
pub struct AppState {
    pub registry: RwLock<VersionRegistry>,
    /// Where registry changes are persisted; `None` keeps them in memory
    pub registry_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(registry: VersionRegistry, registry_path: Option<PathBuf>) -> Self {
        Self {
            registry: RwLock::new(registry),
            registry_path,
        }
    }
}
