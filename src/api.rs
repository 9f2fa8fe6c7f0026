use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::interpretation_core::{
    bar_breakdown, diagnose, global_bias_banner, interpret, RawIntervalScores, ThresholdConfig,
    ThresholdOverrides,
};
use crate::rows::{join_wave_states, to_scores, MAX_POPULATION};
use crate::types::{
    AppState, CreateVersionRequest, DiagnosticsRequest, DiagnosticsResponse, InterpretationRequest,
    InterpretationResponse, MultiTimeframeRequest, MultiTimeframeResponse, SetActiveRequest,
    ThresholdsResponse, TimeframeInterpretation, VersionsResponse,
};
use crate::versions::VersionRegistry;

pub type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: impl std::fmt::Display) -> ApiResponse {
    (status, Json(json!({ "error": message.to_string() })))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/interpretation", post(post_interpretation))
        .route("/api/interpretation/multi-tf", post(post_multi_timeframe))
        .route("/api/diagnostics", post(post_diagnostics))
        .route("/api/thresholds", get(get_thresholds))
        .route("/api/versions", get(get_versions).post(post_version))
        .route("/api/versions/active", post(post_active_version))
        .with_state(state)
}

/// Request overrides, else the active version, else defaults
async fn resolve_config(state: &AppState, overrides: Option<&ThresholdOverrides>) -> ThresholdConfig {
    state.registry.read().await.resolve(overrides)
}

/// POST /api/interpretation - Interpret one bar
pub async fn post_interpretation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InterpretationRequest>,
) -> ApiResponse {
    let config = resolve_config(&state, req.overrides.as_ref()).await;
    let row = req.row.with_wave_state(req.wave_state.as_ref());
    let scores = RawIntervalScores::from_row(&row);

    let response = InterpretationResponse {
        symbol: row.symbol.clone(),
        timeframe: row.timeframe.clone(),
        timestamp: row.timestamp.clone(),
        interpretation: interpret(&scores, &config),
        breakdown: req.breakdown.then(|| bar_breakdown(&scores, &config)),
    };
    (StatusCode::OK, Json(json!(response)))
}

/// POST /api/interpretation/multi-tf - One interpretation per timeframe + banner
pub async fn post_multi_timeframe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MultiTimeframeRequest>,
) -> ApiResponse {
    if req.rows.is_empty() {
        return error(StatusCode::BAD_REQUEST, "At least one timeframe row is required");
    }
    let config = resolve_config(&state, req.overrides.as_ref()).await;
    let rows = join_wave_states(req.rows, &req.wave_states);

    let interpretations: Vec<TimeframeInterpretation> = rows
        .iter()
        .map(|row| TimeframeInterpretation {
            timeframe: row.timeframe.clone(),
            timestamp: row.timestamp.clone(),
            interpretation: interpret(&RawIntervalScores::from_row(row), &config),
        })
        .collect();
    let all: Vec<_> = interpretations.iter().map(|i| i.interpretation.clone()).collect();

    let response = MultiTimeframeResponse {
        symbol: rows.iter().find_map(|r| r.symbol.clone()),
        global_bias_banner: global_bias_banner(&all),
        interpretations,
    };
    (StatusCode::OK, Json(json!(response)))
}

/// POST /api/diagnostics - Aggregate diagnostics over a population of bars
pub async fn post_diagnostics(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DiagnosticsRequest>,
) -> ApiResponse {
    if req.rows.len() > MAX_POPULATION {
        return error(
            StatusCode::BAD_REQUEST,
            format!("Too many rows: {} (max {})", req.rows.len(), MAX_POPULATION),
        );
    }
    let config = resolve_config(&state, req.overrides.as_ref()).await;
    let rows = join_wave_states(req.rows, &req.wave_states);
    if rows.is_empty() {
        warn!("Diagnostics requested over an empty population");
    }

    let scores = to_scores(&rows);
    let result = match tokio::task::spawn_blocking(move || diagnose(scores, &config)).await {
        Ok(result) => result,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    info!("Diagnostics over {} bars", result.total_bars);

    let response = DiagnosticsResponse {
        thresholds_used: config,
        result,
    };
    (StatusCode::OK, Json(json!(response)))
}

/// GET /api/thresholds - Resolved active thresholds with their inventory
pub async fn get_thresholds(State(state): State<Arc<AppState>>) -> ApiResponse {
    let registry = state.registry.read().await;
    let response = ThresholdsResponse::new(&registry.resolve(None), registry.active_version_id.clone());
    (StatusCode::OK, Json(json!(response)))
}

/// GET /api/versions - List saved threshold versions
pub async fn get_versions(State(state): State<Arc<AppState>>) -> ApiResponse {
    let registry = state.registry.read().await;
    (StatusCode::OK, Json(json!(VersionsResponse::from(&*registry))))
}

/// POST /api/versions - Snapshot a config as a new active version
pub async fn post_version(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVersionRequest>,
) -> ApiResponse {
    let values = ThresholdConfig::resolve(req.values.as_ref());
    update_registry(&state, |registry| {
        registry.create_version(values, req.name.as_deref());
        Ok(())
    })
    .await
}

/// POST /api/versions/active - Switch the active version (or clear it)
pub async fn post_active_version(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResponse {
    let result = update_registry(&state, |registry| registry.set_active(req.id.as_deref())).await;
    if result.0 == StatusCode::OK {
        info!("Active threshold version: {:?}", req.id);
    }
    result
}

/// Apply a change to a copy of the registry, persist it, then publish it.
/// A rejected change maps to 400, a failed write to 500; neither is published.
async fn update_registry<F>(state: &AppState, change: F) -> ApiResponse
where
    F: FnOnce(&mut VersionRegistry) -> anyhow::Result<()>,
{
    let mut registry = state.registry.write().await;
    let mut updated = registry.clone();
    if let Err(e) = change(&mut updated) {
        return error(StatusCode::BAD_REQUEST, e);
    }
    if let Some(path) = &state.registry_path {
        if let Err(e) = updated.save(path) {
            return error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    }
    *registry = updated;
    (StatusCode::OK, Json(json!(VersionsResponse::from(&*registry))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation_core::RawIntervalRow;
    use serde_json::Value;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(VersionRegistry::default(), None))
    }

    fn row(value: Value) -> RawIntervalRow {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_interpretation_with_breakdown() {
        let req = InterpretationRequest {
            row: row(json!({"timestamp": "2025-01-02T14:00:00Z", "alignment_score": "0.8", "wave_number": "4"})),
            wave_state: Some(row(json!({"wave_number": 3}))),
            overrides: None,
            breakdown: true,
        };
        let (status, Json(body)) = post_interpretation(State(state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interpretation"]["alignment_state"], "STRONG");
        assert_eq!(body["breakdown"]["rawScores"]["wave_number"], "3");
        assert_eq!(body["breakdown"]["rulesFired"][0], "alignment_score ≥ 0.75 → STRONG");
    }

    #[tokio::test]
    async fn test_body_overrides_beat_active_version() {
        let state = state();
        let create = CreateVersionRequest {
            name: None,
            values: Some(ThresholdOverrides::from_json(r#"{"alignment_strong": 0.9}"#).unwrap()),
        };
        let (status, _) = post_version(State(state.clone()), Json(create)).await;
        assert_eq!(status, StatusCode::OK);

        let bar = json!({"alignment_score": 0.8});
        let req = InterpretationRequest {
            row: row(bar.clone()),
            wave_state: None,
            overrides: None,
            breakdown: false,
        };
        let (_, Json(body)) = post_interpretation(State(state.clone()), Json(req)).await;
        assert_eq!(body["interpretation"]["alignment_state"], "MODERATE");
        assert!(body.get("breakdown").is_none());

        let req = InterpretationRequest {
            row: row(bar),
            wave_state: None,
            overrides: Some(ThresholdOverrides::from_json(r#"{"alignment_strong": 0.6}"#).unwrap()),
            breakdown: false,
        };
        let (_, Json(body)) = post_interpretation(State(state), Json(req)).await;
        assert_eq!(body["interpretation"]["alignment_state"], "STRONG");
    }

    #[tokio::test]
    async fn test_diagnostics_empty_population_is_ok() {
        let req = DiagnosticsRequest {
            rows: vec![],
            wave_states: vec![],
            overrides: None,
        };
        let (status, Json(body)) = post_diagnostics(State(state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalBars"], 0);
        assert_eq!(body["distribution"]["alignment_state"]["STRONG"]["pct"], 0.0);
        assert_eq!(body["thresholdsUsed"]["alignment_strong"], 0.75);
    }

    #[tokio::test]
    async fn test_diagnostics_rejects_oversized_population() {
        let req = DiagnosticsRequest {
            rows: vec![RawIntervalRow::default(); MAX_POPULATION + 1],
            wave_states: vec![],
            overrides: None,
        };
        let (status, Json(body)) = post_diagnostics(State(state()), Json(req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Too many rows"));
    }

    #[tokio::test]
    async fn test_multi_timeframe_banner() {
        let bullish = |tf: &str, alignment: f64| {
            row(json!({
                "symbol": "NQ",
                "timeframe": tf,
                "timestamp": "2025-01-02T14:00:00Z",
                "alignment_score": alignment,
                "wave3_probability": 0.8,
                "momentum_strength_score": 0.8,
                "wave_number": "3"
            }))
        };
        let req = MultiTimeframeRequest {
            rows: vec![bullish("1h", 0.8), bullish("4h", 0.5), bullish("1d", 0.2)],
            wave_states: vec![],
            overrides: None,
        };
        let (status, Json(body)) = post_multi_timeframe(State(state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "NQ");
        assert_eq!(body["interpretations"].as_array().unwrap().len(), 3);
        assert_eq!(body["interpretations"][0]["dominant_bias"], "CONTINUATION");
        assert_eq!(body["globalBiasBanner"], "Market in expansion phase");

        let empty = MultiTimeframeRequest {
            rows: vec![],
            wave_states: vec![],
            overrides: None,
        };
        let (status, _) = post_multi_timeframe(State(state()), Json(empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_version_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        let state = Arc::new(AppState::new(VersionRegistry::default(), Some(path.clone())));

        let create = CreateVersionRequest {
            name: Some("Tight".to_string()),
            values: Some(ThresholdOverrides::from_json(r#"{"conf_high_stack": 0.8}"#).unwrap()),
        };
        let (_, Json(body)) = post_version(State(state.clone()), Json(create)).await;
        assert_eq!(body["activeVersionId"], "v1");
        assert_eq!(body["versions"][0]["values"]["conf_high_stack"], 0.8);
        assert_eq!(VersionRegistry::load(&path).unwrap().versions.len(), 1);

        let (_, Json(body)) = get_thresholds(State(state.clone())).await;
        let thresholds = body["thresholds"].as_array().unwrap();
        assert_eq!(thresholds.len(), 18);
        let stack = thresholds.iter().find(|t| t["key"] == "conf_high_stack").unwrap();
        assert_eq!(stack["value"], 0.8);
        assert_eq!(stack["default"], 0.7);

        let bad = SetActiveRequest {
            id: Some("v7".to_string()),
        };
        let (status, _) = post_active_version(State(state.clone()), Json(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let clear = SetActiveRequest { id: None };
        let (status, Json(body)) = post_active_version(State(state.clone()), Json(clear)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["activeVersionId"].is_null());
        assert!(VersionRegistry::load(&path).unwrap().active_version_id.is_none());

        let (_, Json(body)) = get_versions(State(state)).await;
        assert_eq!(body["versions"][0]["name"], "Tight");
    }
}
