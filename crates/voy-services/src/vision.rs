// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vision service. Selects a mode-specific prompt template, parses the
//! model's JSON tolerantly, and coerces the result to the contract: free-form
//! categories are filtered to the 18-item travel set, scene types to the
//! 11-item set, confidence clamped to `[0, 1]`, at most three place
//! candidates. Any decode or API failure becomes `confidence = 0` with an
//! `error` and the requested mode echoed.
//!
//! With no model configured the service answers with deterministic mock
//! signals so the rest of the system can run end-to-end.

use crate::backend::VisionModel;
use crate::prompts;
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use voy_cache::{vision_key, TtlCache};
use voy_contract::vision::{
    is_scene_type, is_travel_category, PlaceCandidate, VisionMode, VisionRequest, VisionResponse,
    VisionSignals,
};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-vision";

const ROUTE: &str = "/mcp/analyze_image";
const MAX_PLACE_CANDIDATES: usize = 3;
const MAX_SEARCH_QUERIES: usize = 3;

/// Shared state for the vision service.
pub struct VisionState {
    /// Cache keyed by `(sha256(image_ref)[..32], mode, trip_context)`.
    pub cache: TtlCache<VisionSignals>,
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The vision model; `None` puts the service in mock mode.
    pub model: Option<Arc<dyn VisionModel>>,
}

/// Build the service router.
pub fn router(state: Arc<VisionState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(analyze_image))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<VisionState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

// -- model-output parsing ---------------------------------------------------

/// Extract the first JSON object from model output, tolerating markdown
/// fences and prose around it.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());
    let object = OBJECT.get_or_init(|| Regex::new(r"\{[\s\S]*\}").unwrap());

    let mut candidate = text.trim().to_string();
    if let Some(caps) = fence.captures(&candidate) {
        candidate = caps[1].trim().to_string();
    }
    if let Some(m) = object.find(&candidate) {
        if let Ok(value) = serde_json::from_str(m.as_str()) {
            return Some(value);
        }
    }
    serde_json::from_str(&candidate).ok()
}

fn clamp01(raw: Option<&serde_json::Value>, default: f64) -> f64 {
    let v = raw.and_then(|v| v.as_f64()).unwrap_or(default);
    v.clamp(0.0, 1.0)
}

fn filtered_categories(raw: Option<&serde_json::Value>) -> Option<Vec<String>> {
    let items = raw?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| is_travel_category(s))
            .map(str::to_string)
            .collect(),
    )
}

fn string_list(raw: Option<&serde_json::Value>) -> Option<Vec<String>> {
    let items = raw?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn parse_packing(raw: &serde_json::Value) -> VisionSignals {
    let mut signals = VisionSignals::empty(VisionMode::Packing);
    signals.confidence = clamp01(raw.get("confidence"), 0.5);
    signals.detected_items = Some(filtered_categories(raw.get("detected_items")).unwrap_or_default());
    signals.missing_categories =
        Some(filtered_categories(raw.get("missing_categories")).unwrap_or_default());
    signals.suitability_ok = raw.get("suitability_ok").and_then(|v| v.as_bool());
    signals.suitability_issue = raw
        .get("suitability_issue")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    signals.suggested_categories_for_products =
        filtered_categories(raw.get("suggested_categories_for_products")).filter(|v| !v.is_empty());
    signals
}

fn parse_landmark(raw: &serde_json::Value) -> VisionSignals {
    let mut signals = VisionSignals::empty(VisionMode::Landmark);
    signals.confidence = clamp01(raw.get("confidence"), 0.5);
    signals.scene_type = raw
        .get("scene_type")
        .and_then(|v| v.as_str())
        .filter(|s| is_scene_type(s))
        .map(str::to_string);
    signals.ocr_text = string_list(raw.get("ocr_text"));
    signals.distinctive_features = string_list(raw.get("distinctive_features"));
    signals.language_hint = raw
        .get("language_hint")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let candidates: Vec<PlaceCandidate> = raw
        .get("place_candidates")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .take(MAX_PLACE_CANDIDATES)
                .filter_map(|c| {
                    let place_name = c.get("place_name")?.as_str()?.trim().to_string();
                    if place_name.is_empty() {
                        return None;
                    }
                    Some(PlaceCandidate {
                        place_name,
                        confidence: c.get("confidence").and_then(|v| v.as_f64()),
                        reason: c.get("reason").and_then(|v| v.as_str()).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    signals.place_candidates = (!candidates.is_empty()).then_some(candidates);
    signals
}

fn parse_product_similarity(raw: &serde_json::Value) -> VisionSignals {
    let mut signals = VisionSignals::empty(VisionMode::ProductSimilarity);
    signals.confidence = clamp01(raw.get("confidence"), 0.5);
    signals.category = raw
        .get("category")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| is_travel_category(s))
        .map(str::to_string);
    signals.attributes = raw.get("attributes").filter(|v| v.is_object()).cloned();
    signals.style_keywords = string_list(raw.get("style_keywords"));
    signals.search_queries =
        string_list(raw.get("search_queries")).map(|qs| qs.into_iter().take(MAX_SEARCH_QUERIES).collect());
    signals
}

/// Coerce raw model JSON to contract signals for the requested mode.
pub fn coerce_signals(mode: VisionMode, raw: &serde_json::Value) -> VisionSignals {
    match mode {
        VisionMode::Packing => parse_packing(raw),
        VisionMode::Landmark => parse_landmark(raw),
        VisionMode::ProductSimilarity => parse_product_similarity(raw),
    }
}

/// Deterministic signals served when no model is configured; they validate
/// against the contract and exercise every downstream path.
pub fn mock_signals(mode: VisionMode) -> VisionSignals {
    match mode {
        VisionMode::Packing => {
            let mut s = VisionSignals::empty(mode);
            s.confidence = 0.9;
            s.detected_items = Some(vec![
                "light_top".into(),
                "long_pants".into(),
                "walking_shoes".into(),
            ]);
            s.missing_categories = Some(vec!["rain_jacket".into()]);
            s.suitability_ok = Some(false);
            s.suitability_issue = Some("Consider adding a layer for rain.".into());
            s.suggested_categories_for_products =
                Some(vec!["rain_jacket".into(), "umbrella".into()]);
            s
        }
        VisionMode::Landmark => {
            let mut s = VisionSignals::empty(mode);
            s.confidence = 0.85;
            s.scene_type = Some("landmark".into());
            s.ocr_text = Some(vec![]);
            s.distinctive_features = Some(vec!["famous tower".into()]);
            s.place_candidates = Some(vec![PlaceCandidate {
                place_name: "Eiffel Tower".into(),
                confidence: Some(0.9),
                reason: Some("Distinctive shape".into()),
            }]);
            s
        }
        VisionMode::ProductSimilarity => {
            let mut s = VisionSignals::empty(mode);
            s.confidence = 0.88;
            s.category = Some("day_bag".into());
            s.attributes = Some(json!({"color": "black", "style": "minimal"}));
            s.style_keywords = Some(vec!["minimal".into(), "urban".into()]);
            s.search_queries = Some(vec![
                "black minimal day bag".into(),
                "urban travel daypack".into(),
            ]);
            s
        }
    }
}

async fn run_model(
    model: &dyn VisionModel,
    req: &VisionRequest,
) -> VisionSignals {
    let (system, user) = match req.mode {
        VisionMode::Packing => (
            prompts::packing_system(req.trip_context.as_ref(), req.user_query.as_deref()),
            prompts::packing_user(req.user_query.as_deref()),
        ),
        VisionMode::Landmark => (
            prompts::landmark_system(),
            prompts::landmark_user(req.user_query.as_deref()),
        ),
        VisionMode::ProductSimilarity => (
            prompts::product_similarity_system(),
            prompts::product_similarity_user(),
        ),
    };

    let text = match model.complete(req.mode, &system, &user, &req.image_ref).await {
        Ok(text) => text,
        Err(err) => return VisionSignals::failed(req.mode, err.to_string()),
    };
    match extract_json(&text) {
        Some(raw) if raw.is_object() => coerce_signals(req.mode, &raw),
        _ => VisionSignals::failed(req.mode, "failed to parse model JSON"),
    }
}

async fn analyze_image(
    State(state): State<Arc<VisionState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<VisionResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "vision_signals_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<VisionRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let key = vision_key(&req.image_ref, req.mode.as_str(), req.trip_context.as_ref());

    if let Some(signals) = state.cache.get(&key) {
        let latency = elapsed_ms(start);
        state.metrics.record_request(true, latency, false);
        RequestRecord::new(SERVICE_NAME, ROUTE, true, latency, session_id, request_id, false)
            .emit();
        let debug = req.debug.then(|| json!({"mode": req.mode.as_str()}));
        return Ok(Json(VisionResponse {
            x_contract_version: CONTRACT_VERSION.into(),
            request: req,
            signals,
            debug,
        }));
    }

    let signals = match &state.model {
        Some(model) => run_model(model.as_ref(), &req).await,
        None => mock_signals(req.mode),
    };

    let failed = signals.error.is_some();
    if !failed {
        state.cache.set(key.clone(), signals.clone());
    }

    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, failed);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, failed)
        .emit();

    let debug = req.debug.then(|| json!({"mode": req.mode.as_str()}));
    Ok(Json(VisionResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        signals,
        debug,
    }))
}
