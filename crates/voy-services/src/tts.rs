// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text-to-speech service. The contract requires a non-empty `audio_ref`;
//! every failure path returns the placeholder data URL with `error` set.

use crate::backend::TtsModel;
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use std::sync::Arc;
use std::time::Instant;
use voy_contract::audio::{AudioFormat, TtsRequest, TtsResponse};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-tts";

const ROUTE: &str = "/mcp/synthesize";

/// Voices accepted by the backing model.
pub const TTS_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Shared state for the TTS service.
pub struct TtsState {
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The TTS model; `None` puts the service in mock mode.
    pub model: Option<Arc<dyn TtsModel>>,
    /// Default voice when the request names none (or an unknown one).
    pub default_voice: String,
}

/// Build the service router.
pub fn router(state: Arc<TtsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(synthesize))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<TtsState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

/// Resolve the effective voice: the requested one (lowercased) when known,
/// else the default.
pub fn resolve_voice(requested: Option<&str>, default_voice: &str) -> String {
    match requested.map(str::to_lowercase) {
        Some(v) if TTS_VOICES.contains(&v.as_str()) => v,
        _ => default_voice.to_string(),
    }
}

fn mock_response(req: TtsRequest) -> TtsResponse {
    let format = req.format.unwrap_or(AudioFormat::Mp3);
    let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 0, 0]);
    TtsResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        audio_ref: format!("data:audio/{format};base64,{b64}"),
        format: Some(format),
        duration_seconds: None,
        error: None,
        debug: None,
    }
}

async fn synthesize(
    State(state): State<Arc<TtsState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<TtsResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "tts_audio_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<TtsRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let response = match &state.model {
        None => mock_response(req),
        Some(model) => {
            let voice = resolve_voice(req.voice.as_deref(), &state.default_voice);
            let format = req.format.unwrap_or(AudioFormat::Mp3);
            let speed = req.speed.unwrap_or(1.0);
            match model
                .synthesize(&req.text, &voice, format.as_str(), speed)
                .await
            {
                Err(err) => TtsResponse::failed(req, err.to_string()),
                Ok(bytes) if bytes.is_empty() => TtsResponse::failed(req, "empty audio response"),
                Ok(bytes) => {
                    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    TtsResponse {
                        x_contract_version: CONTRACT_VERSION.into(),
                        request: req,
                        audio_ref: format!("data:audio/{format};base64,{b64}"),
                        format: Some(format),
                        duration_seconds: None,
                        error: None,
                        debug: None,
                    }
                }
            }
        }
    };

    let failed = response.error.is_some();
    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, failed);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, failed)
        .emit();

    Ok(Json(response))
}
