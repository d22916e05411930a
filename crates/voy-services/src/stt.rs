// SPDX-License-Identifier: MIT OR Apache-2.0
//! Speech-to-text service. The audio reference is either a
//! `data:audio/...;base64,<payload>` URL or an HTTP(S) URL; it is decoded or
//! fetched into bytes tagged with a format inferred from the MIME prefix.
//! Decode and API failures produce a schema-valid response with an empty
//! transcript and `error` set.

use crate::backend::{SttModel, Transcription};
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use std::sync::Arc;
use std::time::Instant;
use voy_contract::audio::{SttRequest, SttResponse};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_error::VoyError;
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-stt";

const ROUTE: &str = "/mcp/transcribe";

/// Shared state for the STT service.
pub struct SttState {
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The STT model; `None` puts the service in mock mode.
    pub model: Option<Arc<dyn SttModel>>,
    /// Client used to fetch HTTP audio references.
    pub http: reqwest::Client,
}

/// Build the service router.
pub fn router(state: Arc<SttState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(transcribe))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<SttState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

/// Map an `audio/*` MIME type to the format hint handed to the model.
pub fn format_from_mime(mime: &str) -> &'static str {
    match mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" => "wav",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/m4a" => "m4a",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

/// Decode a data-URL audio reference into `(bytes, format)`.
pub fn decode_data_url(audio_ref: &str) -> Result<(Vec<u8>, String), VoyError> {
    let (prefix, b64) = audio_ref
        .split_once(',')
        .ok_or_else(|| VoyError::parse("invalid data URL: missing base64 payload"))?;
    if b64.is_empty() {
        return Err(VoyError::parse("invalid data URL: missing base64 payload"));
    }
    let mime = prefix
        .trim_start_matches("data:")
        .split(';')
        .find(|part| part.starts_with("audio/"))
        .unwrap_or("");
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|err| VoyError::parse(format!("invalid base64 audio payload: {err}")))?;
    Ok((bytes, format_from_mime(mime).to_string()))
}

/// Decode or fetch an audio reference into `(bytes, format)`.
pub async fn resolve_audio_ref(
    audio_ref: &str,
    http: &reqwest::Client,
) -> Result<(Vec<u8>, String), VoyError> {
    let reference = audio_ref.trim();
    if reference.starts_with("data:") {
        return decode_data_url(reference);
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        let response = http
            .get(reference)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("audio fetch failed: {err}")))?;
        let mime = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| VoyError::upstream(format!("audio fetch failed: {err}")))?;
        return Ok((bytes.to_vec(), format_from_mime(&mime).to_string()));
    }
    Err(VoyError::parse("audio_ref must be a data URL or HTTP(S) URL"))
}

fn mock_response(req: SttRequest) -> SttResponse {
    let language = req.language.clone().or_else(|| Some("en".into()));
    SttResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        transcript: "[Mock transcript: audio received]".into(),
        language,
        confidence: Some(0.95),
        duration_seconds: None,
        error: None,
        debug: None,
    }
}

async fn transcribe(
    State(state): State<Arc<SttState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SttResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "stt_transcript_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<SttRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let response = match &state.model {
        None => mock_response(req),
        Some(model) => match resolve_audio_ref(&req.audio_ref, &state.http).await {
            Err(err) => SttResponse::failed(req, err.to_string()),
            Ok((bytes, format)) => {
                match model
                    .transcribe(bytes, &format, req.language.as_deref())
                    .await
                {
                    Err(err) => SttResponse::failed(req, err.to_string()),
                    Ok(Transcription {
                        text,
                        language,
                        confidence,
                        duration_seconds,
                    }) => SttResponse {
                        x_contract_version: CONTRACT_VERSION.into(),
                        language: language.or_else(|| req.language.clone()),
                        request: req,
                        transcript: text,
                        confidence,
                        duration_seconds,
                        error: None,
                        debug: None,
                    },
                }
            }
        },
    };

    let failed = response.error.is_some();
    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, failed);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, failed)
        .emit();

    Ok(Json(response))
}
