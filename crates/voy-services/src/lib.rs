// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-services
//!
//! The six retrieval services. Each is an axum router exposing `GET /health`,
//! `GET /metrics`, and one `POST /mcp/<operation>` handler built from the
//! same template:
//!
//! 1. validate the inbound envelope against its contract schema (violations
//!    are the caller's fault: 400);
//! 2. serve from the TTL cache on a hit;
//! 3. otherwise invoke the backend behind its trait; any backend error is
//!    recovered locally into a schema-valid fallback and counted, never
//!    propagated;
//! 4. cache the successful raw result (fallbacks are not cached);
//! 5. record metrics, emit one structured request record, and respond with
//!    `x_contract_version = "1.0"`.

#![deny(unsafe_code)]

/// Store-row adapters for the knowledge and products services.
pub mod adapter;
/// Backend traits the services call through.
pub mod backend;
/// Travel-graph service.
pub mod graph;
/// Travel-evidence service.
pub mod knowledge;
/// OpenAI-compatible model backends (vision, stt, tts).
pub mod openai;
/// Product-candidates service.
pub mod products;
/// Vision prompt templates.
pub mod prompts;
/// HTTP store backends (vector and graph stores).
pub mod stores;
/// Speech-to-text service.
pub mod stt;
/// Text-to-speech service.
pub mod tts;
/// Vision service.
pub mod vision;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Structured error returned to callers; only inbound contract violations
/// and malformed bodies surface this way.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to respond with.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// New error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 — the request violates its contract.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Read the `x-session-id` / `x-request-id` correlation headers.
pub fn session_request_ids(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    (read("x-session-id"), read("x-request-id"))
}

/// `GET /health` body shared by every service.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Milliseconds elapsed since `start`, as f64.
pub fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
