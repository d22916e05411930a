// SPDX-License-Identifier: MIT OR Apache-2.0
//! The session edge: a WebSocket channel carrying one JSON turn in and one
//! assembled response out, plus `POST /feedback` (validated, append-only
//! JSONL) and `GET /health`.

use crate::orchestrator::{run_turn, AgentState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use voy_contract::agent::TurnRequest;

/// Edge process state.
pub struct EdgeState {
    /// The orchestrator.
    pub agent: Arc<AgentState>,
    /// Append-only feedback JSONL path.
    pub feedback_path: PathBuf,
}

/// Build the edge router.
pub fn app(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/feedback", post(feedback))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn ws_upgrade(
    State(state): State<Arc<EdgeState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| session_loop(state, socket))
}

async fn session_loop(state: Arc<EdgeState>, mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let reply = handle_turn_message(&state, &text).await;
        if socket.send(Message::Text(reply.into())).await.is_err() {
            return;
        }
    }
}

/// Handle one raw turn message; always produces exactly one JSON reply.
pub async fn handle_turn_message(state: &EdgeState, text: &str) -> String {
    let turn: TurnRequest = match serde_json::from_str(text) {
        Ok(turn) => turn,
        Err(err) => {
            return json!({"error": format!("invalid turn request: {err}")}).to_string();
        }
    };

    match run_turn(&state.agent, turn).await {
        Ok((response, _timings)) => {
            serde_json::to_string(&response).unwrap_or_else(|err| {
                json!({"error": format!("response serialization failed: {err}")}).to_string()
            })
        }
        Err(err) => {
            error!(target: "voy::edge", error = %err, "turn failed outbound validation");
            json!({"error": err.to_string()}).to_string()
        }
    }
}

/// Append one event line to the feedback JSONL file.
pub async fn append_feedback(path: &PathBuf, event: &serde_json::Value) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = event.to_string();
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await
}

async fn feedback(
    State(state): State<Arc<EdgeState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if let Err(err) = state.agent.registry.validate(&body, "feedback_event") {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": err.to_string()})),
        ));
    }
    if let Err(err) = append_feedback(&state.feedback_path, &body).await {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": err.to_string()})),
        ));
    }
    info!(target: "voy::edge", event_id = %body["event_id"], "feedback stored");
    Ok(Json(json!({"status": "ok"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Services;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use voy_client::CallContext;
    use voy_contract::audio::{SttRequest, SttResponse, TtsRequest, TtsResponse};
    use voy_contract::evidence::{EvidenceRequest, EvidenceResponse};
    use voy_contract::graph::{GraphRequest, GraphResponse};
    use voy_contract::products::{ProductRequest, ProductResponse};
    use voy_contract::vision::{VisionRequest, VisionResponse};
    use voy_contract::ContractRegistry;
    use voy_error::VoyError;
    use voy_memory::MemoryStore;
    use voy_telemetry::NoopTracer;

    struct CannedServices;

    #[async_trait]
    impl Services for CannedServices {
        async fn retrieve_travel_evidence(
            &self,
            request: &EvidenceRequest,
            _ctx: &CallContext,
        ) -> Result<EvidenceResponse, VoyError> {
            Ok(serde_json::from_value(json!({
                "x_contract_version": "1.0",
                "request": {"user_query": request.user_query},
                "evidence": [{
                    "card_id": "evid_001_tips",
                    "summary": "Best times to visit are early morning.",
                    "confidence": 0.9,
                    "source_url": "https://example.com/tips",
                }],
            }))
            .unwrap())
        }

        async fn retrieve_product_candidates(
            &self,
            request: &ProductRequest,
            _ctx: &CallContext,
        ) -> Result<ProductResponse, VoyError> {
            Ok(serde_json::from_value(json!({
                "x_contract_version": "1.0",
                "request": {"query_signature": request.query_signature},
                "candidates": [],
            }))
            .unwrap())
        }

        async fn retrieve_travel_graph(
            &self,
            _request: &GraphRequest,
            _ctx: &CallContext,
        ) -> Result<GraphResponse, VoyError> {
            Err(VoyError::upstream("graph down"))
        }

        async fn analyze_image(
            &self,
            _request: &VisionRequest,
            _ctx: &CallContext,
        ) -> Result<VisionResponse, VoyError> {
            Err(VoyError::upstream("vision down"))
        }

        async fn transcribe(
            &self,
            _request: &SttRequest,
            _ctx: &CallContext,
        ) -> Result<SttResponse, VoyError> {
            Err(VoyError::upstream("stt down"))
        }

        async fn synthesize(
            &self,
            _request: &TtsRequest,
            _ctx: &CallContext,
        ) -> Result<TtsResponse, VoyError> {
            Err(VoyError::upstream("tts down"))
        }
    }

    fn edge_state(dir: &tempfile::TempDir) -> Arc<EdgeState> {
        Arc::new(EdgeState {
            agent: Arc::new(AgentState {
                services: Arc::new(CannedServices),
                memory: MemoryStore::new(),
                tracer: Arc::new(NoopTracer),
                registry: Arc::new(ContractRegistry::new()),
            }),
            feedback_path: dir.path().join("data/feedback/events.jsonl"),
        })
    }

    fn valid_feedback() -> serde_json::Value {
        json!({
            "x_contract_version": "1.0",
            "event_id": "evt_abc12345",
            "timestamp": "2025-02-05T12:00:00Z",
            "session_id": "s01",
            "user_query": "dicas Disney",
            "answer_text": "Visit early morning.",
            "rating": 5,
        })
    }

    #[tokio::test]
    async fn turn_message_round_trips_over_the_channel_contract() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let reply = handle_turn_message(
            &state,
            &json!({
                "session_id": "s1",
                "request_id": "r1",
                "user_query": "dicas para evitar filas no Magic Kingdom",
            })
            .to_string(),
        )
        .await;

        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["session_id"], "s1");
        assert_eq!(parsed["request_id"], "r1");
        assert!(parsed["answer_text"]
            .as_str()
            .unwrap()
            .contains("Best times to visit are early morning."));
        assert_eq!(parsed["citations"][0], "https://example.com/tips");
        assert!(parsed["addon"].is_null());
    }

    #[tokio::test]
    async fn turn_message_defaults_session_ids() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let reply =
            handle_turn_message(&state, &json!({"user_query": "dicas"}).to_string()).await;
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["session_id"], "local-session");
        assert_eq!(parsed["request_id"], "local-request");
    }

    #[tokio::test]
    async fn undecodable_turn_message_yields_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let reply = handle_turn_message(&state, "{not json").await;
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(parsed["error"].is_string());
    }

    #[tokio::test]
    async fn valid_feedback_returns_ok_and_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let path = state.feedback_path.clone();
        let app = app(state);

        let response = app
            .oneshot(
                Request::post("/feedback")
                    .header("content-type", "application/json")
                    .body(Body::from(valid_feedback().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let stored: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(stored["event_id"], "evt_abc12345");
        assert_eq!(stored["rating"], 5);
    }

    #[tokio::test]
    async fn feedback_appends_preserve_earlier_lines() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let path = state.feedback_path.clone();

        append_feedback(&path, &valid_feedback()).await.unwrap();
        let mut second = valid_feedback();
        second["event_id"] = json!("evt_def67890");
        append_feedback(&path, &second).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn invalid_feedback_is_rejected_with_422() {
        let dir = tempfile::tempdir().unwrap();
        let state = edge_state(&dir);
        let app = app(state);

        let mut invalid = valid_feedback();
        invalid["rating"] = json!(99);
        let response = app
            .oneshot(
                Request::post("/feedback")
                    .header("content-type", "application/json")
                    .body(Body::from(invalid.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(edge_state(&dir));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }
}
