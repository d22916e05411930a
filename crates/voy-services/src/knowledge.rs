// SPDX-License-Identifier: MIT OR Apache-2.0
//! Travel-evidence service: near-text retrieval over recommendation cards,
//! cache-wrapped and contract-validated. Backend failure degrades to an
//! empty evidence list that still validates.

use crate::adapter::card_row_to_evidence;
use crate::backend::EvidenceBackend;
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use voy_cache::{evidence_key, TtlCache};
use voy_contract::evidence::{EvidenceCard, EvidenceRequest, EvidenceResponse};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-knowledge";

const ROUTE: &str = "/mcp/retrieve_travel_evidence";
const RETRIEVAL_LIMIT: usize = 5;

/// Shared state for the knowledge service.
pub struct KnowledgeState {
    /// Cache keyed by `(user_query, destination, lang, strategy_version)`.
    pub cache: TtlCache<Vec<EvidenceCard>>,
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The vector-store backend.
    pub backend: Arc<dyn EvidenceBackend>,
}

/// Build the service router.
pub fn router(state: Arc<KnowledgeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(retrieve_travel_evidence))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<KnowledgeState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

async fn retrieve_travel_evidence(
    State(state): State<Arc<KnowledgeState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<EvidenceResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "travel_evidence_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<EvidenceRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let key = evidence_key(
        &req.user_query,
        req.destination.as_deref(),
        req.lang.as_deref(),
        &req.strategy_version(),
    );

    if let Some(evidence) = state.cache.get(&key) {
        let latency = elapsed_ms(start);
        state.metrics.record_request(true, latency, false);
        RequestRecord::new(SERVICE_NAME, ROUTE, true, latency, session_id, request_id, false)
            .emit();
        let debug = req.debug.then(|| json!({"evidence_count": evidence.len()}));
        return Ok(Json(EvidenceResponse {
            x_contract_version: CONTRACT_VERSION.into(),
            request: req,
            expanded_queries: None,
            evidence,
            debug,
        }));
    }

    let (evidence, fallback) = match state
        .backend
        .recommendation_cards(&req.user_query, RETRIEVAL_LIMIT)
        .await
    {
        Ok(rows) => {
            let cards: Vec<EvidenceCard> = rows
                .iter()
                .filter_map(|row| card_row_to_evidence(row).ok())
                .collect();
            state.cache.set(key.clone(), cards.clone());
            (cards, false)
        }
        Err(_) => (Vec::new(), true),
    };

    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, fallback);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, fallback)
        .emit();

    let debug = req.debug.then(|| json!({"evidence_count": evidence.len()}));
    Ok(Json(EvidenceResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        expanded_queries: None,
        evidence,
        debug,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreRow;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;
    use voy_error::VoyError;

    struct MockBackend {
        calls: AtomicU32,
        fail: bool,
    }

    impl MockBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EvidenceBackend for MockBackend {
        async fn recommendation_cards(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<StoreRow>, VoyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VoyError::upstream("store down"));
            }
            Ok(vec![StoreRow {
                id: "550e8400-e29b-41d4-a716-446655440000".into(),
                properties: serde_json::json!({
                    "summary": "Best times to visit are early morning or late evening.",
                    "signals": ["crowd_avoidance"],
                    "places": ["Orlando"],
                    "categories": ["tips"],
                    "primaryCategory": "tips",
                    "confidence": 0.85,
                    "timestampUrl": "https://example.com/watch?v=abc123",
                }),
                distance: None,
            }])
        }
    }

    fn state_with(backend: MockBackend) -> (Arc<KnowledgeState>, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let state = Arc::new(KnowledgeState {
            cache: TtlCache::new(Duration::from_secs(300)),
            metrics: ServiceMetrics::new(),
            registry: Arc::new(ContractRegistry::new()),
            backend: backend.clone(),
        });
        (state, backend)
    }

    async fn post_request(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post(ROUTE)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn payload(query: &str, destination: Option<&str>) -> serde_json::Value {
        let mut request = serde_json::json!({"user_query": query});
        if let Some(d) = destination {
            request["destination"] = serde_json::json!(d);
        }
        serde_json::json!({"x_contract_version": "1.0", "request": request})
    }

    #[tokio::test]
    async fn response_validates_and_echoes_version() {
        let (state, _) = state_with(MockBackend::ok());
        let registry = state.registry.clone();
        let (status, body) = post_request(router(state), payload("disney tips", Some("Orlando"))).await;
        assert_eq!(status, StatusCode::OK);
        registry.validate(&body, "travel_evidence").unwrap();
        assert_eq!(body["x_contract_version"], "1.0");
        assert_eq!(body["evidence"][0]["source_url"], "https://example.com/watch?v=abc123");
    }

    #[tokio::test]
    async fn second_identical_request_served_from_cache() {
        let (state, backend) = state_with(MockBackend::ok());
        let app = router(state.clone());
        let body = payload("disney tips", Some("Orlando"));
        post_request(app.clone(), body.clone()).await;
        post_request(app, body).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let snapshot = state.metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.cache_hits_total, 1);
    }

    #[tokio::test]
    async fn different_destination_busts_cache() {
        let (state, backend) = state_with(MockBackend::ok());
        let app = router(state.clone());
        post_request(app.clone(), payload("disney tips", Some("Orlando"))).await;
        post_request(app, payload("disney tips", Some("Paris"))).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.metrics.snapshot().cache_hits_total, 0);
    }

    #[tokio::test]
    async fn backend_failure_returns_empty_valid_fallback() {
        let (state, _) = state_with(MockBackend::failing());
        let registry = state.registry.clone();
        let (status, body) = post_request(router(state.clone()), payload("disney tips", None)).await;
        assert_eq!(status, StatusCode::OK);
        registry.validate(&body, "travel_evidence").unwrap();
        assert_eq!(body["evidence"].as_array().unwrap().len(), 0);
        assert_eq!(state.metrics.snapshot().backend_fallback_total, 1);
    }

    #[tokio::test]
    async fn fallback_is_not_cached() {
        let (state, backend) = state_with(MockBackend::failing());
        let app = router(state.clone());
        let body = payload("disney tips", None);
        post_request(app.clone(), body.clone()).await;
        post_request(app, body).await;
        // Second request retried the backend rather than hitting the cache.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.metrics.snapshot().cache_hits_total, 0);
        assert_eq!(state.metrics.snapshot().backend_fallback_total, 2);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_with_400() {
        let (state, _) = state_with(MockBackend::ok());
        let (status, body) = post_request(
            router(state),
            serde_json::json!({"x_contract_version": "1.0", "request": {}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("error").is_some());
    }

    #[tokio::test]
    async fn debug_flag_adds_evidence_count() {
        let (state, _) = state_with(MockBackend::ok());
        let (_, body) = post_request(
            router(state),
            serde_json::json!({
                "x_contract_version": "1.0",
                "request": {"user_query": "disney tips", "debug": true},
            }),
        )
        .await;
        assert_eq!(body["debug"]["evidence_count"], 1);
    }

    #[tokio::test]
    async fn health_and_metrics_endpoints() {
        let (state, _) = state_with(MockBackend::ok());
        let app = router(state);
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("requests_total").is_some());
        assert!(body.get("cache_hits_total").is_some());
        assert!(body.get("backend_fallback_total").is_some());
        assert!(body.get("avg_latency_ms").is_some());
    }
}
