// SPDX-License-Identifier: MIT OR Apache-2.0
//! Product-candidates service. The raw (pre-filter) retrieval result is
//! cached; `min_confidence` is applied as a deterministic post-filter on
//! both the hit and miss paths, so tighter thresholds reuse looser cached
//! results. Backend failure serves a stub candidate list that is counted as
//! a fallback and never cached.

use crate::adapter::product_row_to_candidate;
use crate::backend::ProductBackend;
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use voy_cache::{products_key, TtlCache};
use voy_contract::products::{
    filter_by_min_confidence, ProductCandidate, ProductRequest, ProductResponse, ProductScore,
};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-products";

const ROUTE: &str = "/mcp/retrieve_product_candidates";
const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 20;
const MAX_RETURNED: usize = 3;

/// Shared state for the products service.
pub struct ProductsState {
    /// Cache keyed by `(query_signature, market, destination, lang)`.
    pub cache: TtlCache<Vec<ProductCandidate>>,
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The vector-store backend.
    pub backend: Arc<dyn ProductBackend>,
}

/// Build the service router.
pub fn router(state: Arc<ProductsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(retrieve_product_candidates))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<ProductsState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

/// Stub candidates served when the store is unreachable; schema-valid but
/// semantically empty.
fn stub_candidates() -> Vec<ProductCandidate> {
    vec![ProductCandidate {
        product_id: "stub-product-01".into(),
        summary: "Stub product summary for when the store is unavailable.".into(),
        merchant: "Stub Merchant".into(),
        link: "https://example.com/stub1".into(),
        categories: vec!["stub".into()],
        primary_category: Some("stub".into()),
        triggers: Some(vec!["stub".into()]),
        constraints: Some(vec![]),
        affiliate_priority: Some(0.5),
        user_value: Some(0.5),
        confidence: 0.5,
        score: Some(ProductScore {
            distance: Some(0.0),
            rank: Some(1),
        }),
    }]
}

async fn retrieve_product_candidates(
    State(state): State<Arc<ProductsState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ProductResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "product_candidates_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<ProductRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let key = products_key(
        &req.query_signature,
        req.market.as_deref(),
        req.destination.as_deref(),
        req.lang.as_deref(),
    );

    if let Some(raw) = state.cache.get(&key) {
        let candidates = filter_by_min_confidence(raw, req.min_confidence);
        let latency = elapsed_ms(start);
        state.metrics.record_request(true, latency, false);
        RequestRecord::new(SERVICE_NAME, ROUTE, true, latency, session_id, request_id, false)
            .emit();
        return Ok(Json(ProductResponse {
            x_contract_version: CONTRACT_VERSION.into(),
            request: req,
            candidates,
        }));
    }

    let limit = (req.limit.unwrap_or(DEFAULT_LIMIT as u32) as usize).min(MAX_LIMIT);
    let (raw, fallback) = match state.backend.product_cards(&req.query_signature, limit).await {
        Ok(rows) => {
            let candidates: Vec<ProductCandidate> = rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| product_row_to_candidate(row, (i + 1) as u32).ok())
                .take(MAX_RETURNED)
                .collect();
            if candidates.is_empty() {
                (stub_candidates(), true)
            } else {
                state.cache.set(key.clone(), candidates.clone());
                (candidates, false)
            }
        }
        Err(_) => (stub_candidates(), true),
    };

    let candidates = filter_by_min_confidence(raw, req.min_confidence);
    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, fallback);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, fallback)
        .emit();

    Ok(Json(ProductResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        candidates,
    }))
}
