// SPDX-License-Identifier: MIT OR Apache-2.0
//! Travel-graph service. Retrieval runs in two phases: seed `Entity` nodes
//! by lowercase containment match on name/aliases, then fetch `REL` edges
//! restricted to the seeded ids. Edge evidence arrives as the JSON string
//! written at ingestion time and is decoded here.
//!
//! When the store is unreachable the service returns a minimal mock subgraph
//! (one node, one edge, placeholder evidence) that still validates, so
//! downstream assembly never breaks. Mock results are not cached.

use crate::backend::{GraphBackend, RawEdge, RawNode};
use crate::{elapsed_ms, health, session_request_ids, ApiError};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use voy_cache::{graph_key, TtlCache};
use voy_contract::graph::{
    EdgeEvidence, GraphEdge, GraphNode, GraphRequest, GraphResponse, PathItem, Subgraph,
};
use voy_contract::{ContractRegistry, Envelope, CONTRACT_VERSION};
use voy_error::VoyError;
use voy_telemetry::{RequestRecord, ServiceMetrics};

/// Service name used in logs.
pub const SERVICE_NAME: &str = "travel-graph";

const ROUTE: &str = "/mcp/retrieve_travel_graph";
const DEFAULT_LIMIT: usize = 20;
const MAX_NODE_LIMIT: usize = 50;
const MAX_EDGE_LIMIT: usize = 100;
const MAX_PATHS: usize = 3;

/// Cached value: the subgraph plus its precomputed paths.
#[derive(Clone)]
pub struct CachedGraph {
    /// Retrieved subgraph.
    pub subgraph: Subgraph,
    /// Precomputed narrative paths, when any.
    pub paths: Option<Vec<PathItem>>,
}

/// Shared state for the graph service.
pub struct GraphState {
    /// Cache keyed by `(user_query, destination, lang)`.
    pub cache: TtlCache<CachedGraph>,
    /// Request counters.
    pub metrics: ServiceMetrics,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
    /// The graph-store backend.
    pub backend: Arc<dyn GraphBackend>,
}

/// Build the service router.
pub fn router(state: Arc<GraphState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(ROUTE, post(retrieve_travel_graph))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<GraphState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}

// -- store-row mapping ------------------------------------------------------

fn raw_node_to_contract(raw: &RawNode) -> Result<GraphNode, VoyError> {
    if raw.id.len() < 2 {
        return Err(VoyError::parse("node id must have min length 2"));
    }
    if raw.name.is_empty() {
        return Err(VoyError::parse("node must have a name"));
    }
    // Older rows store properties as a JSON string.
    let properties: BTreeMap<String, serde_json::Value> = match &raw.properties {
        serde_json::Value::Object(map) => map.clone().into_iter().collect(),
        serde_json::Value::String(s) if !s.is_empty() => {
            serde_json::from_str(s).unwrap_or_default()
        }
        _ => BTreeMap::new(),
    };
    Ok(GraphNode {
        id: raw.id.clone(),
        node_type: raw.node_type.clone(),
        name: raw.name.clone(),
        aliases: raw.aliases.clone(),
        properties,
    })
}

fn raw_edge_to_contract(raw: &RawEdge) -> Result<GraphEdge, VoyError> {
    let evidence_value: serde_json::Value = match &raw.evidence {
        serde_json::Value::String(s) => serde_json::from_str(s)
            .map_err(|_| VoyError::parse("REL evidence must be valid JSON"))?,
        other => other.clone(),
    };
    let video_url = evidence_value
        .get("videoUrl")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let timestamp_url = evidence_value
        .get("timestampUrl")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if video_url.len() < 8 || timestamp_url.len() < 8 {
        return Err(VoyError::parse(
            "evidence must carry videoUrl and timestampUrl of min length 8",
        ));
    }
    let evidence = EdgeEvidence {
        video_url,
        timestamp_url,
        start_sec: evidence_value
            .get("startSec")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        end_sec: evidence_value
            .get("endSec")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        chunk_idx: evidence_value
            .get("chunkIdx")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
    };
    Ok(GraphEdge {
        source: raw.source.clone(),
        edge_type: raw.edge_type.clone(),
        target: raw.target.clone(),
        properties: evidence_value
            .get("properties")
            .and_then(|v| v.as_object())
            .map(|m| m.clone().into_iter().collect())
            .unwrap_or_default(),
        evidence,
    })
}

/// A minimal mock subgraph that validates against the contract.
pub fn mock_subgraph() -> Subgraph {
    Subgraph {
        nodes: vec![GraphNode {
            id: "poi:mock_poi".into(),
            node_type: "poi".into(),
            name: "Mock POI".into(),
            aliases: vec![],
            properties: BTreeMap::new(),
        }],
        edges: vec![GraphEdge {
            source: "itinerary:mock".into(),
            edge_type: "INCLUDES_POI".into(),
            target: "poi:mock_poi".into(),
            properties: BTreeMap::new(),
            evidence: EdgeEvidence {
                video_url: "https://example.com/watch?v=mock".into(),
                timestamp_url: "https://example.com/watch?v=mock&t=0".into(),
                start_sec: 0,
                end_sec: 60,
                chunk_idx: Some(0),
            },
        }],
    }
}

/// Compute up to three `itinerary —HAS_DAY→ dayplan —INCLUDES_POI→ poi`
/// narrative paths from a subgraph.
pub fn compute_paths(subgraph: &Subgraph) -> Vec<PathItem> {
    if subgraph.nodes.is_empty() && subgraph.edges.is_empty() {
        return Vec::new();
    }
    let node_ids: std::collections::HashSet<&str> =
        subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut paths = Vec::new();

    let itineraries = subgraph.nodes.iter().filter(|n| n.node_type == "itinerary");
    for itinerary in itineraries.take(MAX_PATHS) {
        let mut path_nodes = vec![itinerary.id.clone()];
        let mut path_edges = Vec::new();
        let mut path_evidence = Vec::new();

        if let Some(day_edge) = subgraph
            .edges
            .iter()
            .find(|e| e.source == itinerary.id && e.edge_type == "HAS_DAY")
        {
            path_nodes.push(day_edge.target.clone());
            path_edges.push(day_edge.edge_type.clone());
            path_evidence.push(day_edge.evidence.clone());

            for poi_edge in subgraph.edges.iter().filter(|e| {
                e.source == day_edge.target
                    && e.edge_type == "INCLUDES_POI"
                    && node_ids.contains(e.target.as_str())
            }) {
                path_nodes.push(poi_edge.target.clone());
                path_edges.push(poi_edge.edge_type.clone());
                path_evidence.push(poi_edge.evidence.clone());
            }
        }

        if path_nodes.len() > 1 {
            paths.push(PathItem {
                path_id: itinerary.id.clone(),
                label: Some(itinerary.name.clone()),
                nodes: path_nodes,
                edges: path_edges,
                evidence: path_evidence,
            });
        }
    }
    paths
}

async fn fetch_subgraph(
    backend: &dyn GraphBackend,
    user_query: &str,
    limit: usize,
) -> Result<Subgraph, VoyError> {
    let term = user_query.trim().to_lowercase();
    let node_limit = limit.min(MAX_NODE_LIMIT);

    let mut raw_nodes = backend.seed_nodes(&term, node_limit).await?;
    if raw_nodes.is_empty() {
        raw_nodes = backend.any_nodes(node_limit).await?;
    }

    let nodes: Vec<GraphNode> = raw_nodes
        .iter()
        .filter_map(|raw| raw_node_to_contract(raw).ok())
        .collect();
    if nodes.is_empty() {
        return Ok(Subgraph::default());
    }

    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let raw_edges = backend
        .edges_between(&ids, (limit * 2).min(MAX_EDGE_LIMIT))
        .await?;
    let edges: Vec<GraphEdge> = raw_edges
        .iter()
        .filter_map(|raw| raw_edge_to_contract(raw).ok())
        .collect();

    Ok(Subgraph { nodes, edges })
}

async fn retrieve_travel_graph(
    State(state): State<Arc<GraphState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<GraphResponse>, ApiError> {
    let (session_id, request_id) = session_request_ids(&headers);
    let start = Instant::now();

    state
        .registry
        .validate(&body, "graph_rag_request")
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let envelope: Envelope<GraphRequest> = serde_json::from_value(body)
        .map_err(|err| ApiError::contract_violation(err.to_string()))?;
    let req = envelope.request;

    let key = graph_key(&req.user_query, req.destination.as_deref(), req.lang.as_deref());

    if let Some(cached) = state.cache.get(&key) {
        let latency = elapsed_ms(start);
        state.metrics.record_request(true, latency, false);
        RequestRecord::new(SERVICE_NAME, ROUTE, true, latency, session_id, request_id, false)
            .emit();
        let debug = req.debug.then(|| {
            json!({
                "node_count": cached.subgraph.nodes.len(),
                "edge_count": cached.subgraph.edges.len(),
            })
        });
        return Ok(Json(GraphResponse {
            x_contract_version: CONTRACT_VERSION.into(),
            request: req,
            subgraph: cached.subgraph,
            paths: cached.paths,
            debug,
        }));
    }

    let limit = req.limit.unwrap_or(DEFAULT_LIMIT as u32) as usize;
    let (subgraph, fallback) = match fetch_subgraph(state.backend.as_ref(), &req.user_query, limit)
        .await
    {
        Ok(subgraph) => (subgraph, false),
        Err(_) => (mock_subgraph(), true),
    };

    let paths = compute_paths(&subgraph);
    let paths = (!paths.is_empty()).then_some(paths);

    if !fallback {
        state.cache.set(
            key.clone(),
            CachedGraph {
                subgraph: subgraph.clone(),
                paths: paths.clone(),
            },
        );
    }

    let latency = elapsed_ms(start);
    state.metrics.record_request(false, latency, fallback);
    RequestRecord::new(SERVICE_NAME, ROUTE, false, latency, session_id, request_id, fallback)
        .emit();

    let debug = req.debug.then(|| {
        json!({
            "node_count": subgraph.nodes.len(),
            "edge_count": subgraph.edges.len(),
        })
    });
    Ok(Json(GraphResponse {
        x_contract_version: CONTRACT_VERSION.into(),
        request: req,
        subgraph,
        paths,
        debug,
    }))
}
