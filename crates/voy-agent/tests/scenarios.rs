// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end turn scenarios against scripted services: evidence-only
//! answers, commercial addons, guardrail rewrites, itinerary routing, and
//! packing-gap vision turns.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use voy_agent::{run_turn, AgentState, Services};
use voy_client::CallContext;
use voy_contract::agent::TurnRequest;
use voy_contract::audio::{SttRequest, SttResponse, TtsRequest, TtsResponse};
use voy_contract::evidence::{EvidenceRequest, EvidenceResponse};
use voy_contract::graph::{GraphRequest, GraphResponse};
use voy_contract::products::{ProductRequest, ProductResponse};
use voy_contract::vision::{VisionRequest, VisionResponse};
use voy_contract::ContractRegistry;
use voy_error::VoyError;
use voy_guardrails::SAFE_FALLBACK;
use voy_memory::MemoryStore;
use voy_telemetry::NoopTracer;

/// Scripted downstream services, configured per scenario.
#[derive(Default)]
struct Scripted {
    evidence: Option<serde_json::Value>,
    products: Option<serde_json::Value>,
    graph: Option<serde_json::Value>,
    vision: Option<serde_json::Value>,
    graph_calls: AtomicU32,
    product_requests: Mutex<Vec<String>>,
}

#[async_trait]
impl Services for Scripted {
    async fn retrieve_travel_evidence(
        &self,
        _request: &EvidenceRequest,
        _ctx: &CallContext,
    ) -> Result<EvidenceResponse, VoyError> {
        match &self.evidence {
            Some(v) => Ok(serde_json::from_value(v.clone()).expect("evidence fixture")),
            None => Err(VoyError::upstream("evidence down")),
        }
    }

    async fn retrieve_product_candidates(
        &self,
        request: &ProductRequest,
        _ctx: &CallContext,
    ) -> Result<ProductResponse, VoyError> {
        self.product_requests
            .lock()
            .unwrap()
            .push(request.query_signature.clone());
        match &self.products {
            Some(v) => Ok(serde_json::from_value(v.clone()).expect("products fixture")),
            None => Err(VoyError::upstream("products down")),
        }
    }

    async fn retrieve_travel_graph(
        &self,
        _request: &GraphRequest,
        _ctx: &CallContext,
    ) -> Result<GraphResponse, VoyError> {
        self.graph_calls.fetch_add(1, Ordering::SeqCst);
        match &self.graph {
            Some(v) => Ok(serde_json::from_value(v.clone()).expect("graph fixture")),
            None => Err(VoyError::upstream("graph down")),
        }
    }

    async fn analyze_image(
        &self,
        _request: &VisionRequest,
        _ctx: &CallContext,
    ) -> Result<VisionResponse, VoyError> {
        match &self.vision {
            Some(v) => Ok(serde_json::from_value(v.clone()).expect("vision fixture")),
            None => Err(VoyError::upstream("vision down")),
        }
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

fn agent(services: Scripted) -> (AgentState, Arc<Scripted>) {
    let services = Arc::new(services);
    let state = AgentState {
        services: services.clone(),
        memory: MemoryStore::new(),
        tracer: Arc::new(NoopTracer),
        registry: Arc::new(ContractRegistry::new()),
    };
    (state, services)
}

fn one_card_evidence() -> serde_json::Value {
    json!({
        "x_contract_version": "1.0",
        "request": {"user_query": "dicas"},
        "evidence": [{
            "card_id": "evid_001_tips",
            "summary": "Best times to visit are early morning.",
            "signals": ["timing"],
            "places": ["Orlando"],
            "categories": ["tips"],
            "primary_category": "tips",
            "confidence": 0.9,
            "source_url": "https://example.com/tips",
        }],
    })
}

fn no_candidates() -> serde_json::Value {
    json!({
        "x_contract_version": "1.0",
        "request": {"query_signature": "s"},
        "candidates": [],
    })
}

// Scenario 1: evidence-only text turn.
#[tokio::test]
async fn evidence_only_text_turn() {
    let (state, _) = agent(Scripted {
        evidence: Some(one_card_evidence()),
        products: Some(no_candidates()),
        ..Default::default()
    });
    let mut turn = TurnRequest::text("dicas para evitar filas no Magic Kingdom");
    turn.destination = Some("Orlando".into());

    let (response, _) = run_turn(&state, turn).await.unwrap();
    assert!(response
        .answer_text
        .contains("Best times to visit are early morning."));
    assert_eq!(response.citations, ["https://example.com/tips"]);
    assert!(response.addon.is_none());
}

// Scenario 2: commercial intent triggers the addon.
#[tokio::test]
async fn commercial_intent_triggers_addon() {
    let (state, _) = agent(Scripted {
        evidence: Some(one_card_evidence()),
        products: Some(json!({
            "x_contract_version": "1.0",
            "request": {"query_signature": "s"},
            "candidates": [{
                "product_id": "p1",
                "summary": "Ticket pack for Magic Kingdom with skip-the-line entry",
                "merchant": "m",
                "link": "https://example.com/tickets",
                "categories": ["tickets"],
                "confidence": 0.9,
            }],
        })),
        ..Default::default()
    });
    let mut turn = TurnRequest::text("quero comprar ingresso Magic Kingdom");
    turn.destination = Some("Orlando".into());

    let (response, _) = run_turn(&state, turn).await.unwrap();
    let addon = response.addon.expect("addon expected");
    assert_eq!(addon.product_id, "p1");
    assert_eq!(addon.link, "https://example.com/tickets");
    assert_eq!(addon.merchant, "m");
}

// Scenario 3: guardrail removes unsourced factual claims. The factual text
// arrives through the vision verdict while every citation-bearing branch is
// down, so the assembled answer has claims and zero citations.
#[tokio::test]
async fn guardrail_removes_unsourced_claims() {
    let (state, _) = agent(Scripted {
        vision: Some(json!({
            "x_contract_version": "1.0",
            "request": {"image_ref": "data:image/jpeg;base64,abc", "mode": "packing"},
            "signals": {
                "mode": "packing",
                "confidence": 0.8,
                "suitability_ok": false,
                "suitability_issue": "You must wear warmer layers, that is the park rule.",
            },
        })),
        ..Default::default()
    });
    let mut turn = TurnRequest::text("Is this outfit okay for Disney?");
    turn.image_ref = Some("data:image/jpeg;base64,abc".into());

    let (response, _) = run_turn(&state, turn).await.unwrap();
    assert_eq!(response.answer_text, SAFE_FALLBACK);
    assert!(response.citations.is_empty());
}

// A missing knowledge branch with no other signal yields the fixed
// empty-result sentence, untouched by guardrails.
#[tokio::test]
async fn all_branches_down_yields_empty_result_sentence() {
    let (state, _) = agent(Scripted::default());
    let (response, _) = run_turn(&state, TurnRequest::text("when to go to Disney"))
        .await
        .unwrap();
    assert!(response.citations.is_empty());
    assert_ne!(response.answer_text, SAFE_FALLBACK);
    assert_eq!(response.answer_text, "No travel evidence found for your query.");
}

// Scenario 4: itinerary keyword routes to the graph exactly once.
#[tokio::test]
async fn itinerary_routes_to_graph_once() {
    let (state, services) = agent(Scripted {
        evidence: Some(one_card_evidence()),
        products: Some(no_candidates()),
        graph: Some(json!({
            "x_contract_version": "1.0",
            "request": {"user_query": "itinerary"},
            "subgraph": {
                "nodes": [
                    {"id": "it1", "type": "itinerary", "name": "Orlando 3 dias"},
                    {"id": "day1", "type": "dayplan", "name": "Day 1"},
                    {"id": "poi_a", "type": "poi", "name": "Magic Kingdom"},
                ],
                "edges": [
                    {
                        "source": "it1", "type": "HAS_DAY", "target": "day1",
                        "evidence": {
                            "videoUrl": "https://youtube.com/watch?v=x",
                            "timestampUrl": "https://youtube.com/watch?v=x&t=60",
                            "startSec": 60, "endSec": 120,
                        },
                    },
                    {
                        "source": "day1", "type": "INCLUDES_POI", "target": "poi_a",
                        "evidence": {
                            "videoUrl": "https://youtube.com/watch?v=x",
                            "timestampUrl": "https://youtube.com/watch?v=x&t=120",
                            "startSec": 120, "endSec": 180,
                        },
                    },
                ],
            },
            "paths": [{
                "path_id": "it1",
                "label": "Day 1",
                "nodes": ["day1", "poi_a"],
                "edges": ["HAS_DAY", "INCLUDES_POI"],
                "evidence": [{
                    "videoUrl": "https://youtube.com/watch?v=x",
                    "timestampUrl": "https://youtube.com/watch?v=x&t=120",
                    "startSec": 120, "endSec": 180,
                }],
            }],
        })),
        ..Default::default()
    });

    let (response, _) = run_turn(
        &state,
        TurnRequest::text("suggest a 3-day itinerary for Orlando"),
    )
    .await
    .unwrap();

    assert_eq!(services.graph_calls.load(Ordering::SeqCst), 1);
    assert!(response.answer_text.contains("Day 1:"));
    assert!(response.citations.iter().any(|c| c.contains("&t=")));
}

// Scenario 6: packing-mode vision with an outfit gap.
#[tokio::test]
async fn packing_gap_turn_populates_addon_and_verdict() {
    let (state, services) = agent(Scripted {
        evidence: Some(one_card_evidence()),
        products: Some(json!({
            "x_contract_version": "1.0",
            "request": {"query_signature": "s"},
            "candidates": [{
                "product_id": "p_jacket",
                "summary": "Packable cold-weather layer for park days",
                "merchant": "outdoor.example",
                "link": "https://example.com/jacket",
                "categories": ["gear"],
                "confidence": 0.85,
            }],
        })),
        vision: Some(json!({
            "x_contract_version": "1.0",
            "request": {"image_ref": "data:image/jpeg;base64,abc", "mode": "packing"},
            "signals": {
                "mode": "packing",
                "confidence": 0.85,
                "suitability_ok": false,
                "suitability_issue": "Too light for Disney in winter.",
                "detected_items": ["light_top", "long_pants"],
                "suggested_categories_for_products": ["insulated_jacket", "warm_top"],
            },
        })),
        ..Default::default()
    });

    let mut turn = TurnRequest::text("Is this outfit okay for Disney in winter?");
    turn.destination = Some("Orlando".into());
    turn.lang = Some("en".into());
    turn.image_ref = Some("data:image/jpeg;base64,abc".into());
    turn.trip_context = Some(json!({"destination": "Orlando", "temp_band": "cold"}));

    let (response, _) = run_turn(&state, turn).await.unwrap();

    assert!(response.answer_text.starts_with("This outfit may not be ideal"));
    assert!(response.answer_text.contains("Too light"));
    assert!(response.answer_text.contains("insulated_jacket"));

    let signatures = services.product_requests.lock().unwrap();
    assert!(signatures[0].starts_with("Orlando:insulated_jacket:en"));

    let addon = response.addon.expect("gap addon expected");
    assert_eq!(addon.product_id, "p_jacket");
}

// Version echo: every healthy branch response already asserted "1.0" at
// deserialization; the assembled response itself revalidates.
#[tokio::test]
async fn assembled_response_revalidates_against_contract() {
    let (state, _) = agent(Scripted {
        evidence: Some(one_card_evidence()),
        products: Some(no_candidates()),
        ..Default::default()
    });
    let (response, _) = run_turn(&state, TurnRequest::text("dicas"))
        .await
        .unwrap();
    let registry = ContractRegistry::new();
    registry
        .validate(&serde_json::to_value(&response).unwrap(), "assembled_response")
        .unwrap();
}
