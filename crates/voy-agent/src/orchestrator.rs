// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-turn orchestrator: route, fan out, convert branch failures into
//! missing signals, assemble deterministically, guard, and time everything.

use crate::assemble::build_answer_and_citations;
use crate::routing::{
    build_spoken_version, infer_vision_mode, infer_voice_mode, is_commercial, packing_gap_query,
    product_query_signature, should_call_graph, similarity_query,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use voy_client::{CallContext, ServiceClient};
use voy_contract::agent::{Addon, AssembledResponse, TurnRequest};
use voy_contract::audio::{SttRequest, SttResponse, TtsRequest, TtsResponse};
use voy_contract::evidence::{EvidenceRequest, EvidenceResponse};
use voy_contract::graph::{GraphRequest, GraphResponse};
use voy_contract::products::{ProductCandidate, ProductRequest, ProductResponse};
use voy_contract::vision::{VisionMode, VisionRequest, VisionResponse};
use voy_contract::ContractRegistry;
use voy_error::VoyError;
use voy_memory::MemoryStore;
use voy_telemetry::{span_tags, Tracer, TurnTimings};

/// The six downstream calls the orchestrator makes; implemented by
/// [`ServiceClient`] in production and by mocks in tests.
#[async_trait]
pub trait Services: Send + Sync {
    /// Evidence retrieval.
    async fn retrieve_travel_evidence(
        &self,
        request: &EvidenceRequest,
        ctx: &CallContext,
    ) -> Result<EvidenceResponse, VoyError>;

    /// Product retrieval.
    async fn retrieve_product_candidates(
        &self,
        request: &ProductRequest,
        ctx: &CallContext,
    ) -> Result<ProductResponse, VoyError>;

    /// Graph retrieval.
    async fn retrieve_travel_graph(
        &self,
        request: &GraphRequest,
        ctx: &CallContext,
    ) -> Result<GraphResponse, VoyError>;

    /// Image analysis.
    async fn analyze_image(
        &self,
        request: &VisionRequest,
        ctx: &CallContext,
    ) -> Result<VisionResponse, VoyError>;

    /// Speech-to-text.
    async fn transcribe(
        &self,
        request: &SttRequest,
        ctx: &CallContext,
    ) -> Result<SttResponse, VoyError>;

    /// Text-to-speech.
    async fn synthesize(
        &self,
        request: &TtsRequest,
        ctx: &CallContext,
    ) -> Result<TtsResponse, VoyError>;
}

#[async_trait]
impl Services for ServiceClient {
    async fn retrieve_travel_evidence(
        &self,
        request: &EvidenceRequest,
        ctx: &CallContext,
    ) -> Result<EvidenceResponse, VoyError> {
        ServiceClient::retrieve_travel_evidence(self, request, ctx).await
    }

    async fn retrieve_product_candidates(
        &self,
        request: &ProductRequest,
        ctx: &CallContext,
    ) -> Result<ProductResponse, VoyError> {
        ServiceClient::retrieve_product_candidates(self, request, ctx).await
    }

    async fn retrieve_travel_graph(
        &self,
        request: &GraphRequest,
        ctx: &CallContext,
    ) -> Result<GraphResponse, VoyError> {
        ServiceClient::retrieve_travel_graph(self, request, ctx).await
    }

    async fn analyze_image(
        &self,
        request: &VisionRequest,
        ctx: &CallContext,
    ) -> Result<VisionResponse, VoyError> {
        ServiceClient::analyze_image(self, request, ctx).await
    }

    async fn transcribe(
        &self,
        request: &SttRequest,
        ctx: &CallContext,
    ) -> Result<SttResponse, VoyError> {
        ServiceClient::transcribe(self, request, ctx).await
    }

    async fn synthesize(
        &self,
        request: &TtsRequest,
        ctx: &CallContext,
    ) -> Result<TtsResponse, VoyError> {
        ServiceClient::synthesize(self, request, ctx).await
    }
}

/// Everything a turn needs; owned by the edge process.
pub struct AgentState {
    /// Downstream services.
    pub services: Arc<dyn Services>,
    /// Session memory.
    pub memory: MemoryStore,
    /// Tracer (noop unless opted in).
    pub tracer: Arc<dyn Tracer>,
    /// Compiled contract registry.
    pub registry: Arc<ContractRegistry>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn addon_from(candidate: &ProductCandidate) -> Addon {
    Addon {
        product_id: candidate.product_id.clone(),
        summary: candidate.summary.clone(),
        link: candidate.link.clone(),
        merchant: candidate.merchant.clone(),
    }
}

/// Run one turn up to (but not including) guardrails. Every branch failure
/// is absorbed as a missing signal; this never errors.
///
/// Returns the raw response, the timings, and the effective user query
/// (the STT transcript when audio replaced the typed text). The eval
/// harness consumes this directly so it can diff the raw answer against the
/// guarded one.
pub async fn run_turn_raw(
    state: &AgentState,
    turn: TurnRequest,
) -> (AssembledResponse, TurnTimings, String) {
    let total_start = Instant::now();
    let mut timings = TurnTimings::default();

    let session_id = turn
        .session_id
        .clone()
        .unwrap_or_else(|| "local-session".into());
    let request_id = turn
        .request_id
        .clone()
        .unwrap_or_else(|| "local-request".into());
    let ctx = CallContext::new(session_id.clone(), request_id.clone());
    let mut user_query = turn.user_query.clone();

    // STT first: a transcript replaces the user query before routing.
    if let Some(audio_ref) = &turn.audio_ref {
        let start = Instant::now();
        let result = state
            .services
            .transcribe(
                &SttRequest {
                    audio_ref: audio_ref.clone(),
                    language: turn.lang.clone(),
                    debug: false,
                },
                &ctx,
            )
            .await;
        timings.stt_ms = elapsed_ms(start);
        if let Ok(response) = result {
            if !response.transcript.trim().is_empty() {
                user_query = response.transcript;
            }
        }
    }

    // Memory updates before the fan-out so its effects reach the first call.
    state.memory.update(&session_id, &user_query, None);
    let memory_summary = state.memory.summary(&session_id);
    let memory_hash = state.memory.memory_hash(&session_id, 8);

    let tags = span_tags(&session_id, &request_id, &user_query);

    let evidence_request = EvidenceRequest {
        user_query: user_query.clone(),
        destination: turn.destination.clone(),
        lang: turn.lang.clone(),
        debug: false,
        strategy_params: Some(json!({
            "version": "v1",
            "memory_summary": memory_summary,
        })),
    };

    let call_graph = should_call_graph(&user_query);
    let vision_mode = infer_vision_mode(&user_query);

    // Evidence, graph, and vision fan out concurrently; each branch absorbs
    // its own failure.
    let evidence_branch = async {
        let start = Instant::now();
        let result = state
            .services
            .retrieve_travel_evidence(&evidence_request, &ctx)
            .await;
        (result.ok(), elapsed_ms(start))
    };

    let graph_branch = async {
        if !call_graph {
            return (None, 0.0);
        }
        let _span = state.tracer.span("graph_mcp_call", &tags);
        let start = Instant::now();
        let result = state
            .services
            .retrieve_travel_graph(
                &GraphRequest {
                    user_query: user_query.clone(),
                    destination: turn.destination.clone(),
                    lang: turn.lang.clone(),
                    limit: None,
                    debug: false,
                },
                &ctx,
            )
            .await;
        (result.ok(), elapsed_ms(start))
    };

    let vision_branch = async {
        let Some(image_ref) = turn.image_ref.clone() else {
            return (None, 0.0);
        };
        let _span = state.tracer.span("vision_mcp_call", &tags);
        let start = Instant::now();
        let result = state
            .services
            .analyze_image(
                &VisionRequest {
                    image_ref,
                    mode: vision_mode,
                    trip_context: turn.trip_context.clone(),
                    user_query: Some(user_query.clone()),
                    lang: turn.lang.clone(),
                    debug: false,
                },
                &ctx,
            )
            .await;
        (result.ok().map(|r| r.signals), elapsed_ms(start))
    };

    let answer_span = state.tracer.span("answer_generation", &tags);
    let ((evidence_response, knowledge_ms), (graph_response, graph_ms), (vision_signals, vision_ms)) =
        tokio::join!(evidence_branch, graph_branch, vision_branch);
    drop(answer_span);

    timings.knowledge_ms = knowledge_ms;
    timings.graph_ms = graph_ms;
    timings.vision_ms = vision_ms;

    // Products: the signature follows the vision result when it produced a
    // sharper query than the raw text.
    let product_span = state.tracer.span("product_decision", &tags);
    let mut signature = vision_signals
        .as_ref()
        .and_then(|signals| {
            similarity_query(signals, turn.destination.as_deref(), turn.lang.as_deref()).or_else(
                || packing_gap_query(signals, turn.destination.as_deref(), turn.lang.as_deref()),
            )
        })
        .unwrap_or_else(|| {
            product_query_signature(
                turn.destination.as_deref(),
                &user_query,
                turn.lang.as_deref(),
            )
        });
    if !memory_hash.is_empty() {
        signature = format!("{signature}|mem:{memory_hash}");
    }

    let products_start = Instant::now();
    let products_response = state
        .services
        .retrieve_product_candidates(
            &ProductRequest {
                query_signature: signature,
                destination: turn.destination.clone(),
                market: turn.market.clone(),
                lang: turn.lang.clone(),
                limit: None,
                min_confidence: None,
            },
            &ctx,
        )
        .await
        .ok();
    timings.products_ms = elapsed_ms(products_start);

    let candidates = products_response
        .map(|response| response.candidates)
        .unwrap_or_default();

    let vision_trigger = match &vision_signals {
        Some(signals) if signals.mode == VisionMode::ProductSimilarity => true,
        Some(signals) if signals.mode == VisionMode::Packing => {
            packing_gap_query(signals, None, None).is_some()
        }
        _ => false,
    };
    let addon = if (is_commercial(&user_query) || vision_trigger) && !candidates.is_empty() {
        Some(addon_from(&candidates[0]))
    } else {
        None
    };
    drop(product_span);

    let evidence = evidence_response
        .map(|response| response.evidence)
        .unwrap_or_default();
    let (answer_text, citations) = build_answer_and_citations(
        &evidence,
        graph_response.as_ref(),
        vision_signals.as_ref(),
    );

    let mut response = AssembledResponse {
        session_id,
        request_id,
        answer_text,
        citations,
        addon,
        audio_ref: None,
        spoken_version: None,
        screen_summary: None,
    };

    if turn.voice_mode {
        let pace = infer_voice_mode(&user_query);
        let spoken = build_spoken_version(&response.answer_text, pace);
        let start = Instant::now();
        let result = state
            .services
            .synthesize(
                &TtsRequest {
                    text: spoken.clone(),
                    voice: None,
                    language: turn.lang.clone(),
                    speed: None,
                    format: None,
                    debug: false,
                },
                &ctx,
            )
            .await;
        timings.tts_ms = elapsed_ms(start);
        if let Ok(tts) = result {
            response.screen_summary = Some(response.answer_text.clone());
            response.spoken_version = Some(spoken);
            response.audio_ref = Some(tts.audio_ref);
        }
    }

    timings.total_ms = elapsed_ms(total_start);
    debug!(target: "voy::agent", total_ms = timings.total_ms, "turn complete");
    (response, timings, user_query)
}

/// Run one turn end to end: the raw pipeline, then guardrails, then
/// outbound validation. The only error this returns is a contract violation
/// of the assembled response, which is a bug, not a downstream failure.
pub async fn run_turn(
    state: &AgentState,
    turn: TurnRequest,
) -> Result<(AssembledResponse, TurnTimings), VoyError> {
    let (raw, timings, effective_query) = run_turn_raw(state, turn).await;
    let response = voy_guardrails::apply(raw, &effective_query);

    let value = serde_json::to_value(&response)
        .map_err(|err| VoyError::parse(format!("response serialization failed: {err}")))?;
    state.registry.validate(&value, "assembled_response")?;
    Ok((response, timings))
}
