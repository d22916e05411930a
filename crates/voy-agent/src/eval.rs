// SPDX-License-Identifier: MIT OR Apache-2.0
//! Offline evaluation rows: run turns through the raw pipeline, diff the
//! guarded answer against the raw one, and append one JSONL row per query.
//! Rows feed dashboards and regressions; they never influence responses.

use crate::orchestrator::{run_turn_raw, AgentState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use voy_contract::agent::TurnRequest;
use voy_telemetry::{user_query_hash, TurnTimings};

/// One evaluation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRow {
    /// Evaluation run identifier (shared by all rows of one run).
    pub run_id: String,
    /// Row timestamp, RFC 3339.
    pub ts: String,
    /// 16-char query hash; the raw query is never persisted.
    pub user_query_hash: String,
    /// Destination from the query set.
    pub destination: Option<String>,
    /// Final answer length in characters.
    pub answer_chars: usize,
    /// Number of citations after guardrails.
    pub citations_count: usize,
    /// Whether guardrails rewrote the answer or dropped the addon.
    pub guardrails_rewritten: bool,
    /// Inferred bucket of the surviving addon.
    pub addon_bucket: Option<String>,
    /// Whether the graph branch ran.
    pub graph_included: bool,
    /// Whether the vision branch ran.
    pub vision_included: bool,
    /// Vision mode used, when the branch ran.
    pub vision_mode: Option<String>,
    /// Whether a synthesized answer was attached.
    pub audio_included: bool,
    /// Evidence branch latency, ms.
    pub latency_ms_knowledge: f64,
    /// Products branch latency, ms.
    pub latency_ms_products: f64,
    /// Graph branch latency, ms.
    pub latency_ms_graph: f64,
    /// Vision branch latency, ms.
    pub latency_ms_vision: f64,
    /// STT latency, ms.
    pub latency_ms_stt: f64,
    /// TTS latency, ms.
    pub latency_ms_tts: f64,
    /// Whole turn latency, ms.
    pub latency_ms_total: f64,
}

/// Run each query through the pipeline and append one row per query.
/// Returns the number of rows written.
pub async fn run_eval(
    state: &AgentState,
    queries: Vec<TurnRequest>,
    out_path: &Path,
) -> std::io::Result<usize> {
    let run_id = Uuid::new_v4().to_string();
    if let Some(parent) = out_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(out_path)
        .await?;

    let mut written = 0;
    for query in queries {
        let graph_expected = crate::routing::should_call_graph(&query.user_query);
        let vision_expected = query.image_ref.is_some();
        let vision_mode = vision_expected
            .then(|| crate::routing::infer_vision_mode(&query.user_query).as_str().to_string());
        let destination = query.destination.clone();

        let (raw, timings, effective_query) = run_turn_raw(state, query).await;
        let guarded = voy_guardrails::apply(raw.clone(), &effective_query);

        let row = build_row(
            &run_id,
            &effective_query,
            destination,
            &raw,
            &guarded,
            &timings,
            graph_expected,
            vision_expected,
            vision_mode,
        );
        let mut line = serde_json::to_string(&row)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        written += 1;
    }
    Ok(written)
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    run_id: &str,
    effective_query: &str,
    destination: Option<String>,
    raw: &voy_contract::agent::AssembledResponse,
    guarded: &voy_contract::agent::AssembledResponse,
    timings: &TurnTimings,
    graph_included: bool,
    vision_included: bool,
    vision_mode: Option<String>,
) -> EvalRow {
    let guardrails_rewritten = raw.answer_text != guarded.answer_text
        || raw.addon.is_some() != guarded.addon.is_some();
    EvalRow {
        run_id: run_id.to_string(),
        ts: Utc::now().to_rfc3339(),
        user_query_hash: user_query_hash(effective_query),
        destination,
        answer_chars: guarded.answer_text.chars().count(),
        citations_count: guarded.citations.len(),
        guardrails_rewritten,
        addon_bucket: guarded
            .addon
            .as_ref()
            .and_then(voy_guardrails::infer_addon_bucket)
            .map(str::to_string),
        graph_included,
        vision_included,
        vision_mode,
        audio_included: guarded.audio_ref.is_some(),
        latency_ms_knowledge: timings.knowledge_ms,
        latency_ms_products: timings.products_ms,
        latency_ms_graph: timings.graph_ms,
        latency_ms_vision: timings.vision_ms,
        latency_ms_stt: timings.stt_ms,
        latency_ms_tts: timings.tts_ms,
        latency_ms_total: timings.total_ms,
    }
}

/// Load rows back from a JSONL file (for diffs between runs).
pub async fn load_rows(path: &Path) -> std::io::Result<Vec<EvalRow>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Services;
    use async_trait::async_trait;
    use std::sync::Arc;
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

    struct EvidenceOnly;

    #[async_trait]
    impl Services for EvidenceOnly {
        async fn retrieve_travel_evidence(
            &self,
            request: &EvidenceRequest,
            _ctx: &CallContext,
        ) -> Result<EvidenceResponse, VoyError> {
            Ok(serde_json::from_value(serde_json::json!({
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
            Ok(serde_json::from_value(serde_json::json!({
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
            Err(VoyError::upstream("down"))
        }

        async fn analyze_image(
            &self,
            _request: &VisionRequest,
            _ctx: &CallContext,
        ) -> Result<VisionResponse, VoyError> {
            Err(VoyError::upstream("down"))
        }

        async fn transcribe(
            &self,
            _request: &SttRequest,
            _ctx: &CallContext,
        ) -> Result<SttResponse, VoyError> {
            Err(VoyError::upstream("down"))
        }

        async fn synthesize(
            &self,
            _request: &TtsRequest,
            _ctx: &CallContext,
        ) -> Result<TtsResponse, VoyError> {
            Err(VoyError::upstream("down"))
        }
    }

    fn agent_state() -> AgentState {
        AgentState {
            services: Arc::new(EvidenceOnly),
            memory: MemoryStore::new(),
            tracer: Arc::new(NoopTracer),
            registry: Arc::new(ContractRegistry::new()),
        }
    }

    #[tokio::test]
    async fn eval_writes_one_row_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.jsonl");
        let state = agent_state();

        let queries = vec![
            TurnRequest::text("dicas para evitar filas"),
            TurnRequest::text("suggest a 3-day itinerary for Orlando"),
        ];
        let written = run_eval(&state, queries, &out).await.unwrap();
        assert_eq!(written, 2);

        let rows = load_rows(&out).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].graph_included);
        assert!(rows[1].graph_included);
        assert_eq!(rows[0].citations_count, 1);
        assert!(rows[0].latency_ms_total >= 0.0);
        assert_eq!(rows[0].run_id, rows[1].run_id);
    }

    #[tokio::test]
    async fn rows_never_carry_the_raw_query() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.jsonl");
        let state = agent_state();
        run_eval(
            &state,
            vec![TurnRequest::text("very secret query about Orlando")],
            &out,
        )
        .await
        .unwrap();

        let raw = tokio::fs::read_to_string(&out).await.unwrap();
        assert!(!raw.contains("very secret query"));
        let rows = load_rows(&out).await.unwrap();
        assert_eq!(rows[0].user_query_hash.len(), 16);
    }

    #[tokio::test]
    async fn vision_fields_populate_when_image_present() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.jsonl");
        let state = agent_state();
        let mut query = TurnRequest::text("what to pack for Orlando?");
        query.image_ref = Some("data:image/jpeg;base64,abc".into());
        run_eval(&state, vec![query], &out).await.unwrap();

        let rows = load_rows(&out).await.unwrap();
        assert!(rows[0].vision_included);
        assert_eq!(rows[0].vision_mode.as_deref(), Some("packing"));
        assert!(rows[0].latency_ms_vision >= 0.0);
    }
}
