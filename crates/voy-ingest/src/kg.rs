// SPDX-License-Identifier: MIT OR Apache-2.0
//! Knowledge-graph extraction from transcript chunks, strictly grounded in
//! the chunk text, plus the deterministic cross-chunk merge.
//!
//! Extraction is filtered to the closed node/edge type sets; node ids must
//! be `<type>:<slug>`. The merge dedupes nodes by id (aliases become the
//! sorted union, properties keep first-seen values) and edges by
//! `(type, source, target, startSec, endSec)`; merged nodes are sorted by id.

use crate::ids::timestamp_url;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use voy_config::ModelConfig;
use voy_contract::graph::{EdgeEvidence, EdgeType, GraphEdge, GraphNode, NodeType};
use voy_error::VoyError;

/// The chunk being extracted, with the video coordinates every edge must
/// carry as evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContext {
    /// Source video URL.
    pub video_url: String,
    /// Chunk index within the video.
    pub chunk_idx: u32,
    /// Chunk start, seconds.
    pub start_sec: u32,
    /// Chunk end, seconds.
    pub end_sec: u32,
    /// Chunk text.
    pub text: String,
    /// Destination hint, when known.
    pub destination_hint: Option<String>,
}

/// Nodes and edges extracted from one chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphExtraction {
    /// Extracted nodes.
    pub nodes: Vec<GraphNode>,
    /// Extracted edges with evidence.
    pub edges: Vec<GraphEdge>,
}

/// The extraction seam: an LLM in production, canned in tests.
#[async_trait]
pub trait GraphExtractor: Send + Sync {
    /// Extract grounded nodes/edges from one chunk. Parse or validation
    /// failure yields an empty extraction, never an error.
    async fn extract(&self, context: &ChunkContext) -> GraphExtraction;
}

/// Drop nodes/edges outside the allow-lists or with malformed identities.
pub fn filter_extraction(extraction: GraphExtraction) -> GraphExtraction {
    let nodes: Vec<GraphNode> = extraction
        .nodes
        .into_iter()
        .filter(|n| n.node_type.parse::<NodeType>().is_ok() && n.id.contains(':'))
        .collect();
    let edges: Vec<GraphEdge> = extraction
        .edges
        .into_iter()
        .filter(|e| {
            e.edge_type.parse::<EdgeType>().is_ok() && !e.source.is_empty() && !e.target.is_empty()
        })
        .collect();
    GraphExtraction { nodes, edges }
}

/// The merged single-video graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedGraph {
    /// Nodes, sorted by id.
    pub nodes: Vec<GraphNode>,
    /// Edges, unique by `(type, source, target, startSec, endSec)`, in
    /// first-seen order.
    pub edges: Vec<GraphEdge>,
}

/// Merge per-chunk extractions into one graph.
pub fn merge_graph(extractions: &[GraphExtraction]) -> MergedGraph {
    let mut node_map: BTreeMap<String, GraphNode> = BTreeMap::new();
    let mut edge_keys: std::collections::HashSet<(String, String, String, u32, u32)> =
        std::collections::HashSet::new();
    let mut edges = Vec::new();

    for extraction in extractions {
        for node in &extraction.nodes {
            match node_map.get_mut(&node.id) {
                None => {
                    node_map.insert(node.id.clone(), node.clone());
                }
                Some(existing) => {
                    let mut aliases: Vec<String> = existing
                        .aliases
                        .iter()
                        .chain(node.aliases.iter())
                        .cloned()
                        .collect();
                    aliases.sort();
                    aliases.dedup();
                    existing.aliases = aliases;
                    for (k, v) in &node.properties {
                        existing
                            .properties
                            .entry(k.clone())
                            .or_insert_with(|| v.clone());
                    }
                }
            }
        }
        for edge in &extraction.edges {
            let key = (
                edge.edge_type.clone(),
                edge.source.clone(),
                edge.target.clone(),
                edge.evidence.start_sec,
                edge.evidence.end_sec,
            );
            if edge_keys.insert(key) {
                edges.push(edge.clone());
            }
        }
    }

    MergedGraph {
        nodes: node_map.into_values().collect(),
        edges,
    }
}

// ---------------------------------------------------------------------------
// LLM extractor
// ---------------------------------------------------------------------------

const EXTRACTION_SYSTEM: &str = r#"You are extracting a travel knowledge graph from ONE transcript chunk.

You MUST follow ALL rules below:

GROUNDING (NO HALLUCINATION)
- Use ONLY what is explicitly supported by the chunk text.
- Do NOT add external facts unless the chunk literally says them.

NODE TYPES (allowed)
- city, place, poi, itinerary, dayplan, activity_type, advice, constraint

NODE ID FORMAT
- id: "<type>:<slug>"; slug lowercase, accents removed, spaces -> "_", only [a-z0-9_]

PLACE vs POI (strict)
- place: neighborhoods, streets, squares, regions
- poi: visitable attractions/venues

PROPERTIES
- Keep properties minimal. Prefer {}. Only values directly stated in the chunk.

EDGE TYPES (allowed)
ITINERARY_FOR, HAS_DAY, INCLUDES_POI, IN_AREA, ORDER_BEFORE, CLUSTERED_BY,
SUGGESTED_DAYS, HAS_ACTIVITY_TYPE, HAS_ADVICE, HAS_CONSTRAINT

EDGE DIRECTION (strict conventions)
- itinerary --ITINERARY_FOR--> city
- itinerary --HAS_DAY--> dayplan
- dayplan --INCLUDES_POI--> poi
- poi/place --IN_AREA--> place/city

ORDER_BEFORE (very strict)
- Only when the chunk clearly indicates sequence; earlier thing as source.

NOISE FILTER
- Ignore channel/meta/CTA content and corrupted entity names.

EVIDENCE (required for every edge)
- Every edge MUST include evidence: {videoUrl, startSec, endSec, chunkIdx, timestampUrl}

OUTPUT
Return ONLY valid JSON: {"nodes":[...], "edges":[...]}. No markdown. No commentary."#;

/// Extractor backed by an OpenAI-compatible chat API.
pub struct LlmGraphExtractor {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmGraphExtractor {
    /// Build from configuration; `None` when no API key is set.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.api_base_url.clone(),
            model: config.enrich_model.clone(),
        })
    }

    async fn complete(&self, payload: &Value) -> Result<Value, VoyError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                {"role": "system", "content": EXTRACTION_SYSTEM},
                {"role": "user", "content": payload.to_string()},
            ],
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("extraction call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "extraction api returned status {}",
                response.status()
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("extraction api returned non-JSON: {err}")))?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        crate::enrich::extract_json_object(text)
            .ok_or_else(|| VoyError::parse("extraction output has no JSON object"))
    }
}

#[async_trait]
impl GraphExtractor for LlmGraphExtractor {
    async fn extract(&self, context: &ChunkContext) -> GraphExtraction {
        let payload = json!({
            "destination_hint": context.destination_hint.clone().unwrap_or_default(),
            "videoUrl": context.video_url,
            "chunkIdx": context.chunk_idx,
            "startSec": context.start_sec,
            "endSec": context.end_sec,
            "timestampUrl": timestamp_url(&context.video_url, context.start_sec),
            "chunk_text": context.text,
        });
        let raw = match self.complete(&payload).await {
            Ok(raw) => raw,
            Err(_) => return GraphExtraction::default(),
        };
        match serde_json::from_value::<GraphExtraction>(raw) {
            Ok(extraction) => filter_extraction(extraction),
            Err(_) => GraphExtraction::default(),
        }
    }
}
