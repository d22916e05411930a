// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backend traits the retrieval services call through.
//!
//! Every external collaborator (vector store, graph store, model API) sits
//! behind one of these traits so tests inject mocks and the handlers stay
//! identical regardless of the backing system.

use async_trait::async_trait;
use serde_json::Value;
use voy_contract::vision::VisionMode;
use voy_error::VoyError;

/// A raw store row: object id plus its properties as stored (camelCase).
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    /// Store object id.
    pub id: String,
    /// Properties exactly as stored.
    pub properties: Value,
    /// Vector distance reported by the store, when available.
    pub distance: Option<f64>,
}

/// Near-text retrieval over recommendation cards.
#[async_trait]
pub trait EvidenceBackend: Send + Sync {
    /// Return up to `limit` raw card rows for the query.
    async fn recommendation_cards(&self, query: &str, limit: usize)
        -> Result<Vec<StoreRow>, VoyError>;
}

/// Near-text retrieval over product cards.
#[async_trait]
pub trait ProductBackend: Send + Sync {
    /// Return up to `limit` raw product-card rows for the signature.
    async fn product_cards(
        &self,
        query_signature: &str,
        limit: usize,
    ) -> Result<Vec<StoreRow>, VoyError>;
}

/// A raw graph-store node row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    /// Node id.
    pub id: String,
    /// Node type string.
    pub node_type: String,
    /// Display name.
    pub name: String,
    /// Aliases, when stored.
    pub aliases: Vec<String>,
    /// Properties, possibly a JSON string in older rows.
    pub properties: Value,
}

/// A raw graph-store edge row; `evidence` is the stored JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Edge type string.
    pub edge_type: String,
    /// Evidence as stored (JSON string or object).
    pub evidence: Value,
}

/// Two-phase graph retrieval: seed nodes by text containment, then edges
/// restricted to the seeded ids.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Entity nodes whose name or aliases contain `term` (lowercased).
    async fn seed_nodes(&self, term: &str, limit: usize) -> Result<Vec<RawNode>, VoyError>;

    /// All nodes, used as a fallback when the term matches nothing.
    async fn any_nodes(&self, limit: usize) -> Result<Vec<RawNode>, VoyError>;

    /// REL edges whose endpoints are both in `ids`.
    async fn edges_between(&self, ids: &[String], limit: usize)
        -> Result<Vec<RawEdge>, VoyError>;
}

/// A vision-capable chat model. Returns the raw model text, which the
/// service parses tolerantly.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run one completion over the prompt pair and image reference.
    async fn complete(
        &self,
        mode: VisionMode,
        system: &str,
        user: &str,
        image_ref: &str,
    ) -> Result<String, VoyError>;
}

/// Transcription output from an STT model.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Transcript text.
    pub text: String,
    /// Detected language, when reported.
    pub language: Option<String>,
    /// Confidence, when reported.
    pub confidence: Option<f64>,
    /// Audio duration in seconds, when reported.
    pub duration_seconds: Option<f64>,
}

/// A speech-to-text model.
#[async_trait]
pub trait SttModel: Send + Sync {
    /// Transcribe audio bytes tagged with a format hint (`mp3`, `wav`, ...).
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: &str,
        language: Option<&str>,
    ) -> Result<Transcription, VoyError>;
}

/// A text-to-speech model. Returns raw audio bytes in the requested format.
#[async_trait]
pub trait TtsModel: Send + Sync {
    /// Synthesize speech.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
        speed: f64,
    ) -> Result<Vec<u8>, VoyError>;
}
