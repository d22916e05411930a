// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingestion pipeline events (`ingestion_event` schema).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pipeline stage. Each stage names the state the event is *in*; the worker
/// dispatches exactly one handler per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Ingestion requested for a content source.
    Requested,
    /// Fetched transcript is ready for chunking.
    Transcript,
    /// Text has been chunked; ready for enrichment.
    Chunks,
    /// Chunks enriched; ready for embedding.
    Enrichment,
    /// Embeddings computed; ready to write.
    Embeddings,
    /// Terminal: write to the store completed.
    WriteComplete,
}

impl Stage {
    /// All stages, in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::Requested,
        Stage::Transcript,
        Stage::Chunks,
        Stage::Enrichment,
        Stage::Embeddings,
        Stage::WriteComplete,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Transcript => "transcript",
            Self::Chunks => "chunks",
            Self::Enrichment => "enrichment",
            Self::Embeddings => "embeddings",
            Self::WriteComplete => "write_complete",
        }
    }

    /// The stage a successful handler advances to, or `None` at the terminal.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Requested => Some(Self::Transcript),
            Self::Transcript => Some(Self::Chunks),
            Self::Chunks => Some(Self::Enrichment),
            Self::Enrichment => Some(Self::Embeddings),
            Self::Embeddings => Some(Self::WriteComplete),
            Self::WriteComplete => None,
        }
    }

    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WriteComplete)
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content source family; routes stage behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A single YouTube video ingested into recommendation cards.
    Youtube,
    /// A batch of product records.
    Products,
    /// A YouTube video ingested into the knowledge graph.
    YoutubeKg,
}

impl SourceType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Products => "products",
            Self::YoutubeKg => "youtube_kg",
        }
    }
}

impl FromStr for SourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(Self::Youtube),
            "products" => Ok(Self::Products),
            "youtube_kg" => Ok(Self::YoutubeKg),
            _ => Err(()),
        }
    }
}

/// One unit of work flowing through the ingestion queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvent {
    /// Unique event identifier (fresh per emitted event).
    pub event_id: String,
    /// External object identity, e.g. `youtube:<videoId>`,
    /// `products:<batchId>`, `youtube_kg:<videoId>`.
    pub content_source_id: String,
    /// Current stage.
    pub stage: Stage,
    /// Stage-specific data, including `source_type`.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Failures so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Retry budget before the event moves to the DLQ.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Last failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

impl IngestionEvent {
    /// A fresh `requested` event for the given source.
    pub fn requested(content_source_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            content_source_id: content_source_id.into(),
            stage: Stage::Requested,
            payload,
            retry_count: 0,
            max_retries: default_max_retries(),
            error: None,
        }
    }

    /// Successor event at the given stage, carrying the new payload and the
    /// retry bookkeeping of the predecessor.
    pub fn advance(&self, stage: Stage, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            content_source_id: self.content_source_id.clone(),
            stage,
            payload,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            error: self.error.clone(),
        }
    }

    /// The `source_type` tag carried in the payload, when present and known.
    pub fn source_type(&self) -> Option<SourceType> {
        self.payload
            .get("source_type")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}
