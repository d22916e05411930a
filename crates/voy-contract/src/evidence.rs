// SPDX-License-Identifier: MIT OR Apache-2.0
//! Travel-evidence contract (`travel_evidence` schema).

use serde::{Deserialize, Serialize};

/// Request parameters for evidence retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    /// Free-text user query (non-empty).
    pub user_query: String,
    /// Optional destination hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// When set, the response carries a `debug` object.
    #[serde(default)]
    pub debug: bool,
    /// Opaque retrieval-strategy parameters (e.g. `version`,
    /// `memory_summary`). The cache key only reads `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_params: Option<serde_json::Value>,
}

impl EvidenceRequest {
    /// New request with only the query set.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            destination: None,
            lang: None,
            debug: false,
            strategy_params: None,
        }
    }

    /// Strategy version for the cache key: `strategy_params.version` or `"v0"`.
    pub fn strategy_version(&self) -> String {
        self.strategy_params
            .as_ref()
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or("v0")
            .to_string()
    }
}

/// Retrieval score attached to an evidence card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvidenceScore {
    /// Vector distance from the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Penalty applied for stale sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_penalty: Option<f64>,
    /// Final adjusted score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted: Option<f64>,
}

/// Rerank decision attached to an evidence card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRerank {
    /// 1-based rank after reranking.
    pub rank: u32,
    /// Why this card was ranked here.
    pub reason: String,
}

/// One evidence card: a structured summary with a citation handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCard {
    /// Stable card identifier (store object id).
    pub card_id: String,
    /// 1–3 sentence summary.
    pub summary: String,
    /// Actionable travel signals.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Proper-noun places mentioned.
    #[serde(default)]
    pub places: Vec<String>,
    /// Category labels.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Primary category label.
    #[serde(default = "default_category")]
    pub primary_category: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// Citation handle (typically a video timestamp URL).
    pub source_url: String,
    /// Upload date of the source video (RFC 3339), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_upload_date: Option<String>,
    /// Retrieval score detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<EvidenceScore>,
    /// Queries this card was previously seen in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_in_queries: Option<Vec<String>>,
    /// Rerank decision detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<EvidenceRerank>,
}

fn default_category() -> String {
    "other".to_string()
}

/// Response for `retrieve_travel_evidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: EvidenceRequest,
    /// Expanded query variants, when the strategy produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_queries: Option<Vec<String>>,
    /// Ordered evidence cards.
    #[serde(default)]
    pub evidence: Vec<EvidenceCard>,
    /// Debug detail (present only when requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card() -> EvidenceCard {
        EvidenceCard {
            card_id: "evid_001_tips".into(),
            summary: "Best times to visit are early morning.".into(),
            signals: vec!["timing".into()],
            places: vec!["Orlando".into()],
            categories: vec!["tips".into()],
            primary_category: "tips".into(),
            confidence: 0.9,
            source_url: "https://example.com/tips".into(),
            video_upload_date: None,
            score: None,
            seen_in_queries: None,
            rerank: None,
        }
    }

    #[test]
    fn card_serde_roundtrip() {
        let card = sample_card();
        let json = serde_json::to_string(&card).unwrap();
        let back: EvidenceCard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn card_deserializes_with_defaults() {
        let card: EvidenceCard = serde_json::from_value(serde_json::json!({
            "card_id": "evid_002_food",
            "summary": "Good food court near the castle.",
            "confidence": 0.5,
            "source_url": "https://example.com/food",
        }))
        .unwrap();
        assert!(card.signals.is_empty());
        assert_eq!(card.primary_category, "other");
    }

    #[test]
    fn strategy_version_defaults_to_v0() {
        let req = EvidenceRequest::new("dicas Disney");
        assert_eq!(req.strategy_version(), "v0");
    }

    #[test]
    fn strategy_version_reads_params() {
        let mut req = EvidenceRequest::new("dicas Disney");
        req.strategy_params =
            Some(serde_json::json!({"version": "v1", "memory_summary": "prefs:budget"}));
        assert_eq!(req.strategy_version(), "v1");
    }

    #[test]
    fn optional_fields_omitted_from_wire() {
        let req = EvidenceRequest::new("q");
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("destination").is_none());
        assert!(json.get("strategy_params").is_none());
    }
}
