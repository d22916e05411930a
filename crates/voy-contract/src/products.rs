// SPDX-License-Identifier: MIT OR Apache-2.0
//! Product-candidates contract (`product_candidates` schema).

use serde::{Deserialize, Serialize};

/// Request parameters for product retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRequest {
    /// Normalized query signature (non-empty); keys retrieval and cache.
    pub query_signature: String,
    /// Optional destination hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Optional market code (e.g. `BR`, `US`, `Global`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Maximum number of candidates to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Post-filter threshold. Deliberately NOT part of the cache key so that
    /// tighter thresholds reuse looser cached results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl ProductRequest {
    /// New request with only the signature set.
    pub fn new(query_signature: impl Into<String>) -> Self {
        Self {
            query_signature: query_signature.into(),
            destination: None,
            market: None,
            lang: None,
            limit: None,
            min_confidence: None,
        }
    }
}

/// Retrieval score attached to a product candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductScore {
    /// Vector distance from the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// 1-based retrieval rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

/// One product candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    /// Stable product identifier (store object id).
    pub product_id: String,
    /// Short marketing-free summary.
    pub summary: String,
    /// Merchant name or host.
    pub merchant: String,
    /// Affiliate or product link.
    pub link: String,
    /// Category labels.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Primary category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
    /// Short imperative phrases describing when to recommend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<String>>,
    /// Situations where the product does not apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
    /// Affiliate priority in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliate_priority: Option<f64>,
    /// User value in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_value: Option<f64>,
    /// Enrichment confidence in `[0, 1]`.
    pub confidence: f64,
    /// Retrieval score detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ProductScore>,
}

/// Response for `retrieve_product_candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: ProductRequest,
    /// Ordered product candidates (post-filtered by `min_confidence`).
    #[serde(default)]
    pub candidates: Vec<ProductCandidate>,
}

/// Apply `min_confidence` as a deterministic post-filter.
pub fn filter_by_min_confidence(
    candidates: Vec<ProductCandidate>,
    min_confidence: Option<f64>,
) -> Vec<ProductCandidate> {
    match min_confidence {
        None => candidates,
        Some(min) => candidates
            .into_iter()
            .filter(|c| c.confidence >= min)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, confidence: f64) -> ProductCandidate {
        ProductCandidate {
            product_id: id.to_string(),
            summary: "Ticket pack with skip-the-line entry.".into(),
            merchant: "m".into(),
            link: "https://example.com/p".into(),
            categories: vec!["tickets".into()],
            primary_category: Some("tickets".into()),
            triggers: None,
            constraints: None,
            affiliate_priority: None,
            user_value: None,
            confidence,
            score: None,
        }
    }

    #[test]
    fn candidate_serde_roundtrip() {
        let c = candidate("prod_001", 0.8);
        let json = serde_json::to_string(&c).unwrap();
        let back: ProductCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn no_threshold_passes_everything() {
        let out = filter_by_min_confidence(vec![candidate("a", 0.1), candidate("b", 0.9)], None);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn threshold_drops_low_confidence() {
        let out =
            filter_by_min_confidence(vec![candidate("a", 0.1), candidate("b", 0.9)], Some(0.5));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_id, "b");
    }

    #[test]
    fn threshold_is_inclusive() {
        let out = filter_by_min_confidence(vec![candidate("a", 0.5)], Some(0.5));
        assert_eq!(out.len(), 1);
    }
}
