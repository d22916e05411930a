// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic answer assembly: vision prefix, then evidence text, then
//! graph narrative, independent of branch completion order. Citations are
//! evidence-derived first, then graph-derived.

use voy_contract::evidence::EvidenceCard;
use voy_contract::graph::GraphResponse;
use voy_contract::vision::{VisionMode, VisionSignals};

/// Fixed answer when every branch came back empty.
pub const EMPTY_RESULT_ANSWER: &str = "No travel evidence found for your query.";

const HIGH_CONFIDENCE: f64 = 0.75;
const MAX_NARRATIVE_PATHS: usize = 3;

/// Mode-dependent sentence prefix derived from vision signals, or `None`
/// when the signals carry nothing to say.
pub fn vision_prefix(signals: &VisionSignals) -> Option<String> {
    if signals.error.is_some() {
        return None;
    }
    match signals.mode {
        VisionMode::Packing => packing_prefix(signals),
        VisionMode::Landmark => landmark_prefix(signals),
        VisionMode::ProductSimilarity => similarity_prefix(signals),
    }
}

fn packing_prefix(signals: &VisionSignals) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    match signals.suitability_ok {
        Some(false) => {
            let issue = signals
                .suitability_issue
                .clone()
                .unwrap_or_else(|| "it may not match the trip conditions".into());
            let mut sentence = format!("This outfit may not be ideal: {issue}");
            if !sentence.ends_with('.') {
                sentence.push('.');
            }
            if let Some(suggested) = signals
                .suggested_categories_for_products
                .as_ref()
                .filter(|s| !s.is_empty())
            {
                sentence.push_str(&format!(" Suggested: {}.", suggested.join(", ")));
            }
            parts.push(sentence);
        }
        Some(true) => parts.push("This outfit looks suitable for your trip.".into()),
        None => {}
    }

    if let Some(detected) = signals.detected_items.as_ref().filter(|d| !d.is_empty()) {
        parts.push(format!("Detected: {}.", detected.join(", ")));
    }
    if let Some(missing) = signals.missing_categories.as_ref().filter(|m| !m.is_empty()) {
        parts.push(format!("Consider adding: {}.", missing.join(", ")));
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn landmark_prefix(signals: &VisionSignals) -> Option<String> {
    let candidates = signals.place_candidates.as_ref()?;
    let first = candidates.first()?;
    let confident = first.confidence.unwrap_or(signals.confidence) >= HIGH_CONFIDENCE;
    let guess = if confident {
        format!("Isso parece ser {}.", first.place_name)
    } else {
        format!("Pode ser {}.", first.place_name)
    };
    Some(format!("{guess} Quer dicas desse lugar?"))
}

fn similarity_prefix(signals: &VisionSignals) -> Option<String> {
    let category = signals.category.as_deref()?;
    let mut sentence = format!("Produtos similares: {category}");
    if let Some(style) = signals.style_keywords.as_ref().filter(|s| !s.is_empty()) {
        sentence.push_str(&format!(" ({})", style.join(", ")));
    }
    sentence.push('.');
    Some(sentence)
}

/// Assemble the answer text and citation list from the branch results.
///
/// Order is fixed: vision prefix, evidence summaries, graph narrative; the
/// citations are evidence `source_url`s, then path-evidence timestamp URLs,
/// then subgraph-edge timestamp URLs, deduplicated in that order.
pub fn build_answer_and_citations(
    evidence: &[EvidenceCard],
    graph: Option<&GraphResponse>,
    vision: Option<&VisionSignals>,
) -> (String, Vec<String>) {
    let mut parts: Vec<String> = Vec::new();
    let mut citations: Vec<String> = Vec::new();

    if let Some(prefix) = vision.and_then(vision_prefix) {
        parts.push(prefix);
    }

    let knowledge_text = evidence
        .iter()
        .map(|card| card.summary.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !knowledge_text.is_empty() {
        parts.push(knowledge_text);
    }
    citations.extend(evidence.iter().map(|card| card.source_url.clone()));

    if let Some(graph) = graph {
        let names: std::collections::HashMap<&str, &str> = graph
            .subgraph
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.name.as_str()))
            .collect();

        if let Some(paths) = &graph.paths {
            for path in paths.iter().take(MAX_NARRATIVE_PATHS) {
                let label = path.label.clone().unwrap_or_else(|| path.path_id.clone());
                let stops: Vec<&str> = path
                    .nodes
                    .iter()
                    .filter_map(|id| names.get(id.as_str()).copied())
                    .collect();
                if !stops.is_empty() {
                    parts.push(format!("{label}: {}", stops.join(", ")));
                }
                citations.extend(path.evidence.iter().map(|e| e.timestamp_url.clone()));
            }
        }
        citations.extend(
            graph
                .subgraph
                .edges
                .iter()
                .map(|e| e.evidence.timestamp_url.clone()),
        );
    }

    // Dedup preserving first-seen order.
    let mut seen = std::collections::HashSet::new();
    citations.retain(|c| seen.insert(c.clone()));

    let answer = if parts.is_empty() {
        EMPTY_RESULT_ANSWER.to_string()
    } else {
        parts.join(" ")
    };
    (answer, citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voy_contract::graph::GraphRequest;

    fn card(summary: &str, url: &str) -> EvidenceCard {
        EvidenceCard {
            card_id: "evid_001_tips".into(),
            summary: summary.into(),
            signals: vec![],
            places: vec![],
            categories: vec![],
            primary_category: "tips".into(),
            confidence: 0.9,
            source_url: url.into(),
            video_upload_date: None,
            score: None,
            seen_in_queries: None,
            rerank: None,
        }
    }

    fn graph_response() -> GraphResponse {
        serde_json::from_value(json!({
            "x_contract_version": "1.0",
            "request": {"user_query": "itinerary Orlando"},
            "subgraph": {
                "nodes": [
                    {"id": "day1", "type": "dayplan", "name": "Day 1"},
                    {"id": "poi_a", "type": "poi", "name": "Magic Kingdom"},
                ],
                "edges": [{
                    "source": "day1",
                    "type": "INCLUDES_POI",
                    "target": "poi_a",
                    "evidence": {
                        "videoUrl": "https://youtube.com/watch?v=x",
                        "timestampUrl": "https://youtube.com/watch?v=x&t=120",
                        "startSec": 120,
                        "endSec": 180,
                    },
                }],
            },
            "paths": [{
                "path_id": "p1",
                "label": "Day 1",
                "nodes": ["day1", "poi_a"],
                "edges": [],
                "evidence": [{
                    "videoUrl": "https://youtube.com/watch?v=x",
                    "timestampUrl": "https://youtube.com/watch?v=x&t=120",
                    "startSec": 120,
                    "endSec": 180,
                }],
            }],
        }))
        .unwrap()
    }

    #[test]
    fn evidence_only_turn() {
        let (answer, citations) = build_answer_and_citations(
            &[card(
                "Best times to visit are early morning.",
                "https://example.com/tips",
            )],
            None,
            None,
        );
        assert!(answer.contains("Best times to visit are early morning."));
        assert_eq!(citations, ["https://example.com/tips"]);
    }

    #[test]
    fn empty_everything_uses_fixed_sentence() {
        let (answer, citations) = build_answer_and_citations(&[], None, None);
        assert_eq!(answer, EMPTY_RESULT_ANSWER);
        assert!(citations.is_empty());
    }

    #[test]
    fn graph_paths_merge_into_answer_and_citations() {
        let (answer, citations) = build_answer_and_citations(
            &[card("Morning is best.", "https://example.com/v1")],
            Some(&graph_response()),
            None,
        );
        assert!(answer.contains("Morning is best."));
        assert!(answer.contains("Day 1: Day 1, Magic Kingdom"));
        assert!(citations.contains(&"https://example.com/v1".to_string()));
        assert!(citations.contains(&"https://youtube.com/watch?v=x&t=120".to_string()));
        // Evidence citation comes first.
        assert_eq!(citations[0], "https://example.com/v1");
    }

    #[test]
    fn duplicate_citations_removed_preserving_order() {
        let (_, citations) = build_answer_and_citations(&[], Some(&graph_response()), None);
        // The path evidence and the subgraph edge carry the same URL.
        assert_eq!(citations.len(), 1);
    }

    #[test]
    fn packing_prefix_with_gap() {
        let mut signals = VisionSignals::empty(VisionMode::Packing);
        signals.confidence = 0.85;
        signals.suitability_ok = Some(false);
        signals.suitability_issue = Some("Too light for Disney in winter.".into());
        signals.detected_items = Some(vec!["light_top".into(), "long_pants".into()]);
        signals.suggested_categories_for_products =
            Some(vec!["warm_top".into(), "insulated_jacket".into()]);

        let (answer, _) = build_answer_and_citations(&[], None, Some(&signals));
        assert!(answer.contains("not be ideal"));
        assert!(answer.contains("Too light"));
        assert!(answer.contains("warm_top"));
        assert!(answer.contains("insulated_jacket"));
    }

    #[test]
    fn packing_prefix_detected_and_missing() {
        let mut signals = VisionSignals::empty(VisionMode::Packing);
        signals.confidence = 0.9;
        signals.detected_items = Some(vec!["light_top".into(), "walking_shoes".into()]);
        signals.missing_categories = Some(vec!["rain_jacket".into(), "umbrella".into()]);

        let (answer, _) = build_answer_and_citations(&[], None, Some(&signals));
        assert!(answer.contains("light_top"));
        assert!(answer.contains("Consider adding"));
        assert!(answer.contains("rain_jacket"));
    }

    #[test]
    fn landmark_prefix_confidence_gated() {
        let mut signals = VisionSignals::empty(VisionMode::Landmark);
        signals.confidence = 0.85;
        signals.place_candidates = Some(vec![voy_contract::vision::PlaceCandidate {
            place_name: "Magic Kingdom".into(),
            confidence: Some(0.9),
            reason: Some("castle".into()),
        }]);
        let (answer, _) = build_answer_and_citations(&[], None, Some(&signals));
        assert!(answer.contains("Magic Kingdom"));
        assert!(answer.contains("Quer dicas"));
        assert!(answer.contains("parece ser"));

        signals.place_candidates = Some(vec![voy_contract::vision::PlaceCandidate {
            place_name: "Epcot".into(),
            confidence: Some(0.3),
            reason: None,
        }]);
        let (answer, _) = build_answer_and_citations(&[], None, Some(&signals));
        assert!(answer.contains("Pode ser Epcot"));
    }

    #[test]
    fn similarity_prefix_names_category() {
        let mut signals = VisionSignals::empty(VisionMode::ProductSimilarity);
        signals.confidence = 0.8;
        signals.category = Some("day_bag".into());
        signals.style_keywords = Some(vec!["minimal".into()]);
        let (answer, _) = build_answer_and_citations(&[], None, Some(&signals));
        assert!(answer.contains("Produtos similares"));
        assert!(answer.contains("day_bag"));
    }

    #[test]
    fn vision_prefix_comes_before_knowledge() {
        let mut signals = VisionSignals::empty(VisionMode::Packing);
        signals.suitability_ok = Some(true);
        let (answer, _) = build_answer_and_citations(
            &[card("Morning is best.", "https://example.com/v1")],
            None,
            Some(&signals),
        );
        let prefix_at = answer.find("suitable").unwrap();
        let knowledge_at = answer.find("Morning is best.").unwrap();
        assert!(prefix_at < knowledge_at);
    }

    #[test]
    fn failed_vision_adds_no_prefix() {
        let signals = VisionSignals::failed(VisionMode::Packing, "model down");
        let (answer, _) = build_answer_and_citations(
            &[card("Morning is best.", "https://example.com/v1")],
            None,
            Some(&signals),
        );
        assert_eq!(answer, "Morning is best.");
    }

    #[test]
    fn graph_ignores_mock_free_response() {
        let graph: GraphResponse = GraphResponse {
            x_contract_version: "1.0".into(),
            request: GraphRequest::new("q"),
            subgraph: Default::default(),
            paths: None,
            debug: None,
        };
        let (answer, citations) = build_answer_and_citations(&[], Some(&graph), None);
        assert_eq!(answer, EMPTY_RESULT_ANSWER);
        assert!(citations.is_empty());
    }
}
