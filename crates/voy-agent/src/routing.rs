// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-turn routing decisions: which services to call, which vision and
//! voice modes to use, and how to key the product retrieval.

use voy_contract::vision::{VisionMode, VisionSignals};

const ITINERARY_KEYWORDS: [&str; 13] = [
    "itinerary",
    "itinerario",
    "itinerário",
    "roteiro",
    "route",
    "day 1",
    "dia 1",
    "day 2",
    "3-day",
    "first",
    "order",
    "week",
    "dias",
];

const PRODUCT_SIMILARITY_KEYWORDS: [&str; 6] = [
    "like this",
    "similar",
    "parecido",
    "parecida",
    "igual a",
    "find one",
];

const LANDMARK_KEYWORDS: [&str; 7] = [
    "where is",
    "que lugar",
    "what landmark",
    "what place",
    "onde fica",
    "que cidade",
    "landmark",
];

const COMMERCIAL_KEYWORDS: [&str; 14] = [
    "comprar",
    "buy",
    "book",
    "reservar",
    "hotel",
    "ticket",
    "ingresso",
    "tour",
    "seguro",
    "insurance",
    "chip",
    "esim",
    "passagem",
    "flight",
];

const QUICK_KEYWORDS: [&str; 6] = ["urgent", "quick", "fast", "rápido", "rapido", "agora"];

const QUICK_WORD_LIMIT: usize = 25;
const NORMAL_WORD_LIMIT: usize = 60;
const SIGNATURE_QUERY_CHARS: usize = 100;
const SIGNATURE_MAX_CHARS: usize = 200;

fn contains_any(query: &str, keywords: &[&str]) -> bool {
    let q = query.to_lowercase();
    keywords.iter().any(|kw| q.contains(kw))
}

/// Whether the query routes to the graph service.
pub fn should_call_graph(user_query: &str) -> bool {
    contains_any(user_query, &ITINERARY_KEYWORDS)
}

/// Vision mode from the query: product-similarity cues beat landmark cues;
/// packing is the default.
pub fn infer_vision_mode(user_query: &str) -> VisionMode {
    if contains_any(user_query, &PRODUCT_SIMILARITY_KEYWORDS) {
        VisionMode::ProductSimilarity
    } else if contains_any(user_query, &LANDMARK_KEYWORDS) {
        VisionMode::Landmark
    } else {
        VisionMode::Packing
    }
}

/// Whether the query carries commercial intent.
pub fn is_commercial(user_query: &str) -> bool {
    contains_any(user_query, &COMMERCIAL_KEYWORDS)
}

/// Voice pacing: urgency cues select quick mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePace {
    /// 25-word spoken version.
    Quick,
    /// 60-word spoken version.
    Normal,
}

/// Infer the voice pacing from the query.
pub fn infer_voice_mode(user_query: &str) -> VoicePace {
    if contains_any(user_query, &QUICK_KEYWORDS) {
        VoicePace::Quick
    } else {
        VoicePace::Normal
    }
}

/// Truncate the answer on whitespace boundaries to the pace's word budget.
pub fn build_spoken_version(answer_text: &str, pace: VoicePace) -> String {
    let limit = match pace {
        VoicePace::Quick => QUICK_WORD_LIMIT,
        VoicePace::Normal => NORMAL_WORD_LIMIT,
    };
    let words: Vec<&str> = answer_text.split_whitespace().collect();
    if words.len() <= limit {
        return answer_text.to_string();
    }
    words[..limit].join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// The base product query signature:
/// `destination:user_query[..100]:lang`, capped at 200 chars.
pub fn product_query_signature(
    destination: Option<&str>,
    user_query: &str,
    lang: Option<&str>,
) -> String {
    let signature = format!(
        "{}:{}:{}",
        destination.unwrap_or("any"),
        truncate_chars(user_query, SIGNATURE_QUERY_CHARS),
        lang.unwrap_or("en"),
    );
    truncate_chars(&signature, SIGNATURE_MAX_CHARS)
}

/// Product query for a packing gap: `destination:first_suggested:lang`, or
/// `None` when the outfit raised no gap.
pub fn packing_gap_query(
    signals: &VisionSignals,
    destination: Option<&str>,
    lang: Option<&str>,
) -> Option<String> {
    if signals.mode != VisionMode::Packing {
        return None;
    }
    // A gap exists when the outfit is unsuitable or categories were
    // suggested; either way the first suggested category keys the query.
    let suggested = signals
        .suggested_categories_for_products
        .as_ref()
        .and_then(|cats| cats.first())?;
    Some(format!(
        "{}:{}:{}",
        destination.unwrap_or("any"),
        suggested,
        lang.unwrap_or("en"),
    ))
}

/// Product query for a product-similarity result:
/// `destination:first_search_query:lang`.
pub fn similarity_query(
    signals: &VisionSignals,
    destination: Option<&str>,
    lang: Option<&str>,
) -> Option<String> {
    if signals.mode != VisionMode::ProductSimilarity {
        return None;
    }
    let first = signals.search_queries.as_ref().and_then(|qs| qs.first())?;
    Some(format!(
        "{}:{}:{}",
        destination.unwrap_or("any"),
        first,
        lang.unwrap_or("en"),
    ))
}
