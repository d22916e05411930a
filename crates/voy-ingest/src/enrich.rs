// SPDX-License-Identifier: MIT OR Apache-2.0
//! LLM enrichment: one recommendation card per transcript chunk, one product
//! card per product record.
//!
//! Model calls are strictly JSON-producing and go through a tolerant parser
//! (first `{...}` block); anything that fails to parse or validate falls
//! back to a synthesized low-confidence card. Model text never reaches a
//! store field without coercion.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use voy_config::ModelConfig;
use voy_error::VoyError;

/// Card categories for video-derived recommendations.
pub const CARD_CATEGORIES: [&str; 11] = [
    "attraction",
    "food",
    "hotel",
    "transport",
    "shopping",
    "tip",
    "warning",
    "itinerary",
    "budget",
    "timing",
    "other",
];

/// Product card categories.
pub const PRODUCT_CATEGORIES: [&str; 13] = [
    "insurance",
    "esim",
    "flights",
    "hotel",
    "tickets",
    "transport",
    "planner",
    "gear",
    "experiences",
    "finance",
    "shopping",
    "official",
    "other",
];

const MAX_CATEGORIES: usize = 6;

/// A travel recommendation card extracted from one chunk. Field names match
/// the store schema (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCard {
    /// 1–3 sentence summary.
    pub summary: String,
    /// Primary category (one of [`CARD_CATEGORIES`]).
    #[serde(rename = "primaryCategory")]
    pub primary_category: String,
    /// Categories, primary first, at most six.
    pub categories: Vec<String>,
    /// Proper-noun places.
    pub places: Vec<String>,
    /// Actionable travel tactics.
    pub signals: Vec<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// One-sentence extraction rationale.
    pub rationale: Option<String>,
}

/// An enriched product card. Field names match the store schema (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    /// 1–2 sentence summary.
    pub summary: String,
    /// Primary category (one of [`PRODUCT_CATEGORIES`]).
    #[serde(rename = "primaryCategory")]
    pub primary_category: String,
    /// Categories, primary first, at most six.
    pub categories: Vec<String>,
    /// When to recommend (imperative phrases).
    pub triggers: Vec<String>,
    /// When the product does not apply.
    pub constraints: Vec<String>,
    /// Affiliate priority in `[0, 1]`.
    #[serde(rename = "affiliatePriority")]
    pub affiliate_priority: f64,
    /// User value in `[0, 1]`.
    #[serde(rename = "userValue")]
    pub user_value: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// One-sentence extraction rationale.
    pub rationale: Option<String>,
}

/// One product input record for enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    /// The user question the product answers.
    pub question: String,
    /// Opportunity description.
    pub opportunity: String,
    /// Affiliate or product link.
    pub link: String,
    /// Destination, when scoped.
    #[serde(default)]
    pub destination: String,
    /// Language code.
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Market code.
    #[serde(default = "default_market")]
    pub market: String,
}

fn default_lang() -> String {
    "pt".into()
}

fn default_market() -> String {
    "BR".into()
}

/// The enrichment seam: implemented over an LLM in production, canned in
/// tests.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// One recommendation card per chunk; never fails outward.
    async fn enrich_chunk(&self, chunk_text: &str, destination: &str, lang: &str)
        -> RecommendationCard;

    /// One product card per record; never fails outward.
    async fn enrich_product(&self, input: &ProductInput) -> ProductCard;
}

// ---------------------------------------------------------------------------
// Tolerant parsing and coercion
// ---------------------------------------------------------------------------

/// Extract the first `{...}` block from model output.
pub fn extract_json_object(text: &str) -> Option<Value> {
    static CELL: OnceLock<Regex> = OnceLock::new();
    let re = CELL.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
    let m = re.find(text.trim())?;
    serde_json::from_str(m.as_str()).ok()
}

fn clamp01(value: &Value, default: f64) -> f64 {
    value.as_f64().unwrap_or(default).clamp(0.0, 1.0)
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn string_vec(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn ordered_categories(primary: &str, raw: Vec<String>, allowed: &[&str]) -> Vec<String> {
    let mut out = vec![primary.to_string()];
    for c in raw {
        let c = c.trim().to_lowercase();
        if c != primary && allowed.contains(&c.as_str()) && !out.contains(&c) {
            out.push(c);
        }
    }
    out.truncate(MAX_CATEGORIES);
    out
}

/// Synthesized card when a chunk cannot be enriched.
pub fn fallback_card(chunk_text: &str) -> RecommendationCard {
    let mut summary = truncate_chars(&collapse_ws(chunk_text), 240);
    if summary.chars().count() < 10 {
        summary = "Trecho curto sem resumo confiável.".into();
    }
    RecommendationCard {
        summary,
        primary_category: "other".into(),
        categories: vec!["other".into()],
        places: vec![],
        signals: vec![],
        confidence: 0.2,
        rationale: Some("Fallback: chunk too weak or failed to parse.".into()),
    }
}

/// Coerce raw model JSON into a valid recommendation card.
pub fn coerce_card(raw: &Value, chunk_text: &str) -> RecommendationCard {
    let mut summary = raw["summary"].as_str().unwrap_or_default().trim().to_string();
    if summary.chars().count() < 20 {
        summary = truncate_chars(&collapse_ws(chunk_text), 240);
        if summary.is_empty() {
            summary = "Resumo indisponível.".into();
        }
    }

    let primary = raw["primaryCategory"]
        .as_str()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| CARD_CATEGORIES.contains(&s.as_str()))
        .unwrap_or_else(|| "other".into());
    let mut categories = ordered_categories(&primary, string_vec(&raw["categories"]), &CARD_CATEGORIES);

    let signals = string_vec(&raw["signals"]);
    let mut confidence = clamp01(&raw["confidence"], 0.4);
    let mut primary = primary;
    if signals.is_empty() {
        confidence = confidence.min(0.4);
        primary = "other".into();
        categories = vec!["other".into()];
    }

    RecommendationCard {
        summary,
        primary_category: primary,
        categories,
        places: string_vec(&raw["places"]),
        signals,
        confidence,
        rationale: raw["rationale"].as_str().map(str::to_string),
    }
}

/// Synthesized card when a product record cannot be enriched.
pub fn fallback_product_card(input: &ProductInput) -> ProductCard {
    let mut summary = format!(
        "Opportunity related with the question: {}. {}",
        input.question, input.opportunity
    );
    if summary.chars().count() > 260 {
        summary = format!("{}…", truncate_chars(&summary, 260));
    }
    if summary.chars().count() < 20 {
        summary = "Product card not available.".into();
    }
    ProductCard {
        summary,
        primary_category: "other".into(),
        categories: vec!["other".into()],
        triggers: vec![],
        constraints: vec![],
        affiliate_priority: 0.2,
        user_value: 0.2,
        confidence: 0.2,
        rationale: Some("Fallback: parsing/enriching failure.".into()),
    }
}

/// Coerce raw model JSON into a valid product card.
pub fn coerce_product_card(raw: &Value, input: &ProductInput) -> ProductCard {
    let mut summary = raw["summary"].as_str().unwrap_or_default().trim().to_string();
    if summary.chars().count() < 20 {
        summary = fallback_product_card(input).summary;
    }

    let primary = raw["primaryCategory"]
        .as_str()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| PRODUCT_CATEGORIES.contains(&s.as_str()))
        .unwrap_or_else(|| "other".into());
    let mut categories =
        ordered_categories(&primary, string_vec(&raw["categories"]), &PRODUCT_CATEGORIES);

    let triggers = string_vec(&raw["triggers"]);
    let mut confidence = clamp01(&raw["confidence"], 0.4);
    let mut primary = primary;
    if triggers.is_empty() {
        confidence = confidence.min(0.4);
        primary = "other".into();
        categories = vec!["other".into()];
    }

    ProductCard {
        summary,
        primary_category: primary,
        categories,
        triggers,
        constraints: string_vec(&raw["constraints"]),
        affiliate_priority: clamp01(&raw["affiliatePriority"], 0.4),
        user_value: clamp01(&raw["userValue"], 0.4),
        confidence,
        rationale: raw["rationale"].as_str().map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// LLM enricher
// ---------------------------------------------------------------------------

const CARD_SYSTEM: &str = "You extract travel recommendation cards from transcript chunks.\n\
Return ONLY valid JSON. No markdown. No extra text.\n\
SUMMARY: 1-3 sentences, at least 20 characters.\n\
PLACES: only proper nouns. SIGNALS: actionable travel tactics, no CTAs.\n\
CATEGORIES: primaryCategory one of attraction,food,hotel,transport,shopping,tip,warning,itinerary,budget,timing,other; categories 1-6.\n\
CONFIDENCE: 0-1. If signals empty, confidence <= 0.4 and primaryCategory other.\n\
RATIONALE: one short sentence. Output in same language as transcript.";

const PRODUCT_SYSTEM: &str = "You extract a ProductCard from question, opportunity description, and link.\n\
Return ONLY valid JSON. No markdown.\n\
SUMMARY: 1-2 sentences, >= 20 chars. CATEGORIES: primaryCategory one of insurance,esim,flights,hotel,tickets,transport,planner,gear,experiences,finance,shopping,official,other; categories 1..6.\n\
TRIGGERS: 2..8 short imperative phrases (when to recommend), no brands. CONSTRAINTS: 0..6 items.\n\
affiliatePriority, userValue, confidence: 0..1. If triggers empty => confidence <= 0.4, primaryCategory other.\n\
Output in same language as input.";

/// Enricher backed by an OpenAI-compatible chat API.
pub struct LlmEnricher {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmEnricher {
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

    async fn complete(&self, system: &str, user_payload: &Value) -> Result<Value, VoyError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user_payload.to_string()},
            ],
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("enrich call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "enrich api returned status {}",
                response.status()
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("enrich api returned non-JSON: {err}")))?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        extract_json_object(text).ok_or_else(|| VoyError::parse("enrich output has no JSON object"))
    }
}

#[async_trait]
impl Enricher for LlmEnricher {
    async fn enrich_chunk(
        &self,
        chunk_text: &str,
        destination: &str,
        lang: &str,
    ) -> RecommendationCard {
        let payload = json!({
            "destination": destination,
            "source_lang": lang,
            "chunk_text": chunk_text,
        });
        match self.complete(CARD_SYSTEM, &payload).await {
            Ok(raw) => coerce_card(&raw, chunk_text),
            Err(_) => fallback_card(chunk_text),
        }
    }

    async fn enrich_product(&self, input: &ProductInput) -> ProductCard {
        let payload = json!({
            "question": input.question,
            "opportunity": input.opportunity,
            "link": input.link,
            "destination": input.destination,
            "market": input.market,
        });
        match self.complete(PRODUCT_SYSTEM, &payload).await {
            Ok(raw) => coerce_product_card(&raw, input),
            Err(_) => fallback_product_card(input),
        }
    }
}

/// Merchant host derived from a product link.
pub fn merchant_from_link(link: &str) -> String {
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .unwrap_or(link);
    rest.split(['/', '?'])
        .next()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_lowercase()
}
