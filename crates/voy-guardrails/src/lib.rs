// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-guardrails
//!
//! Deterministic post-processing of an assembled response against the user
//! query. Two rules:
//!
//! 1. An answer with zero citations that matches any factual pattern
//!    (currency, dates/times, modal obligation, source markers) is replaced
//!    with a fixed safe-fallback string and its citations cleared.
//! 2. An addon whose inferred commercial bucket the user never asked about
//!    is dropped.
//!
//! Only `answer_text`, `citations`, and `addon` are mutated.

#![deny(unsafe_code)]

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use voy_contract::agent::{Addon, AssembledResponse};

/// The fixed replacement for unsourced factual answers.
pub const SAFE_FALLBACK: &str = "Não tenho fontes suficientes para confirmar essas informações.";

/// Commercial buckets an addon can be classified into.
pub const BUCKETS: [&str; 7] = [
    "tickets",
    "hotel",
    "insurance",
    "esim",
    "transport",
    "planner",
    "shopping",
];

fn bucket_keywords(bucket: &str) -> &'static [&'static str] {
    match bucket {
        "tickets" => &["ingresso", "ticket", "pass", "passes", "bilhete"],
        "hotel" => &["hotel", "hospedagem", "accommodation", "stay", "reserva"],
        "insurance" => &["seguro", "insurance"],
        "esim" => &["esim", "e-sim", "chip"],
        "transport" => &["transporte", "transport", "voo", "flight", "carro", "car"],
        "planner" => &["planner", "planejador", "roteiro"],
        "shopping" => &["comprar", "buy", "shopping"],
        _ => &[],
    }
}

struct Patterns {
    currency: Regex,
    factual: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static CELL: OnceLock<Patterns> = OnceLock::new();
    CELL.get_or_init(|| {
        let ci = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("guardrail pattern must compile")
        };
        Patterns {
            currency: ci(r"R\$\s*\d|USD\s*\d|BRL\s*\d|\$\s*\d|\d+\s*(?:R\$|USD|BRL)"),
            factual: vec![
                ci(r"\(Source:"),
                ci(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b"),
                ci(r"\b\d{4}-\d{2}-\d{2}\b"),
                ci(r"\b\d+\s*(?:am|pm|h|horas?)\b"),
                ci(r"\bmust\b"),
                ci(r"\brequires?\b"),
                ci(r"\brule[s]?\b"),
            ],
        }
    })
}

fn has_currency(text: &str) -> bool {
    patterns().currency.is_match(text)
}

fn looks_factual(text: &str) -> bool {
    patterns().factual.iter().any(|p| p.is_match(text))
}

/// Infer the commercial bucket of an addon from its text fields, or `None`
/// when no bucket vocabulary matches.
pub fn infer_addon_bucket(addon: &Addon) -> Option<&'static str> {
    infer_bucket_from_text(&format!("{} {}", addon.summary, addon.merchant))
}

/// Bucket inference over an arbitrary pre-joined haystack (summary +
/// primary_category + merchant + categories).
pub fn infer_bucket_from_text(haystack: &str) -> Option<&'static str> {
    let combined = haystack.to_lowercase();
    BUCKETS
        .into_iter()
        .find(|bucket| bucket_keywords(bucket).iter().any(|kw| combined.contains(kw)))
}

fn user_requested_bucket(user_query: &str, bucket: &str) -> bool {
    let q = user_query.to_lowercase();
    bucket_keywords(bucket).iter().any(|kw| q.contains(kw))
}

/// Apply both guardrail rules, returning the (possibly rewritten) response.
pub fn apply(mut response: AssembledResponse, user_query: &str) -> AssembledResponse {
    if response.citations.is_empty()
        && (has_currency(&response.answer_text) || looks_factual(&response.answer_text))
    {
        response.answer_text = SAFE_FALLBACK.to_string();
        response.citations.clear();
    }

    if let Some(addon) = &response.addon {
        if let Some(bucket) = infer_addon_bucket(addon) {
            if !user_requested_bucket(user_query, bucket) {
                response.addon = None;
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(answer: &str, citations: Vec<&str>, addon: Option<Addon>) -> AssembledResponse {
        AssembledResponse {
            session_id: "s1".into(),
            request_id: "r1".into(),
            answer_text: answer.into(),
            citations: citations.into_iter().map(str::to_string).collect(),
            addon,
            audio_ref: None,
            spoken_version: None,
            screen_summary: None,
        }
    }

    fn hotel_addon() -> Addon {
        Addon {
            product_id: "prod_hotel_123".into(),
            summary: "Best hotel deals in Orlando".into(),
            link: "https://hotels.com".into(),
            merchant: "Hotels.com".into(),
        }
    }

    #[test]
    fn factual_without_citations_gets_rewritten() {
        let out = apply(
            response(
                "You must visit at 8am. The rule requires advance booking.",
                vec![],
                None,
            ),
            "when to go to Disney",
        );
        assert_eq!(out.answer_text, SAFE_FALLBACK);
        assert!(out.citations.is_empty());
    }

    #[test]
    fn currency_without_citations_gets_rewritten() {
        let out = apply(
            response("Tickets cost R$ 500 per person.", vec![], None),
            "dicas Disney",
        );
        assert_eq!(out.answer_text, SAFE_FALLBACK);
    }

    #[test]
    fn source_marker_without_citations_gets_rewritten() {
        let out = apply(
            response("Go early. (Source: somewhere)", vec![], None),
            "dicas Disney",
        );
        assert_eq!(out.answer_text, SAFE_FALLBACK);
    }

    #[test]
    fn iso_date_without_citations_gets_rewritten() {
        let out = apply(
            response("The park reopens on 2025-03-01.", vec![], None),
            "when does it open",
        );
        assert_eq!(out.answer_text, SAFE_FALLBACK);
    }

    #[test]
    fn citations_present_passes_unchanged() {
        let out = apply(
            response(
                "You must visit at 8am. Rule requires advance booking.",
                vec!["https://example.com/tips"],
                None,
            ),
            "dicas Disney",
        );
        assert_eq!(
            out.answer_text,
            "You must visit at 8am. Rule requires advance booking."
        );
        assert_eq!(out.citations, ["https://example.com/tips"]);
    }

    #[test]
    fn harmless_answer_without_citations_passes() {
        let out = apply(
            response("Mornings tend to be quieter.", vec![], None),
            "dicas Disney",
        );
        assert_eq!(out.answer_text, "Mornings tend to be quieter.");
    }

    #[test]
    fn unsolicited_addon_removed() {
        let out = apply(
            response(
                "Best times are early morning.",
                vec!["https://example.com"],
                Some(hotel_addon()),
            ),
            "dicas para evitar filas na Disney",
        );
        assert!(out.addon.is_none());
    }

    #[test]
    fn requested_addon_kept() {
        let out = apply(
            response(
                "Here are hotel options.",
                vec!["https://example.com"],
                Some(hotel_addon()),
            ),
            "preciso de hotel em Orlando",
        );
        assert!(out.addon.is_some());
    }

    #[test]
    fn addon_with_no_inferable_bucket_kept() {
        let addon = Addon {
            product_id: "p1".into(),
            summary: "A mystery travel gadget".into(),
            link: "https://example.com/x".into(),
            merchant: "m".into(),
        };
        let out = apply(
            response("ok", vec!["https://example.com"], Some(addon)),
            "dicas Disney",
        );
        assert!(out.addon.is_some());
    }

    #[test]
    fn bucket_inference_table() {
        assert_eq!(infer_bucket_from_text("ticket pack for parks"), Some("tickets"));
        assert_eq!(infer_bucket_from_text("hospedagem perto do parque"), Some("hotel"));
        assert_eq!(infer_bucket_from_text("travel insurance plan"), Some("insurance"));
        assert_eq!(infer_bucket_from_text("e-sim for your trip"), Some("esim"));
        assert_eq!(infer_bucket_from_text("flight comparison"), Some("transport"));
        assert_eq!(infer_bucket_from_text("roteiro completo"), Some("planner"));
        assert_eq!(infer_bucket_from_text("shopping outlet guide"), Some("shopping"));
        assert_eq!(infer_bucket_from_text("plain text"), None);
    }

    #[test]
    fn only_target_fields_mutated() {
        let mut resp = response("You must book now.", vec![], None);
        resp.audio_ref = Some("data:audio/mp3;base64,x".into());
        resp.spoken_version = Some("keep".into());
        let out = apply(resp, "q");
        assert_eq!(out.audio_ref.as_deref(), Some("data:audio/mp3;base64,x"));
        assert_eq!(out.spoken_version.as_deref(), Some("keep"));
        assert_eq!(out.session_id, "s1");
    }
}
