// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapters mapping raw store rows (camelCase properties) to contract types.
//!
//! Rows missing a mandatory field are rejected with `ParseFailure`; handlers
//! skip them rather than failing the request.

use crate::backend::StoreRow;
use serde_json::Value;
use voy_contract::evidence::EvidenceCard;
use voy_contract::products::{ProductCandidate, ProductScore};
use voy_error::VoyError;

fn str_field(props: &Value, key: &str) -> Option<String> {
    props.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn string_list(props: &Value, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn f64_field(props: &Value, key: &str) -> Option<f64> {
    props.get(key).and_then(|v| v.as_f64())
}

/// Map one recommendation-card row to a contract evidence card.
///
/// `uuid → card_id`, `timestampUrl → source_url`,
/// `primaryCategory → primary_category`, `videoUploadDate → video_upload_date`.
pub fn card_row_to_evidence(row: &StoreRow) -> Result<EvidenceCard, VoyError> {
    if row.id.is_empty() {
        return Err(VoyError::parse("card row missing object id"));
    }
    let props = &row.properties;
    let source_url = str_field(props, "timestampUrl")
        .ok_or_else(|| VoyError::parse("card row missing timestampUrl"))?;

    Ok(EvidenceCard {
        card_id: row.id.clone(),
        summary: str_field(props, "summary").unwrap_or_default(),
        signals: string_list(props, "signals"),
        places: string_list(props, "places"),
        categories: string_list(props, "categories"),
        primary_category: str_field(props, "primaryCategory").unwrap_or_else(|| "other".into()),
        confidence: f64_field(props, "confidence").unwrap_or(0.0),
        source_url,
        video_upload_date: str_field(props, "videoUploadDate"),
        score: None,
        seen_in_queries: None,
        rerank: None,
    })
}

/// Map one product-card row to a contract product candidate.
///
/// `uuid → product_id`, `primaryCategory → primary_category`,
/// `affiliatePriority → affiliate_priority`, `userValue → user_value`;
/// the store distance and 1-based rank land in `score`.
pub fn product_row_to_candidate(row: &StoreRow, rank: u32) -> Result<ProductCandidate, VoyError> {
    if row.id.is_empty() {
        return Err(VoyError::parse("product row missing object id"));
    }
    let props = &row.properties;

    let optional_list = |key: &str| -> Option<Vec<String>> {
        props.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
    };

    Ok(ProductCandidate {
        product_id: row.id.clone(),
        summary: str_field(props, "summary").unwrap_or_default(),
        merchant: str_field(props, "merchant").unwrap_or_default(),
        link: str_field(props, "link").unwrap_or_default(),
        categories: string_list(props, "categories"),
        primary_category: str_field(props, "primaryCategory"),
        triggers: optional_list("triggers"),
        constraints: optional_list("constraints"),
        affiliate_priority: f64_field(props, "affiliatePriority"),
        user_value: f64_field(props, "userValue"),
        confidence: f64_field(props, "confidence").unwrap_or(0.0),
        score: Some(ProductScore {
            distance: row.distance,
            rank: Some(rank),
        }),
    })
}
