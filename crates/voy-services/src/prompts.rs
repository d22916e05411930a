// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vision prompt templates, one per mode. All of them demand strict JSON
//! output; the service parses tolerantly anyway.

use voy_contract::vision::{SCENE_TYPES, TRAVEL_ITEM_CATEGORIES};

fn category_list() -> String {
    TRAVEL_ITEM_CATEGORIES.join(", ")
}

fn scene_list() -> String {
    SCENE_TYPES.join(", ")
}

/// System prompt for packing mode: judge outfit suitability for the trip
/// context and suggest product categories when relevant.
pub fn packing_system(trip_context: Option<&serde_json::Value>, user_query: Option<&str>) -> String {
    let mut ctx = String::new();
    if let Some(context) = trip_context {
        ctx = format!(
            " Trip context: {context} (e.g. destination, temp_band, rain_risk). Use it to judge if the outfit is suitable."
        );
    }
    let mut query_note = String::new();
    if let Some(q) = user_query {
        if !q.trim().is_empty() {
            query_note = format!(
                " The user asked: \"{}\" — answer that question (suitability for the context) and suggest product categories only when the outfit is not suitable or the user wants recommendations.",
                q.trim()
            );
        }
    }
    format!(
        "You analyze an outfit photo (clothing/items for travel). Use ONLY these 18 categories when listing items: {}.\n\
Tasks: (1) List detected clothing/item categories from the image (\"detected_items\", exact names from the list). \
(2) Judge whether this outfit is suitable for the trip context (\"suitability_ok\": true/false). \
If not suitable, set \"suitability_issue\" to a short reason. \
(3) If the outfit is not suitable or the user wants suggestions, list \"suggested_categories_for_products\" \
(array of category names from the 18-item set). \
(4) Optionally \"missing_categories\" (what's missing from the 18-item set for this trip).{ctx}{query_note}\n\
Output valid JSON only with keys: \"detected_items\", \"suitability_ok\", \"suitability_issue\" (null if suitable), \
\"suggested_categories_for_products\", \"missing_categories\", \"confidence\" (0-1).",
        category_list()
    )
}

/// System prompt for landmark mode: scene type, OCR, features, candidates.
pub fn landmark_system() -> String {
    format!(
        "You analyze a travel/place photo. Describe the scene and suggest up to 3 place candidates.\n\
Scene types (use exactly one): {}.\n\
Output valid JSON only with keys: \"scene_type\" (one of the list), \"ocr_text\" (array of extracted text strings), \
\"distinctive_features\" (array of strings), \"language_hint\" (optional), \
\"place_candidates\" (array of {{\"place_name\": string, \"confidence\": 0-1, \"reason\": string}}, max 3), \
\"confidence\" (0-1).",
        scene_list()
    )
}

/// System prompt for product-similarity mode.
pub fn product_similarity_system() -> String {
    format!(
        "You analyze a product/item photo for similarity search. Category must be one of: {}.\n\
Extract product category, attributes (e.g. color, material, size_class, use_case), style keywords, \
and produce 2-3 marketplace search query strings.\n\
Output valid JSON only with keys: \"category\" (one of the 18-item set), \"attributes\" (object), \
\"style_keywords\" (array of strings), \"search_queries\" (array of 2-3 strings), \"confidence\" (0-1).",
        category_list()
    )
}

/// User message for packing mode.
pub fn packing_user(user_query: Option<&str>) -> String {
    match user_query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!(
            "User question: {q}\n\nAnalyze this outfit image. Judge if it is suitable for the context and suggest product categories if relevant. Output JSON only."
        ),
        None => "Analyze this outfit image for the trip context. Judge suitability and suggest product categories if relevant. Output JSON only.".into(),
    }
}

/// User message for landmark mode.
pub fn landmark_user(user_query: Option<&str>) -> String {
    match user_query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!(
            "User question: {q}\n\nDescribe this scene, extract text, list distinctive features, propose up to 3 place candidates with confidence. JSON only."
        ),
        None => "Describe this scene, extract text, list distinctive features, propose up to 3 place candidates with confidence. JSON only.".into(),
    }
}

/// User message for product-similarity mode.
pub fn product_similarity_user() -> String {
    "Extract product category and attributes; produce 2-3 marketplace search query strings. JSON only.".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packing_prompt_lists_all_categories() {
        let system = packing_system(None, None);
        for category in TRAVEL_ITEM_CATEGORIES {
            assert!(system.contains(category), "missing {category}");
        }
    }

    #[test]
    fn packing_prompt_embeds_context_and_query() {
        let ctx = json!({"destination": "Orlando", "temp_band": "cold"});
        let system = packing_system(Some(&ctx), Some("Is this outfit okay for winter?"));
        assert!(system.contains("Orlando"));
        assert!(system.contains("Is this outfit okay for winter?"));
    }

    #[test]
    fn landmark_prompt_lists_scene_types() {
        let system = landmark_system();
        for scene in SCENE_TYPES {
            assert!(system.contains(scene), "missing {scene}");
        }
    }

    #[test]
    fn user_messages_include_question_when_present() {
        assert!(packing_user(Some("what to pack?")).contains("what to pack?"));
        assert!(landmark_user(Some("where is this?")).contains("where is this?"));
        assert!(!packing_user(Some("  ")).contains("User question"));
    }
}
