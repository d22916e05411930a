// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vision-signals contract (`vision_signals` schema).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Analysis mode. The output `mode` always equals the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionMode {
    /// Outfit/packing suitability analysis.
    Packing,
    /// Landmark / scene identification.
    Landmark,
    /// Product similarity extraction.
    ProductSimilarity,
}

impl VisionMode {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Packing => "packing",
            Self::Landmark => "landmark",
            Self::ProductSimilarity => "product_similarity",
        }
    }
}

impl FromStr for VisionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "packing" => Ok(Self::Packing),
            "landmark" => Ok(Self::Landmark),
            "product_similarity" => Ok(Self::ProductSimilarity),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed 18-item travel category set. Free-form model output is filtered
/// to these values.
pub const TRAVEL_ITEM_CATEGORIES: [&str; 18] = [
    "light_top",
    "warm_top",
    "insulated_jacket",
    "rain_jacket",
    "long_pants",
    "shorts_or_skirt",
    "walking_shoes",
    "sandals",
    "weather_proof_shoes",
    "sun_protection",
    "cold_accessory",
    "umbrella",
    "day_bag",
    "travel_bag_organizer",
    "power_adapter",
    "portable_charger",
    "water_bottle",
    "travel_comfort_item",
];

/// The fixed scene type set for landmark mode.
pub const SCENE_TYPES: [&str; 11] = [
    "landmark",
    "street",
    "beach",
    "mountain",
    "museum",
    "airport",
    "restaurant",
    "hotel",
    "transit",
    "urban",
    "nature",
];

/// Whether a category string belongs to the travel category set.
pub fn is_travel_category(s: &str) -> bool {
    TRAVEL_ITEM_CATEGORIES.contains(&s)
}

/// Whether a scene string belongs to the scene type set.
pub fn is_scene_type(s: &str) -> bool {
    SCENE_TYPES.contains(&s)
}

/// Request parameters for image analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRequest {
    /// Image as a data URL or HTTP(S) URL.
    pub image_ref: String,
    /// Requested analysis mode.
    pub mode: VisionMode,
    /// Trip context (destination, temp_band, rain_risk, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_context: Option<serde_json::Value>,
    /// The user's question, when one accompanies the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// When set, the response carries a `debug` object.
    #[serde(default)]
    pub debug: bool,
}

/// Landmark mode: one place candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    /// Candidate place name.
    pub place_name: String,
    /// Candidate confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Short reason for the guess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured signals from vision analysis. The populated fields depend on
/// `mode`; everything mode-specific is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionSignals {
    /// Echo of the requested mode.
    pub mode: VisionMode,
    /// Overall confidence in `[0, 1]`; zero on failure.
    pub confidence: f64,
    /// Failure reason, when analysis failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // -- packing --
    /// Detected clothing/item categories (18-item set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_items: Option<Vec<String>>,
    /// Categories missing for the trip context (18-item set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_categories: Option<Vec<String>>,
    /// Whether the outfit suits the trip context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suitability_ok: Option<bool>,
    /// Why the outfit is unsuitable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suitability_issue: Option<String>,
    /// Product categories that would improve the outfit (18-item set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_categories_for_products: Option<Vec<String>>,

    // -- landmark --
    /// Scene type (11-item set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<String>,
    /// Text extracted from the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<Vec<String>>,
    /// Distinctive visual features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinctive_features: Option<Vec<String>>,
    /// Language hint inferred from signage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
    /// Up to three place candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_candidates: Option<Vec<PlaceCandidate>>,

    // -- product_similarity --
    /// Product category (18-item set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Product attributes (color, material, size_class, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
    /// Style keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_keywords: Option<Vec<String>>,
    /// Up to three marketplace search query strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_queries: Option<Vec<String>>,
}

impl VisionSignals {
    /// A failure result: requested mode echoed, zero confidence, reason set.
    pub fn failed(mode: VisionMode, reason: impl Into<String>) -> Self {
        Self {
            mode,
            confidence: 0.0,
            error: Some(reason.into()),
            detected_items: None,
            missing_categories: None,
            suitability_ok: None,
            suitability_issue: None,
            suggested_categories_for_products: None,
            scene_type: None,
            ocr_text: None,
            distinctive_features: None,
            language_hint: None,
            place_candidates: None,
            category: None,
            attributes: None,
            style_keywords: None,
            search_queries: None,
        }
    }

    /// An empty success shell for the given mode.
    pub fn empty(mode: VisionMode) -> Self {
        let mut s = Self::failed(mode, "");
        s.error = None;
        s
    }
}

/// Response for `analyze_image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: VisionRequest,
    /// Structured signals.
    pub signals: VisionSignals,
    /// Debug detail (present only when requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}
