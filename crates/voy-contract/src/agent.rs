// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent-edge payloads: one turn in, one assembled response out, plus the
//! feedback event persisted by `POST /feedback`.

use serde::{Deserialize, Serialize};

/// One user turn received over the session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Session identifier; defaults to `"local-session"` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Request identifier; defaults to `"local-request"` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Free-text user query. May be replaced by an STT transcript when
    /// `audio_ref` is present.
    #[serde(default)]
    pub user_query: String,
    /// Optional destination hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Optional market code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    /// Image to analyze (data URL or HTTP URL); routes to the vision service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Audio to transcribe (data URL or HTTP URL); routes to STT first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Trip context forwarded to the vision service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_context: Option<serde_json::Value>,
    /// When set, the answer is also synthesized to speech.
    #[serde(default)]
    pub voice_mode: bool,
}

impl TurnRequest {
    /// A text-only turn.
    pub fn text(user_query: impl Into<String>) -> Self {
        Self {
            session_id: None,
            request_id: None,
            user_query: user_query.into(),
            destination: None,
            lang: None,
            market: None,
            image_ref: None,
            audio_ref: None,
            trip_context: None,
            voice_mode: false,
        }
    }
}

/// Optional commercial product attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    /// Product identifier.
    pub product_id: String,
    /// Product summary.
    pub summary: String,
    /// Product link.
    pub link: String,
    /// Merchant name or host.
    pub merchant: String,
}

/// The single response emitted per turn.
///
/// `addon` is always present on the wire (null when absent) so clients can
/// distinguish "no addon" from an older contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledResponse {
    /// Session identifier.
    pub session_id: String,
    /// Request identifier.
    pub request_id: String,
    /// Final answer text (post-guardrails).
    pub answer_text: String,
    /// Citation URLs: evidence-derived first, then graph-derived.
    pub citations: Vec<String>,
    /// Commercial addon, when triggered and allowed.
    pub addon: Option<Addon>,
    /// Synthesized audio for the spoken version (voice mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Word-bounded spoken rendition of the answer (voice mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_version: Option<String>,
    /// Full answer retained for on-screen display (voice mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_summary: Option<String>,
}

/// A user feedback event accepted by `POST /feedback` and persisted as
/// append-only JSONL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Caller-declared contract version.
    pub x_contract_version: String,
    /// Event identifier.
    pub event_id: String,
    /// Event timestamp (RFC 3339).
    pub timestamp: String,
    /// Session the feedback refers to.
    pub session_id: String,
    /// The query that was answered.
    pub user_query: String,
    /// The answer being rated.
    pub answer_text: String,
    /// Rating, 1–5.
    pub rating: u8,
    /// Free-text comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
