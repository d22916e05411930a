// SPDX-License-Identifier: MIT OR Apache-2.0
//! STT (`stt_transcript`) and TTS (`tts_audio`) contracts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported synthesized audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG audio.
    Mp3,
    /// Opus in Ogg.
    Opus,
    /// AAC.
    Aac,
    /// WAV/PCM container.
    Wav,
    /// Raw PCM.
    Pcm,
}

impl AudioFormat {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            "aac" => Ok(Self::Aac),
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// STT
// ---------------------------------------------------------------------------

/// Request parameters for transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttRequest {
    /// Audio as a data URL (`data:audio/...;base64,...`) or HTTP(S) URL.
    pub audio_ref: String,
    /// Hint language (IETF tag); `None` for auto-detect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// When set, the response carries a `debug` object.
    #[serde(default)]
    pub debug: bool,
}

/// Response for `transcribe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: SttRequest,
    /// Primary transcript text; empty on failure.
    pub transcript: String,
    /// Detected language (IETF tag).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Transcription confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Input audio duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Failure reason, when transcription failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Debug detail (present only when requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl SttResponse {
    /// A schema-valid failure response: empty transcript, reason set.
    pub fn failed(request: SttRequest, reason: impl Into<String>) -> Self {
        Self {
            x_contract_version: crate::CONTRACT_VERSION.to_string(),
            request,
            transcript: String::new(),
            language: None,
            confidence: None,
            duration_seconds: None,
            error: Some(reason.into()),
            debug: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TTS
// ---------------------------------------------------------------------------

/// Placeholder returned when synthesis fails; the contract requires a
/// non-empty `audio_ref`.
pub const TTS_PLACEHOLDER_AUDIO_REF: &str = "data:audio/mp3;base64,YQ==";

/// Request parameters for synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsRequest {
    /// Text to synthesize (non-empty).
    pub text: String,
    /// Voice id; `None` for the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Speech speed (0.25–4.0, 1.0 = normal).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Output format; `None` for mp3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    /// When set, the response carries a `debug` object.
    #[serde(default)]
    pub debug: bool,
}

/// Response for `synthesize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: TtsRequest,
    /// Audio as a data URL or HTTP(S) URL; never empty.
    pub audio_ref: String,
    /// Actual output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    /// Synthesized audio duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Failure reason, when synthesis failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Debug detail (present only when requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl TtsResponse {
    /// A schema-valid failure response with the placeholder data URL.
    pub fn failed(request: TtsRequest, reason: impl Into<String>) -> Self {
        let format = request.format;
        Self {
            x_contract_version: crate::CONTRACT_VERSION.to_string(),
            request,
            audio_ref: TTS_PLACEHOLDER_AUDIO_REF.to_string(),
            format,
            duration_seconds: None,
            error: Some(reason.into()),
            debug: None,
        }
    }
}
