// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-config
//!
//! Environment-driven configuration. Every value is optional with a default;
//! binaries that require a credential surface [`ConfigError::MissingRequired`]
//! at startup (fatal misconfiguration) rather than failing mid-request.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::time::Duration;
use voy_error::{ErrorKind, VoyError};

/// Errors from configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("missing required configuration: {name}")]
    MissingRequired {
        /// Variable name.
        name: String,
    },

    /// A variable was present but unparseable.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Why it failed to parse.
        reason: String,
    },
}

impl From<ConfigError> for VoyError {
    fn from(err: ConfigError) -> Self {
        VoyError::new(ErrorKind::FatalMisconfiguration, err.to_string())
    }
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<f64>().map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Read a required variable, failing with [`ConfigError::MissingRequired`].
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    env_opt(name).ok_or_else(|| ConfigError::MissingRequired {
        name: name.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

/// Base URLs and deadlines for the six retrieval services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Travel-evidence service base URL.
    pub knowledge_base_url: String,
    /// Product-candidates service base URL.
    pub products_base_url: String,
    /// Travel-graph service base URL.
    pub graph_base_url: String,
    /// Vision service base URL.
    pub vision_base_url: String,
    /// STT service base URL.
    pub stt_base_url: String,
    /// TTS service base URL.
    pub tts_base_url: String,
    /// Default per-call deadline in seconds (evidence/products/graph).
    pub timeout_s: f64,
    /// Vision call deadline in seconds.
    pub vision_timeout_s: f64,
    /// STT/TTS call deadline in seconds.
    pub audio_timeout_s: f64,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            knowledge_base_url: "http://127.0.0.1:8010".into(),
            products_base_url: "http://127.0.0.1:8020".into(),
            graph_base_url: "http://127.0.0.1:8031".into(),
            vision_base_url: "http://127.0.0.1:8032".into(),
            stt_base_url: "http://127.0.0.1:8033".into(),
            tts_base_url: "http://127.0.0.1:8034".into(),
            timeout_s: 3.0,
            vision_timeout_s: 10.0,
            audio_timeout_s: 15.0,
        }
    }
}

impl ServiceEndpoints {
    /// Load from the environment, applying defaults for absent variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            knowledge_base_url: env_string("KNOWLEDGE_MCP_URL", &defaults.knowledge_base_url),
            products_base_url: env_string("PRODUCTS_MCP_URL", &defaults.products_base_url),
            graph_base_url: env_string("GRAPH_MCP_URL", &defaults.graph_base_url),
            vision_base_url: env_string("VISION_MCP_URL", &defaults.vision_base_url),
            stt_base_url: env_string("STT_MCP_URL", &defaults.stt_base_url),
            tts_base_url: env_string("TTS_MCP_URL", &defaults.tts_base_url),
            timeout_s: env_f64("MCP_TIMEOUT_S", defaults.timeout_s)?,
            vision_timeout_s: env_f64("VISION_MCP_TIMEOUT_S", defaults.vision_timeout_s)?,
            audio_timeout_s: env_f64("AUDIO_MCP_TIMEOUT_S", defaults.audio_timeout_s)?,
        })
    }

    /// Default deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s)
    }

    /// Vision deadline as a [`Duration`].
    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.vision_timeout_s)
    }

    /// STT/TTS deadline as a [`Duration`].
    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.audio_timeout_s)
    }
}

// ---------------------------------------------------------------------------
// Cache TTLs
// ---------------------------------------------------------------------------

/// Per-cache time-to-live values, read at service startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtls {
    /// Evidence cache TTL, seconds.
    pub evidence_s: u64,
    /// Products cache TTL, seconds.
    pub products_s: u64,
    /// Graph cache TTL, seconds.
    pub graph_s: u64,
    /// Vision cache TTL, seconds.
    pub vision_s: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            evidence_s: 300,
            products_s: 300,
            graph_s: 300,
            vision_s: 3600,
        }
    }
}

impl CacheTtls {
    /// Load from the environment, applying defaults for absent variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            evidence_s: env_u64("EVIDENCE_CACHE_TTL_SECONDS", defaults.evidence_s)?,
            products_s: env_u64("PRODUCTS_CACHE_TTL_SECONDS", defaults.products_s)?,
            graph_s: env_u64("GRAPH_CACHE_TTL_SECONDS", defaults.graph_s)?,
            vision_s: env_u64("VISION_CACHE_TTL_SECONDS", defaults.vision_s)?,
        })
    }

    /// Evidence TTL as a [`Duration`].
    pub fn evidence(&self) -> Duration {
        Duration::from_secs(self.evidence_s)
    }

    /// Products TTL as a [`Duration`].
    pub fn products(&self) -> Duration {
        Duration::from_secs(self.products_s)
    }

    /// Graph TTL as a [`Duration`].
    pub fn graph(&self) -> Duration {
        Duration::from_secs(self.graph_s)
    }

    /// Vision TTL as a [`Duration`].
    pub fn vision(&self) -> Duration {
        Duration::from_secs(self.vision_s)
    }
}

// ---------------------------------------------------------------------------
// Model backends
// ---------------------------------------------------------------------------

/// External model API selection for the services and the ingestion enricher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key; `None` puts services into deterministic mock mode.
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub api_base_url: String,
    /// Vision model name.
    pub vision_model: String,
    /// STT model name.
    pub stt_model: String,
    /// TTS model name.
    pub tts_model: String,
    /// Default TTS voice.
    pub tts_voice: String,
    /// Enrichment model name (ingestion).
    pub enrich_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://api.openai.com/v1".into(),
            vision_model: "gpt-4.1-mini".into(),
            stt_model: "gpt-4o-mini-transcribe".into(),
            tts_model: "gpt-4o-mini-tts".into(),
            tts_voice: "alloy".into(),
            enrich_model: "gpt-4.1-mini".into(),
        }
    }
}

impl ModelConfig {
    /// Load from the environment, applying defaults for absent variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_opt("OPENAI_API_KEY"),
            api_base_url: env_string("OPENAI_API_BASE_URL", &defaults.api_base_url),
            vision_model: env_string("VISION_MODEL", &defaults.vision_model),
            stt_model: env_string("STT_MODEL", &defaults.stt_model),
            tts_model: env_string("TTS_MODEL", &defaults.tts_model),
            tts_voice: env_string("TTS_VOICE", &defaults.tts_voice),
            enrich_model: env_string("ENRICH_MODEL", &defaults.enrich_model),
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Ingestion worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Input queue URL or name.
    pub queue_url: Option<String>,
    /// Dead-letter queue URL or name.
    pub dlq_url: Option<String>,
    /// Subtitle language preference list, highest first.
    pub subtitle_langs: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            dlq_url: None,
            subtitle_langs: ["pt", "pt-BR", "pt-PT", "en", "es"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl IngestionConfig {
    /// Load from the environment, applying defaults for absent variables.
    /// `SUBTITLE_LANGS` is a comma-separated preference list.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let subtitle_langs = match env_opt("SUBTITLE_LANGS") {
            None => defaults.subtitle_langs,
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        Self {
            queue_url: env_opt("INGESTION_QUEUE_URL"),
            dlq_url: env_opt("INGESTION_DLQ_URL"),
            subtitle_langs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; each uses its own variable name to
    // stay independent under the parallel test runner.

    #[test]
    fn endpoints_defaults() {
        let e = ServiceEndpoints::default();
        assert_eq!(e.knowledge_base_url, "http://127.0.0.1:8010");
        assert_eq!(e.tts_base_url, "http://127.0.0.1:8034");
        assert_eq!(e.timeout(), Duration::from_secs(3));
        assert_eq!(e.vision_timeout(), Duration::from_secs(10));
        assert_eq!(e.audio_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn cache_ttl_defaults() {
        let t = CacheTtls::default();
        assert_eq!(t.evidence(), Duration::from_secs(300));
        assert_eq!(t.vision(), Duration::from_secs(3600));
    }

    #[test]
    fn model_defaults_have_no_key() {
        let m = ModelConfig::default();
        assert!(m.api_key.is_none());
        assert_eq!(m.tts_voice, "alloy");
    }

    #[test]
    fn ingestion_default_language_preference() {
        let c = IngestionConfig::default();
        assert_eq!(c.subtitle_langs, ["pt", "pt-BR", "pt-PT", "en", "es"]);
        assert!(c.queue_url.is_none());
    }

    #[test]
    fn require_env_missing_is_error() {
        let err = require_env("VOY_TEST_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
        let voy: VoyError = err.into();
        assert_eq!(voy.kind, ErrorKind::FatalMisconfiguration);
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("VOY_TEST_KNOWLEDGE_URL_SENTINEL", "http://knowledge:9999");
        // env_string reads arbitrary names; exercise it directly.
        assert_eq!(
            env_string("VOY_TEST_KNOWLEDGE_URL_SENTINEL", "default"),
            "http://knowledge:9999"
        );
        std::env::remove_var("VOY_TEST_KNOWLEDGE_URL_SENTINEL");
        assert_eq!(env_string("VOY_TEST_KNOWLEDGE_URL_SENTINEL", "default"), "default");
    }

    #[test]
    fn invalid_numeric_env_is_error() {
        std::env::set_var("VOY_TEST_BAD_TIMEOUT", "not-a-number");
        let err = env_f64("VOY_TEST_BAD_TIMEOUT", 3.0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("VOY_TEST_BAD_TIMEOUT");
    }

    #[test]
    fn subtitle_langs_parse_from_csv() {
        std::env::set_var("SUBTITLE_LANGS", "en, es ,pt");
        let c = IngestionConfig::from_env();
        assert_eq!(c.subtitle_langs, ["en", "es", "pt"]);
        std::env::remove_var("SUBTITLE_LANGS");
    }
}
