// SPDX-License-Identifier: MIT OR Apache-2.0
//! OpenAI-compatible model backends for the vision, STT, and TTS services.
//!
//! Constructed only when an API key is configured; otherwise the services
//! run in mock mode.

use crate::backend::{SttModel, Transcription, TtsModel, VisionModel};
use async_trait::async_trait;
use serde_json::json;
use voy_config::ModelConfig;
use voy_contract::vision::VisionMode;
use voy_error::VoyError;

fn auth_header(api_key: &str) -> String {
    format!("Bearer {api_key}")
}

/// Vision via `POST /chat/completions` with an image content part.
pub struct OpenAiVisionModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiVisionModel {
    /// Build from configuration; `None` when no API key is set.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.api_base_url.clone(),
            model: config.vision_model.clone(),
        })
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionModel {
    async fn complete(
        &self,
        _mode: VisionMode,
        system: &str,
        user: &str,
        image_ref: &str,
    ) -> Result<String, VoyError> {
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": [
                    {"type": "text", "text": user},
                    {"type": "image_url", "image_url": {"url": image_ref}},
                ]},
            ],
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("authorization", auth_header(&self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("vision model call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "vision model returned status {}",
                response.status()
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("vision model returned non-JSON: {err}")))?;
        Ok(value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// STT via `POST /audio/transcriptions` (multipart upload).
pub struct OpenAiSttModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSttModel {
    /// Build from configuration; `None` when no API key is set.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.api_base_url.clone(),
            model: config.stt_model.clone(),
        })
    }
}

#[async_trait]
impl SttModel for OpenAiSttModel {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: &str,
        language: Option<&str>,
    ) -> Result<Transcription, VoyError> {
        let file = reqwest::multipart::Part::bytes(audio)
            .file_name(format!("audio.{format}"))
            .mime_str(&format!("audio/{format}"))
            .map_err(|err| VoyError::parse(format!("bad audio mime: {err}")))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        let response = self
            .http
            .post(format!(
                "{}/audio/transcriptions",
                self.base_url.trim_end_matches('/')
            ))
            .header("authorization", auth_header(&self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("stt call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "stt api returned status {}",
                response.status()
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("stt api returned non-JSON: {err}")))?;
        Ok(Transcription {
            text: value["text"].as_str().unwrap_or_default().to_string(),
            language: language.map(str::to_string),
            confidence: None,
            duration_seconds: value["usage"]["seconds"].as_f64(),
        })
    }
}

/// TTS via `POST /audio/speech` returning raw audio bytes.
pub struct OpenAiTtsModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiTtsModel {
    /// Build from configuration; `None` when no API key is set.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.api_base_url.clone(),
            model: config.tts_model.clone(),
        })
    }
}

#[async_trait]
impl TtsModel for OpenAiTtsModel {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
        speed: f64,
    ) -> Result<Vec<u8>, VoyError> {
        let body = json!({
            "model": self.model,
            "voice": voice,
            "input": text,
            "response_format": format,
            "speed": speed,
        });
        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url.trim_end_matches('/')))
            .header("authorization", auth_header(&self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("tts call failed: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "tts api returned status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| VoyError::upstream(format!("tts body read failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}
