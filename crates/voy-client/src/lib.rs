// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-client
//!
//! One long-lived HTTP client addressing the six retrieval services. Each
//! call posts a versioned [`Envelope`], decodes the JSON response, validates
//! it against the contract registry, and only then deserializes into the
//! typed response. A response that fails validation is reported as a
//! `ContractViolation` so the orchestrator treats the branch as failed.

#![deny(unsafe_code)]

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use voy_config::ServiceEndpoints;
use voy_contract::audio::{SttRequest, SttResponse, TtsRequest, TtsResponse};
use voy_contract::evidence::{EvidenceRequest, EvidenceResponse};
use voy_contract::graph::{GraphRequest, GraphResponse};
use voy_contract::products::{ProductRequest, ProductResponse};
use voy_contract::vision::{VisionRequest, VisionResponse};
use voy_contract::{ContractRegistry, Envelope};
use voy_error::VoyError;

/// Correlation ids forwarded as `x-session-id` / `x-request-id` headers.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Session id, when known.
    pub session_id: Option<String>,
    /// Request id, when known.
    pub request_id: Option<String>,
}

impl CallContext {
    /// Context carrying both ids.
    pub fn new(session_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            request_id: Some(request_id.into()),
        }
    }
}

/// Shared client pool: one `reqwest::Client`, per-contract deadlines.
pub struct ServiceClient {
    http: reqwest::Client,
    endpoints: ServiceEndpoints,
    registry: Arc<ContractRegistry>,
}

impl ServiceClient {
    /// Build the pool from resolved endpoints and a compiled registry.
    pub fn new(endpoints: ServiceEndpoints, registry: Arc<ContractRegistry>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            registry,
        }
    }

    /// The configured endpoints.
    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    async fn call<Req, Resp>(
        &self,
        base_url: &str,
        operation: &str,
        schema_name: &str,
        timeout: Duration,
        request: &Req,
        ctx: &CallContext,
    ) -> Result<Resp, VoyError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/mcp/{operation}", base_url.trim_end_matches('/'));
        let envelope = Envelope::new(request);

        let mut builder = self.http.post(&url).timeout(timeout).json(&envelope);
        if let Some(session_id) = &ctx.session_id {
            builder = builder.header("x-session-id", session_id);
        }
        if let Some(request_id) = &ctx.request_id {
            builder = builder.header("x-request-id", request_id);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                VoyError::timeout(format!("{operation} exceeded deadline"))
                    .with_context("url", &url)
            } else {
                VoyError::upstream(format!("{operation} request failed: {err}"))
                    .with_context("url", &url)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoyError::upstream(format!(
                "{operation} returned status {status}"
            ))
            .with_context("url", &url)
            .with_context("status", status.as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(|err| {
            VoyError::parse(format!("{operation} returned non-JSON body: {err}"))
                .with_context("url", &url)
        })?;

        self.registry.validate(&body, schema_name)?;
        debug!(target: "voy::client", operation, "response validated");

        serde_json::from_value(body).map_err(|err| {
            VoyError::parse(format!("{operation} response failed to deserialize: {err}"))
        })
    }

    /// `POST /mcp/retrieve_travel_evidence`.
    pub async fn retrieve_travel_evidence(
        &self,
        request: &EvidenceRequest,
        ctx: &CallContext,
    ) -> Result<EvidenceResponse, VoyError> {
        self.call(
            &self.endpoints.knowledge_base_url,
            "retrieve_travel_evidence",
            "travel_evidence",
            self.endpoints.timeout(),
            request,
            ctx,
        )
        .await
    }

    /// `POST /mcp/retrieve_product_candidates`.
    pub async fn retrieve_product_candidates(
        &self,
        request: &ProductRequest,
        ctx: &CallContext,
    ) -> Result<ProductResponse, VoyError> {
        self.call(
            &self.endpoints.products_base_url,
            "retrieve_product_candidates",
            "product_candidates",
            self.endpoints.timeout(),
            request,
            ctx,
        )
        .await
    }

    /// `POST /mcp/retrieve_travel_graph`.
    pub async fn retrieve_travel_graph(
        &self,
        request: &GraphRequest,
        ctx: &CallContext,
    ) -> Result<GraphResponse, VoyError> {
        self.call(
            &self.endpoints.graph_base_url,
            "retrieve_travel_graph",
            "graph_rag",
            self.endpoints.timeout(),
            request,
            ctx,
        )
        .await
    }

    /// `POST /mcp/analyze_image`.
    pub async fn analyze_image(
        &self,
        request: &VisionRequest,
        ctx: &CallContext,
    ) -> Result<VisionResponse, VoyError> {
        self.call(
            &self.endpoints.vision_base_url,
            "analyze_image",
            "vision_signals",
            self.endpoints.vision_timeout(),
            request,
            ctx,
        )
        .await
    }

    /// `POST /mcp/transcribe`.
    pub async fn transcribe(
        &self,
        request: &SttRequest,
        ctx: &CallContext,
    ) -> Result<SttResponse, VoyError> {
        self.call(
            &self.endpoints.stt_base_url,
            "transcribe",
            "stt_transcript",
            self.endpoints.audio_timeout(),
            request,
            ctx,
        )
        .await
    }

    /// `POST /mcp/synthesize`.
    pub async fn synthesize(
        &self,
        request: &TtsRequest,
        ctx: &CallContext,
    ) -> Result<TtsResponse, VoyError> {
        self.call(
            &self.endpoints.tts_base_url,
            "synthesize",
            "tts_audio",
            self.endpoints.audio_timeout(),
            request,
            ctx,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voy_error::ErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ServiceClient {
        let endpoints = ServiceEndpoints {
            knowledge_base_url: server.uri(),
            products_base_url: server.uri(),
            graph_base_url: server.uri(),
            vision_base_url: server.uri(),
            stt_base_url: server.uri(),
            tts_base_url: server.uri(),
            timeout_s: 1.0,
            vision_timeout_s: 1.0,
            audio_timeout_s: 1.0,
        };
        ServiceClient::new(endpoints, Arc::new(ContractRegistry::new()))
    }

    fn evidence_body() -> serde_json::Value {
        json!({
            "x_contract_version": "1.0",
            "request": {"user_query": "dicas Disney"},
            "evidence": [{
                "card_id": "evid_001_tips",
                "summary": "Best times to visit are early morning.",
                "signals": ["timing"],
                "places": ["Orlando"],
                "categories": ["tips"],
                "primary_category": "tips",
                "confidence": 0.9,
                "source_url": "https://example.com/tips",
            }],
        })
    }

    #[tokio::test]
    async fn evidence_call_posts_envelope_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/retrieve_travel_evidence"))
            .and(header("x-session-id", "s1"))
            .and(header("x-request-id", "r1"))
            .and(body_partial_json(json!({"x_contract_version": "1.0"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(evidence_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let out = client
            .retrieve_travel_evidence(
                &EvidenceRequest::new("dicas Disney"),
                &CallContext::new("s1", "r1"),
            )
            .await
            .unwrap();
        assert_eq!(out.evidence.len(), 1);
        assert_eq!(out.evidence[0].source_url, "https://example.com/tips");
    }

    #[tokio::test]
    async fn invalid_response_is_contract_violation() {
        let server = MockServer::start().await;
        // Missing required `evidence` array.
        Mock::given(method("POST"))
            .and(path("/mcp/retrieve_travel_evidence"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "x_contract_version": "1.0",
                "request": {"user_query": "q"},
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .retrieve_travel_evidence(&EvidenceRequest::new("q"), &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ContractViolation);
    }

    #[tokio::test]
    async fn http_error_status_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/retrieve_product_candidates"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .retrieve_product_candidates(&ProductRequest::new("sig"), &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn non_json_body_is_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/retrieve_travel_graph"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .retrieve_travel_graph(&GraphRequest::new("itinerary"), &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseFailure);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/retrieve_travel_evidence"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(evidence_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .retrieve_travel_evidence(&EvidenceRequest::new("q"), &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn stt_call_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "x_contract_version": "1.0",
                "request": {"audio_ref": "data:audio/mp3;base64,x"},
                "transcript": "what is the best time to visit Orlando?",
                "language": "en",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let out = client
            .transcribe(
                &SttRequest {
                    audio_ref: "data:audio/mp3;base64,x".into(),
                    language: Some("en".into()),
                    debug: false,
                },
                &CallContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.transcript, "what is the best time to visit Orlando?");
    }

    #[tokio::test]
    async fn tts_call_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "x_contract_version": "1.0",
                "request": {"text": "Best time is November."},
                "audio_ref": "data:audio/mp3;base64,xyz789",
                "format": "mp3",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let out = client
            .synthesize(
                &TtsRequest {
                    text: "Best time is November.".into(),
                    voice: None,
                    language: Some("en".into()),
                    speed: None,
                    format: None,
                    debug: false,
                },
                &CallContext::default(),
            )
            .await
            .unwrap();
        assert!(out.audio_ref.starts_with("data:audio/"));
    }
}
