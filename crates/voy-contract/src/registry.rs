// SPDX-License-Identifier: MIT OR Apache-2.0
//! The contract registry: a fixed set of JSON schemas compiled once at
//! startup and immutable for the process lifetime.
//!
//! Schemas are authored here rather than generated from the Rust types; the
//! Rust types mirror them. Validation is structural, not semantic.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use voy_error::VoyError;

/// Logical schema names accepted by [`ContractRegistry::validate`].
pub const SCHEMA_NAMES: [&str; 15] = [
    "travel_evidence_request",
    "travel_evidence",
    "product_candidates_request",
    "product_candidates",
    "graph_rag_request",
    "graph_rag",
    "vision_signals_request",
    "vision_signals",
    "stt_transcript_request",
    "stt_transcript",
    "tts_audio_request",
    "tts_audio",
    "assembled_response",
    "feedback_event",
    "ingestion_event",
];

fn envelope_schema(request: Value) -> Value {
    json!({
        "type": "object",
        "required": ["x_contract_version", "request"],
        "properties": {
            "x_contract_version": {"type": "string", "minLength": 1},
            "request": request,
        },
    })
}

fn evidence_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["user_query"],
        "properties": {
            "user_query": {"type": "string", "minLength": 1},
            "destination": {"type": ["string", "null"]},
            "lang": {"type": ["string", "null"]},
            "debug": {"type": "boolean"},
            "strategy_params": {"type": ["object", "null"]},
        },
    })
}

fn travel_evidence_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "travel_evidence",
        "type": "object",
        "required": ["x_contract_version", "request", "evidence"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": evidence_request_props(),
            "expanded_queries": {
                "type": ["array", "null"],
                "items": {"type": "string"},
            },
            "evidence": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["card_id", "summary", "confidence", "source_url"],
                    "properties": {
                        "card_id": {"type": "string", "minLength": 8},
                        "summary": {"type": "string", "minLength": 10},
                        "signals": {"type": "array", "items": {"type": "string"}},
                        "places": {"type": "array", "items": {"type": "string"}},
                        "categories": {"type": "array", "items": {"type": "string"}},
                        "primary_category": {"type": "string"},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "source_url": {"type": "string", "minLength": 8},
                        "video_upload_date": {"type": ["string", "null"]},
                        "score": {"type": ["object", "null"]},
                        "seen_in_queries": {"type": ["array", "null"]},
                        "rerank": {
                            "type": ["object", "null"],
                            "properties": {
                                "rank": {"type": "integer", "minimum": 1},
                                "reason": {"type": "string"},
                            },
                        },
                    },
                },
            },
            "debug": {"type": ["object", "null"]},
        },
    })
}

fn product_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["query_signature"],
        "properties": {
            "query_signature": {"type": "string", "minLength": 1},
            "destination": {"type": ["string", "null"]},
            "market": {"type": ["string", "null"]},
            "lang": {"type": ["string", "null"]},
            "limit": {"type": ["integer", "null"], "minimum": 1},
            "min_confidence": {"type": ["number", "null"], "minimum": 0.0, "maximum": 1.0},
        },
    })
}

fn product_candidates_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "product_candidates",
        "type": "object",
        "required": ["x_contract_version", "request", "candidates"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": product_request_props(),
            "candidates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["product_id", "summary", "merchant", "link", "categories", "confidence"],
                    "properties": {
                        "product_id": {"type": "string", "minLength": 8},
                        "summary": {"type": "string", "minLength": 10},
                        "merchant": {"type": "string"},
                        "link": {"type": "string", "minLength": 8},
                        "categories": {"type": "array", "items": {"type": "string"}},
                        "primary_category": {"type": ["string", "null"]},
                        "triggers": {"type": ["array", "null"], "items": {"type": "string"}},
                        "constraints": {"type": ["array", "null"], "items": {"type": "string"}},
                        "affiliate_priority": {"type": ["number", "null"], "minimum": 0.0, "maximum": 1.0},
                        "user_value": {"type": ["number", "null"], "minimum": 0.0, "maximum": 1.0},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                        "score": {"type": ["object", "null"]},
                    },
                },
            },
        },
    })
}

fn graph_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["user_query"],
        "properties": {
            "user_query": {"type": "string", "minLength": 1},
            "destination": {"type": ["string", "null"]},
            "lang": {"type": ["string", "null"]},
            "limit": {"type": ["integer", "null"], "minimum": 1, "maximum": 50},
            "debug": {"type": "boolean"},
        },
    })
}

fn edge_evidence_props() -> Value {
    json!({
        "type": "object",
        "required": ["videoUrl", "timestampUrl", "startSec", "endSec"],
        "properties": {
            "videoUrl": {"type": "string", "minLength": 8},
            "timestampUrl": {"type": "string", "minLength": 8},
            "startSec": {"type": "integer", "minimum": 0},
            "endSec": {"type": "integer", "minimum": 0},
            "chunkIdx": {"type": ["integer", "null"]},
        },
    })
}

fn graph_rag_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "graph_rag",
        "type": "object",
        "required": ["x_contract_version", "request", "subgraph"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": graph_request_props(),
            "subgraph": {
                "type": "object",
                "required": ["nodes", "edges"],
                "properties": {
                    "nodes": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["id", "type", "name"],
                            "properties": {
                                "id": {"type": "string", "minLength": 2},
                                "type": {
                                    "type": "string",
                                    "enum": [
                                        "city", "place", "poi", "itinerary", "dayplan",
                                        "activity_type", "advice", "constraint",
                                    ],
                                },
                                "name": {"type": "string", "minLength": 1},
                                "aliases": {"type": "array", "items": {"type": "string"}},
                                "properties": {"type": "object"},
                            },
                        },
                    },
                    "edges": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["source", "type", "target", "evidence"],
                            "properties": {
                                "source": {"type": "string"},
                                "type": {
                                    "type": "string",
                                    "enum": [
                                        "ITINERARY_FOR", "HAS_DAY", "INCLUDES_POI", "IN_AREA",
                                        "ORDER_BEFORE", "CLUSTERED_BY", "SUGGESTED_DAYS",
                                        "HAS_ACTIVITY_TYPE", "HAS_ADVICE", "HAS_CONSTRAINT",
                                    ],
                                },
                                "target": {"type": "string"},
                                "properties": {"type": "object"},
                                "evidence": edge_evidence_props(),
                            },
                        },
                    },
                },
            },
            "paths": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["path_id"],
                    "properties": {
                        "path_id": {"type": "string"},
                        "label": {"type": ["string", "null"]},
                        "nodes": {"type": "array", "items": {"type": "string"}},
                        "edges": {"type": "array", "items": {"type": "string"}},
                        "evidence": {"type": "array", "items": edge_evidence_props()},
                    },
                },
            },
            "debug": {"type": ["object", "null"]},
        },
    })
}

fn vision_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["image_ref", "mode"],
        "properties": {
            "image_ref": {"type": "string", "minLength": 1},
            "mode": {"type": "string", "enum": ["packing", "landmark", "product_similarity"]},
            "trip_context": {"type": ["object", "null"]},
            "user_query": {"type": ["string", "null"]},
            "lang": {"type": ["string", "null"]},
            "debug": {"type": "boolean"},
        },
    })
}

fn vision_signals_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "vision_signals",
        "type": "object",
        "required": ["x_contract_version", "request", "signals"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": vision_request_props(),
            "signals": {
                "type": "object",
                "required": ["mode", "confidence"],
                "properties": {
                    "mode": {"type": "string", "enum": ["packing", "landmark", "product_similarity"]},
                    "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "error": {"type": ["string", "null"]},
                    "detected_items": {"type": ["array", "null"], "items": {"type": "string"}},
                    "missing_categories": {"type": ["array", "null"], "items": {"type": "string"}},
                    "suitability_ok": {"type": ["boolean", "null"]},
                    "suitability_issue": {"type": ["string", "null"]},
                    "suggested_categories_for_products": {"type": ["array", "null"], "items": {"type": "string"}},
                    "scene_type": {"type": ["string", "null"]},
                    "ocr_text": {"type": ["array", "null"], "items": {"type": "string"}},
                    "distinctive_features": {"type": ["array", "null"], "items": {"type": "string"}},
                    "language_hint": {"type": ["string", "null"]},
                    "place_candidates": {
                        "type": ["array", "null"],
                        "maxItems": 3,
                        "items": {
                            "type": "object",
                            "required": ["place_name"],
                            "properties": {
                                "place_name": {"type": "string", "minLength": 1},
                                "confidence": {"type": ["number", "null"], "minimum": 0.0, "maximum": 1.0},
                                "reason": {"type": ["string", "null"]},
                            },
                        },
                    },
                    "category": {"type": ["string", "null"]},
                    "attributes": {"type": ["object", "null"]},
                    "style_keywords": {"type": ["array", "null"], "items": {"type": "string"}},
                    "search_queries": {"type": ["array", "null"], "items": {"type": "string"}},
                },
            },
            "debug": {"type": ["object", "null"]},
        },
    })
}

fn stt_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["audio_ref"],
        "properties": {
            "audio_ref": {"type": "string", "minLength": 1},
            "language": {"type": ["string", "null"]},
            "debug": {"type": "boolean"},
        },
    })
}

fn stt_transcript_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "stt_transcript",
        "type": "object",
        "required": ["x_contract_version", "request", "transcript"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": stt_request_props(),
            "transcript": {"type": "string"},
            "language": {"type": ["string", "null"]},
            "confidence": {"type": ["number", "null"], "minimum": 0.0, "maximum": 1.0},
            "duration_seconds": {"type": ["number", "null"], "minimum": 0.0},
            "error": {"type": ["string", "null"]},
            "debug": {"type": ["object", "null"]},
        },
    })
}

fn tts_request_props() -> Value {
    json!({
        "type": "object",
        "required": ["text"],
        "properties": {
            "text": {"type": "string", "minLength": 1},
            "voice": {"type": ["string", "null"]},
            "language": {"type": ["string", "null"]},
            "speed": {"type": ["number", "null"], "minimum": 0.25, "maximum": 4.0},
            "format": {
                "type": ["string", "null"],
                "enum": ["mp3", "opus", "aac", "wav", "pcm", null],
            },
            "debug": {"type": "boolean"},
        },
    })
}

fn tts_audio_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "tts_audio",
        "type": "object",
        "required": ["x_contract_version", "request", "audio_ref"],
        "properties": {
            "x_contract_version": {"type": "string", "const": "1.0"},
            "request": tts_request_props(),
            "audio_ref": {"type": "string", "minLength": 1},
            "format": {
                "type": ["string", "null"],
                "enum": ["mp3", "opus", "aac", "wav", "pcm", null],
            },
            "duration_seconds": {"type": ["number", "null"], "minimum": 0.0},
            "error": {"type": ["string", "null"]},
            "debug": {"type": ["object", "null"]},
        },
    })
}

fn assembled_response_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "assembled_response",
        "type": "object",
        "required": ["session_id", "request_id", "answer_text", "citations", "addon"],
        "properties": {
            "session_id": {"type": "string", "minLength": 1},
            "request_id": {"type": "string", "minLength": 1},
            "answer_text": {"type": "string"},
            "citations": {"type": "array", "items": {"type": "string"}},
            "addon": {
                "type": ["object", "null"],
                "required": ["product_id", "summary", "link", "merchant"],
                "properties": {
                    "product_id": {"type": "string", "minLength": 1},
                    "summary": {"type": "string"},
                    "link": {"type": "string", "minLength": 1},
                    "merchant": {"type": "string"},
                },
            },
            "audio_ref": {"type": ["string", "null"], "minLength": 1},
            "spoken_version": {"type": ["string", "null"]},
            "screen_summary": {"type": ["string", "null"]},
        },
    })
}

fn feedback_event_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "feedback_event",
        "type": "object",
        "required": [
            "x_contract_version", "event_id", "timestamp", "session_id",
            "user_query", "answer_text", "rating",
        ],
        "properties": {
            "x_contract_version": {"type": "string"},
            "event_id": {"type": "string", "minLength": 8},
            "timestamp": {"type": "string", "minLength": 10},
            "session_id": {"type": "string", "minLength": 1},
            "user_query": {"type": "string", "minLength": 1},
            "answer_text": {"type": "string"},
            "rating": {"type": "integer", "minimum": 1, "maximum": 5},
            "comment": {"type": ["string", "null"]},
        },
    })
}

fn ingestion_event_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "ingestion_event",
        "type": "object",
        "required": ["event_id", "content_source_id", "stage"],
        "properties": {
            "event_id": {"type": "string", "minLength": 1},
            "content_source_id": {"type": "string", "minLength": 1},
            "stage": {
                "type": "string",
                "enum": [
                    "requested", "transcript", "chunks",
                    "enrichment", "embeddings", "write_complete",
                ],
            },
            "payload": {},
            "retry_count": {"type": "integer", "minimum": 0},
            "max_retries": {"type": "integer", "minimum": 0},
            "error": {"type": ["string", "null"]},
        },
    })
}

fn schema_for(name: &str) -> Option<Value> {
    match name {
        "travel_evidence_request" => Some(envelope_schema(evidence_request_props())),
        "travel_evidence" => Some(travel_evidence_schema()),
        "product_candidates_request" => Some(envelope_schema(product_request_props())),
        "product_candidates" => Some(product_candidates_schema()),
        "graph_rag_request" => Some(envelope_schema(graph_request_props())),
        "graph_rag" => Some(graph_rag_schema()),
        "vision_signals_request" => Some(envelope_schema(vision_request_props())),
        "vision_signals" => Some(vision_signals_schema()),
        "stt_transcript_request" => Some(envelope_schema(stt_request_props())),
        "stt_transcript" => Some(stt_transcript_schema()),
        "tts_audio_request" => Some(envelope_schema(tts_request_props())),
        "tts_audio" => Some(tts_audio_schema()),
        "assembled_response" => Some(assembled_response_schema()),
        "feedback_event" => Some(feedback_event_schema()),
        "ingestion_event" => Some(ingestion_event_schema()),
        _ => None,
    }
}

/// Compiled schema registry; immutable for the process lifetime.
pub struct ContractRegistry {
    validators: BTreeMap<&'static str, jsonschema::Validator>,
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractRegistry {
    /// Compile all registered schemas. The schema set is static, so a
    /// compilation failure is a programming error.
    pub fn new() -> Self {
        let mut validators = BTreeMap::new();
        for name in SCHEMA_NAMES {
            let schema = schema_for(name).expect("schema listed in SCHEMA_NAMES");
            let validator =
                jsonschema::validator_for(&schema).expect("registered schema must compile");
            validators.insert(name, validator);
        }
        Self { validators }
    }

    /// Registered schema names.
    pub fn names(&self) -> Vec<&'static str> {
        self.validators.keys().copied().collect()
    }

    /// Validate a payload against the named schema.
    ///
    /// Returns a `ContractViolation` listing every failing instance path.
    pub fn validate(&self, payload: &Value, schema_name: &str) -> Result<(), VoyError> {
        let validator = self.validators.get(schema_name).ok_or_else(|| {
            VoyError::contract_violation(format!("unknown contract schema: {schema_name}"))
                .with_context("schema", schema_name)
        })?;

        let errors: Vec<String> = validator
            .iter_errors(payload)
            .map(|err| format!("{}: {err}", err.instance_path))
            .collect();
        if errors.is_empty() {
            return Ok(());
        }
        Err(
            VoyError::contract_violation(format!("payload does not match {schema_name}"))
                .with_context("schema", schema_name)
                .with_context("errors", &errors),
        )
    }

    /// Whether the payload validates, without error detail.
    pub fn is_valid(&self, payload: &Value, schema_name: &str) -> bool {
        self.validators
            .get(schema_name)
            .map(|v| v.is_valid(payload))
            .unwrap_or(false)
    }
}
