// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-telemetry
//!
//! Structured telemetry for Voyager services: per-service counters, the
//! one-JSON-record-per-request log line, per-turn timings, and the pluggable
//! tracer.
//!
//! Raw user queries never enter telemetry. Correlation uses
//! [`user_query_hash`], a 16-character SHA-256 prefix.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

// ---------------------------------------------------------------------------
// Query hashing
// ---------------------------------------------------------------------------

/// Hash a user query for tags and logs; the raw query must never be logged.
pub fn user_query_hash(user_query: &str) -> String {
    let digest = Sha256::digest(user_query.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// ServiceMetrics
// ---------------------------------------------------------------------------

/// Thread-safe per-service counters. Increments are monotonic; benign races
/// between counters are acceptable.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests_total: AtomicU64,
    cache_hits_total: AtomicU64,
    backend_fallback_total: AtomicU64,
    /// Latency sum in microseconds, so an integer atomic suffices.
    sum_latency_us: AtomicU64,
}

/// Snapshot of [`ServiceMetrics`] served by `GET /metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests handled since process start.
    pub requests_total: u64,
    /// Requests served from cache.
    pub cache_hits_total: u64,
    /// Requests that fell back because the backend failed.
    pub backend_fallback_total: u64,
    /// Mean latency in milliseconds, two decimals.
    pub avg_latency_ms: f64,
}

impl ServiceMetrics {
    /// New zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request.
    pub fn record_request(&self, cache_hit: bool, latency_ms: f64, backend_fallback: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.sum_latency_us
            .fetch_add((latency_ms * 1000.0) as u64, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
        }
        if backend_fallback {
            self.backend_fallback_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current counter values with the rolling latency average.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.requests_total.load(Ordering::Relaxed);
        let sum_us = self.sum_latency_us.load(Ordering::Relaxed);
        let avg_ms = if total == 0 {
            0.0
        } else {
            sum_us as f64 / total as f64 / 1000.0
        };
        MetricsSnapshot {
            requests_total: total,
            cache_hits_total: self.cache_hits_total.load(Ordering::Relaxed),
            backend_fallback_total: self.backend_fallback_total.load(Ordering::Relaxed),
            avg_latency_ms: (avg_ms * 100.0).round() / 100.0,
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.cache_hits_total.store(0, Ordering::Relaxed);
        self.backend_fallback_total.store(0, Ordering::Relaxed);
        self.sum_latency_us.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Request logging
// ---------------------------------------------------------------------------

/// The single structured log record emitted per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// UTC timestamp, ISO-8601.
    pub ts: String,
    /// Service name (e.g. `travel-knowledge`).
    pub service: String,
    /// Route handled (e.g. `/mcp/retrieve_travel_evidence`).
    pub route: String,
    /// Whether the response came from cache.
    pub cache_hit: bool,
    /// Wall-clock latency in milliseconds, two decimals.
    pub latency_ms: f64,
    /// Session id from the `x-session-id` header, when present.
    pub session_id: Option<String>,
    /// Request id from the `x-request-id` header, when present.
    pub request_id: Option<String>,
    /// Whether the backend failed and a fallback was served.
    pub backend_fallback: bool,
}

impl RequestRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        service: impl Into<String>,
        route: impl Into<String>,
        cache_hit: bool,
        latency_ms: f64,
        session_id: Option<String>,
        request_id: Option<String>,
        backend_fallback: bool,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            service: service.into(),
            route: route.into(),
            cache_hit,
            latency_ms: (latency_ms * 100.0).round() / 100.0,
            session_id,
            request_id,
            backend_fallback,
        }
    }

    /// Emit the record as one JSON line through `tracing`.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => info!(target: "voy::request", "{line}"),
            Err(err) => info!(target: "voy::request", error = %err, "request record serialization failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn timings
// ---------------------------------------------------------------------------

/// Per-branch wall-clock timings for one orchestrator turn. Consumed by the
/// eval harness, never by responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TurnTimings {
    /// Evidence branch, milliseconds.
    pub knowledge_ms: f64,
    /// Products branch, milliseconds.
    pub products_ms: f64,
    /// Graph branch, milliseconds (zero when not routed).
    pub graph_ms: f64,
    /// Vision branch, milliseconds (zero when not routed).
    pub vision_ms: f64,
    /// STT call, milliseconds (zero when no audio).
    pub stt_ms: f64,
    /// TTS call, milliseconds (zero when not in voice mode).
    pub tts_ms: f64,
    /// Whole turn, milliseconds.
    pub total_ms: f64,
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Scoped span handle; the span ends when the guard drops, on every exit
/// path.
pub struct SpanGuard {
    name: String,
    emit_on_drop: bool,
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.emit_on_drop {
            info!(target: "voy::trace", span = %self.name, "span end");
        }
    }
}

/// A pluggable tracer. Tags always include `session_id`, `request_id`, and
/// `user_query_hash`.
pub trait Tracer: Send + Sync {
    /// Open a span; it closes when the returned guard drops.
    fn span(&self, name: &str, tags: &BTreeMap<String, String>) -> SpanGuard;
}

/// The default tracer: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn span(&self, name: &str, _tags: &BTreeMap<String, String>) -> SpanGuard {
        SpanGuard {
            name: name.to_string(),
            emit_on_drop: false,
        }
    }
}

/// A tracer that emits span boundaries through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn span(&self, name: &str, tags: &BTreeMap<String, String>) -> SpanGuard {
        info!(target: "voy::trace", span = %name, tags = ?tags, "span start");
        SpanGuard {
            name: name.to_string(),
            emit_on_drop: true,
        }
    }
}

/// Build the process tracer from the environment: `LogTracer` when
/// `VOY_TRACING_ENABLED=1`, otherwise (including on any setup problem) the
/// no-op tracer.
pub fn tracer_from_env() -> Arc<dyn Tracer> {
    match std::env::var("VOY_TRACING_ENABLED") {
        Ok(v) if v == "1" => Arc::new(LogTracer),
        _ => Arc::new(NoopTracer),
    }
}

/// Standard span tags for one turn.
pub fn span_tags(session_id: &str, request_id: &str, user_query: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("session_id".to_string(), session_id.to_string());
    tags.insert("request_id".to_string(), request_id.to_string());
    tags.insert(
        "user_query_hash".to_string(),
        user_query_hash(user_query),
    );
    tags
}
