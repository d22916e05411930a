// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-ingest
//!
//! The ingestion pipeline: a staged, idempotent, retryable processor that
//! moves a content reference through
//! `requested → transcript → chunks → enrichment → embeddings →
//! write_complete`, one stage per queue message.
//!
//! Every stage handler checks the idempotency store before working, marks
//! the key after, and emits the successor event; duplicate deliveries are
//! suppressed, failures surface as no-advance and are retried by the queue
//! worker.

#![deny(unsafe_code)]

/// Transcript chunking.
pub mod chunk;
/// LLM enrichment of chunks and product records.
pub mod enrich;
/// Deterministic object identities for upserts.
pub mod ids;
/// Idempotency store.
pub mod idempotency;
/// Knowledge-graph extraction and merging.
pub mod kg;
/// Stage handlers and dispatch.
pub mod pipeline;
/// Vector- and graph-store writers.
pub mod stores;
/// Subtitle fetching and VTT parsing.
pub mod subtitles;
