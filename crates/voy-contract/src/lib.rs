// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-contract
//!
//! The frozen cross-service contracts for Voyager.
//!
//! Every request and response crossing a service boundary is wrapped in an
//! [`Envelope`] carrying `x_contract_version`, and must validate against the
//! schema registered for it in the [`registry::ContractRegistry`]. The typed
//! records in this crate mirror those schemas; the schemas — not the Rust
//! types — are the source of truth.

#![deny(unsafe_code)]

/// Agent-edge payloads: turn requests, assembled responses, feedback events.
pub mod agent;
/// STT and TTS contracts.
pub mod audio;
/// Travel-evidence contract.
pub mod evidence;
/// Travel-graph contract.
pub mod graph;
/// Ingestion pipeline events.
pub mod ingestion;
/// Product-candidates contract.
pub mod products;
/// Schema registry and validation.
pub mod registry;
/// Vision-signals contract.
pub mod vision;

use serde::{Deserialize, Serialize};

/// Contract version string echoed in every response envelope.
pub const CONTRACT_VERSION: &str = "1.0";

/// Generic request envelope: `{x_contract_version, request}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<R> {
    /// Caller-declared contract version. Responses always echo
    /// [`CONTRACT_VERSION`] regardless of what was sent.
    pub x_contract_version: String,
    /// The nested domain request.
    pub request: R,
}

impl<R> Envelope<R> {
    /// Wrap a request with the current contract version.
    pub fn new(request: R) -> Self {
        Self {
            x_contract_version: CONTRACT_VERSION.to_string(),
            request,
        }
    }
}

pub use registry::ContractRegistry;
