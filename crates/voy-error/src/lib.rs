// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for Voyager.
//!
//! Every error carries an [`ErrorKind`] (a machine-readable, stable string
//! tag) plus a human-readable message and optional structured context. The
//! kinds mirror the propagation policy of the system: contract violations
//! surface to callers, upstream/parse/timeout failures are recovered locally
//! by the retrieval services, and fatal misconfiguration aborts startup.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable error kind.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A payload failed JSON-schema validation against its contract.
    ContractViolation,
    /// A network peer, subprocess, or external API was unreachable or failed.
    UpstreamUnavailable,
    /// A payload was structurally broken outside of schema validation
    /// (bad JSON, bad data URL, undecodable model output).
    ParseFailure,
    /// A deadline elapsed before the operation completed.
    Timeout,
    /// A required configuration value is missing or invalid at startup.
    FatalMisconfiguration,
    /// A queue operation failed (send, receive, acknowledge).
    QueueFailure,
    /// A vector/graph store write or read failed.
    StoreFailure,
}

impl ErrorKind {
    /// Stable `&'static str` representation (e.g. `"CONTRACT_VIOLATION"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractViolation => "CONTRACT_VIOLATION",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::ParseFailure => "PARSE_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::FatalMisconfiguration => "FATAL_MISCONFIGURATION",
            Self::QueueFailure => "QUEUE_FAILURE",
            Self::StoreFailure => "STORE_FAILURE",
        }
    }

    /// Whether a retrieval service must recover from this error locally
    /// (fallback result) rather than surface it to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable | Self::ParseFailure | Self::Timeout | Self::StoreFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// VoyError
// ---------------------------------------------------------------------------

/// Unified Voyager error.
///
/// Carries a stable [`ErrorKind`], a human-readable message, and arbitrary
/// structured context for diagnostics.
///
/// # Builder usage
///
/// ```
/// use voy_error::{ErrorKind, VoyError};
///
/// let err = VoyError::new(ErrorKind::Timeout, "evidence call exceeded deadline")
///     .with_context("service", "knowledge")
///     .with_context("timeout_ms", 3000);
/// assert_eq!(err.kind, ErrorKind::Timeout);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("[{}] {message}", kind.as_str())]
pub struct VoyError {
    /// Machine-readable error kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl VoyError {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Shorthand for a [`ErrorKind::ContractViolation`].
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContractViolation, message)
    }

    /// Shorthand for an [`ErrorKind::UpstreamUnavailable`].
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }

    /// Shorthand for a [`ErrorKind::ParseFailure`].
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailure, message)
    }

    /// Shorthand for a [`ErrorKind::Timeout`].
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for a [`ErrorKind::FatalMisconfiguration`].
    pub fn misconfiguration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FatalMisconfiguration, message)
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; entries that fail
    /// to serialise are silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Whether the owning service should fall back rather than propagate.
    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VoyError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
