// SPDX-License-Identifier: MIT OR Apache-2.0
//! Idempotency marks for pipeline stages.
//!
//! Key strategy: `content_source_id|stage`. A key marked processed must
//! never be re-executed. The contract is check-then-mark with at most one
//! winner; the in-memory implementation serves a single process, production
//! deployments swap in a durable key-value store with the same semantics.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use voy_error::VoyError;

/// Build the idempotency key for a content source and stage.
pub fn idempotency_key(content_source_id: &str, stage: &str) -> String {
    format!("{content_source_id}|{stage}")
}

/// A set of processed stage keys shared by all workers of a process.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Whether this key has already been successfully processed.
    async fn already_processed(&self, key: &str) -> Result<bool, VoyError>;

    /// Mark a key processed. Returns `true` when this call was the winner,
    /// `false` when the key was already marked.
    async fn mark_processed(&self, key: &str) -> Result<bool, VoyError>;
}

/// In-memory idempotency set.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    processed: Mutex<HashSet<String>>,
}

impl InMemoryIdempotencyStore {
    /// New empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all marks.
    pub fn clear(&self) {
        self.processed
            .lock()
            .expect("idempotency lock poisoned")
            .clear();
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn already_processed(&self, key: &str) -> Result<bool, VoyError> {
        Ok(self
            .processed
            .lock()
            .expect("idempotency lock poisoned")
            .contains(key))
    }

    async fn mark_processed(&self, key: &str) -> Result<bool, VoyError> {
        Ok(self
            .processed
            .lock()
            .expect("idempotency lock poisoned")
            .insert(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shape() {
        assert_eq!(idempotency_key("youtube:v1", "transcript"), "youtube:v1|transcript");
        assert_eq!(idempotency_key("products:b1", "chunks"), "products:b1|chunks");
    }

    #[tokio::test]
    async fn check_then_mark() {
        let store = InMemoryIdempotencyStore::new();
        assert!(!store.already_processed("k").await.unwrap());
        assert!(store.mark_processed("k").await.unwrap());
        assert!(store.already_processed("k").await.unwrap());
    }

    #[tokio::test]
    async fn second_mark_loses() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.mark_processed("k").await.unwrap());
        assert!(!store.mark_processed("k").await.unwrap());
    }

    #[tokio::test]
    async fn clear_resets() {
        let store = InMemoryIdempotencyStore::new();
        store.mark_processed("k").await.unwrap();
        store.clear();
        assert!(!store.already_processed("k").await.unwrap());
    }
}
