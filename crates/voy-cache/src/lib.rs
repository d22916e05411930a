// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-cache
//!
//! Process-local TTL cache used by every retrieval service, plus the cache
//! key builders.
//!
//! Entries are evicted lazily: `get` drops an expired entry and reports a
//! miss; there is no background sweeper. `set` overwrites. Failed upstream
//! lookups must never be cached — only successful raw results go in, so a
//! later fallback can never poison a good entry.

#![deny(unsafe_code)]

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

/// A mapping from normalized string keys to values with per-entry expiry.
///
/// Interior mutability (a `Mutex`) so services can share one instance behind
/// an `Arc`; concurrent misses may redundantly fetch, which is acceptable —
/// there is no single-flight requirement.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, (V, Instant)>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries live for `ttl` from the moment of `set`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` if present and not expired. An expired
    /// entry is evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some((_, expires_at)) if Instant::now() >= *expires_at => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    /// Store `value` under `key` with expiry `now + ttl`, overwriting any
    /// previous entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.into(), (value, Instant::now() + self.ttl));
    }

    /// Number of stored entries, including not-yet-evicted expired ones.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

// ---------------------------------------------------------------------------
// Key builders
// ---------------------------------------------------------------------------

/// Normalize one key part: trim, collapse inner whitespace runs to a single
/// space, lowercase. `None` becomes the empty string.
pub fn normalize_part(part: Option<&str>) -> String {
    let Some(part) = part else {
        return String::new();
    };
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn join_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .map(|p| normalize_part(*p))
        .collect::<Vec<_>>()
        .join("|")
}

/// Evidence cache key: `(user_query, destination, lang, strategy_version)`.
pub fn evidence_key(
    user_query: &str,
    destination: Option<&str>,
    lang: Option<&str>,
    strategy_version: &str,
) -> String {
    join_parts(&[
        Some(user_query),
        destination,
        lang,
        Some(strategy_version),
    ])
}

/// Products cache key: `(query_signature, market, destination, lang)`.
/// `min_confidence` is deliberately absent — it is applied as a post-filter
/// so tighter thresholds reuse looser cached results.
pub fn products_key(
    query_signature: &str,
    market: Option<&str>,
    destination: Option<&str>,
    lang: Option<&str>,
) -> String {
    join_parts(&[Some(query_signature), market, destination, lang])
}

/// Graph cache key: `(user_query, destination, lang)`.
pub fn graph_key(user_query: &str, destination: Option<&str>, lang: Option<&str>) -> String {
    join_parts(&[Some(user_query), destination, lang])
}

/// Vision cache key: `(sha256(image_ref)[..32], mode, canonical trip_context)`.
///
/// The image reference may be megabytes of base64; only its hash prefix is
/// kept. The trip context is canonicalized (object keys sorted recursively)
/// so key equality does not depend on field order.
pub fn vision_key(image_ref: &str, mode: &str, trip_context: Option<&serde_json::Value>) -> String {
    let digest = Sha256::digest(image_ref.as_bytes());
    let mut hash = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        hash.push_str(&format!("{byte:02x}"));
    }
    let ctx = canonical_json(trip_context.unwrap_or(&serde_json::json!({})));
    format!("{hash}|{mode}|{ctx}")
}

/// Render a JSON value with object keys sorted recursively.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body = keys
                .iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String((*k).clone()),
                        canonical_json(&map[*k])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn get_miss_on_empty_cache() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(300));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn set_then_get_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn set_overwrites() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("k", 1u32);
        cache.set("k", 2u32);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn expired_entry_is_evicted_on_get() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.set("k", "v".to_string());
        thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = TtlCache::new(Duration::from_secs(0));
        cache.set("k", 1u32);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("a", 1u32);
        cache.set("b", 2u32);
        cache.clear();
        assert!(cache.is_empty());
    }

    // -- normalization ---------------------------------------------------

    #[test]
    fn normalize_trims_collapses_lowercases() {
        assert_eq!(normalize_part(Some("  Disney   World  ")), "disney world");
        assert_eq!(normalize_part(Some("Orlando\t\nFL")), "orlando fl");
        assert_eq!(normalize_part(None), "");
        assert_eq!(normalize_part(Some("")), "");
    }

    #[test]
    fn evidence_key_shape() {
        let key = evidence_key("Disney  Tips", Some("Orlando"), Some("en"), "v1");
        assert_eq!(key, "disney tips|orlando|en|v1");
    }

    #[test]
    fn evidence_key_none_parts_become_empty() {
        let key = evidence_key("q", None, None, "v0");
        assert_eq!(key, "q|||v0");
    }

    #[test]
    fn products_key_excludes_min_confidence_by_construction() {
        // The builder has no confidence parameter at all; equal tuples with
        // different thresholds must collide.
        let a = products_key("orlando:disney:pt-BR", Some("BR"), Some("Orlando"), None);
        let b = products_key("Orlando:Disney:PT-br", Some("br"), Some("orlando"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn graph_key_differs_per_destination() {
        let a = graph_key("itinerary", Some("Orlando"), Some("en"));
        let b = graph_key("itinerary", Some("Paris"), Some("en"));
        assert_ne!(a, b);
    }

    #[test]
    fn vision_key_hashes_image_ref() {
        let key = vision_key("data:image/jpeg;base64,abc", "packing", None);
        let parts: Vec<&str> = key.split('|').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1], "packing");
        assert!(!key.contains("base64"));
    }

    #[test]
    fn vision_key_stable_under_context_key_order() {
        let a = vision_key(
            "img",
            "packing",
            Some(&json!({"destination": "Orlando", "temp_band": "cold"})),
        );
        let b = vision_key(
            "img",
            "packing",
            Some(&json!({"temp_band": "cold", "destination": "Orlando"})),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn vision_key_differs_per_context() {
        let a = vision_key("img", "packing", Some(&json!({"temp_band": "cold"})));
        let b = vision_key("img", "packing", Some(&json!({"temp_band": "hot"})));
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_json_sorts_nested_objects() {
        let value = json!({"b": {"z": 1, "a": [2, {"y": 3, "x": 4}]}, "a": null});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":null,"b":{"a":[2,{"x":4,"y":3}],"z":1}}"#
        );
    }

    #[test]
    fn shared_across_threads() {
        let cache = std::sync::Arc::new(TtlCache::new(Duration::from_secs(300)));
        let mut handles = vec![];
        for i in 0..8 {
            let c = cache.clone();
            handles.push(thread::spawn(move || {
                c.set(format!("k{i}"), i);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
