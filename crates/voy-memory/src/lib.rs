// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-memory
//!
//! Per-session memory: preferences and constraints extracted from queries by
//! a deterministic keyword pass, plus the last three user intents.
//!
//! The store is process-local. Callers serialize turns within a session; the
//! inner mutex only makes sharing across handler tasks safe, it does not
//! order updates.

#![deny(unsafe_code)]

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, OnceLock};

const MAX_RECENT_STEPS: usize = 3;
const MAX_SUMMARY_CHARS: usize = 500;
const MAX_INTENT_CHARS: usize = 200;

/// Memory state for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    /// Canonical preference labels (budget_style, travel_style, ...).
    pub preferences: BTreeMap<String, String>,
    /// Canonical constraint labels (group_size, dates, must, avoid).
    pub constraints: BTreeMap<String, String>,
    /// Last user intents, most recent first, deduplicated, at most three.
    pub recent_plan_steps: Vec<String>,
}

impl MemoryState {
    /// Render the bounded summary: `prefs:… constraints:… recent:…` with
    /// stable key order, at most 500 characters.
    pub fn to_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.preferences.is_empty() {
            let prefs = self
                .preferences
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(format!("prefs:{prefs}"));
        }
        if !self.constraints.is_empty() {
            let cons = self
                .constraints
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(format!("constraints:{cons}"));
        }
        if !self.recent_plan_steps.is_empty() {
            parts.push(format!("recent:{}", self.recent_plan_steps.join(";")));
        }
        let s = parts.join(" ");
        truncate_chars(&s, MAX_SUMMARY_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Structured updates a caller may merge alongside the extracted ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedUpdates {
    /// Preference overrides.
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    /// Constraint overrides.
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

struct Extractors {
    budget: Regex,
    luxury: Regex,
    adventure: Regex,
    relaxation: Regex,
    family: Regex,
    mobility: Regex,
    kids_count: Regex,
    adults_count: Regex,
    dates: Regex,
    must: Regex,
    avoid: Regex,
}

fn extractors() -> &'static Extractors {
    static CELL: OnceLock<Extractors> = OnceLock::new();
    CELL.get_or_init(|| Extractors {
        budget: Regex::new(r"\bbudget\b|\bcheap\b|\blow.?cost\b|\bhostel\b|\bbarato\b").unwrap(),
        luxury: Regex::new(r"\bluxury\b|\bpremium\b|\b5.?star\b|\bluxo\b").unwrap(),
        adventure: Regex::new(r"\badventure\b|\bhiking\b|\bbackpack\b|\baventura\b").unwrap(),
        relaxation: Regex::new(r"\brelax\b|\bbeach\b|\bspa\b|\bpraia\b").unwrap(),
        family: Regex::new(r"\bfamily\b|\bkids?\b|\bchildren\b|\bfam[ií]lia\b|\bcrian[cç]as?\b")
            .unwrap(),
        mobility: Regex::new(r"\bwheelchair\b|\bmobility\b|\baccessible\b|\bdisabilit|\bcadeirante\b")
            .unwrap(),
        kids_count: Regex::new(r"\b(\d+)\s*(?:kids?|children|child|crian[cç]as?)\b").unwrap(),
        adults_count: Regex::new(r"\b(\d+)\s*(?:adults?|people|persons?|pessoas?)\b").unwrap(),
        dates: Regex::new(
            r"\b(january|february|march|april|may|june|july|august|september|october|november|december|janeiro|fevereiro|mar[cç]o|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\s*(\d{4})?",
        )
        .unwrap(),
        must: Regex::new(r"\bmust\s+(?:see|visit|do)\b").unwrap(),
        avoid: Regex::new(r"\bavoid\b|\bno\b.*\b(?:crowds?|tourists?)\b|\bevitar\b").unwrap(),
    })
}

/// Deterministic keyword extraction: (preferences, constraints).
fn extract(query: &str) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let q = query.to_lowercase();
    let ex = extractors();
    let mut prefs = BTreeMap::new();
    let mut constraints = BTreeMap::new();

    if ex.budget.is_match(&q) {
        prefs.insert("budget_style".into(), "budget".into());
    } else if ex.luxury.is_match(&q) {
        prefs.insert("budget_style".into(), "luxury".into());
    }

    if ex.adventure.is_match(&q) {
        prefs.insert("travel_style".into(), "adventure".into());
    } else if ex.relaxation.is_match(&q) {
        prefs.insert("travel_style".into(), "relaxation".into());
    } else if ex.family.is_match(&q) {
        prefs.insert("travel_style".into(), "family".into());
    }

    if ex.mobility.is_match(&q) {
        prefs.insert("mobility_constraints".into(), "wheelchair_accessible".into());
    }

    if let Some(caps) = ex.kids_count.captures(&q) {
        prefs.insert("kids".into(), "true".into());
        constraints.insert("group_size".into(), caps[1].to_string());
    }
    if let Some(caps) = ex.adults_count.captures(&q) {
        constraints.insert("group_size".into(), caps[1].to_string());
    }
    if let Some(m) = ex.dates.find(&q) {
        constraints.insert("dates".into(), m.as_str().trim().to_string());
    }
    if ex.must.is_match(&q) {
        constraints.insert("must".into(), "extracted".into());
    }
    if ex.avoid.is_match(&q) {
        constraints.insert("avoid".into(), "extracted".into());
    }

    (prefs, constraints)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local session memory store; sessions are created on first use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, MemoryState>>,
}

impl MemoryStore {
    /// New empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one session's state (default state when never updated).
    pub fn get(&self, session_id: &str) -> MemoryState {
        let sessions = self.sessions.lock().expect("memory lock poisoned");
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    /// Extract preferences/constraints from the query, merge them (plus any
    /// caller-parsed updates) into the session state, and record the intent
    /// with move-to-front semantics. Returns the updated state.
    pub fn update(
        &self,
        session_id: &str,
        user_query: &str,
        parsed_updates: Option<&ParsedUpdates>,
    ) -> MemoryState {
        let (prefs, constraints) = extract(user_query);
        let mut sessions = self.sessions.lock().expect("memory lock poisoned");
        let state = sessions.entry(session_id.to_string()).or_default();

        state.preferences.extend(prefs);
        state.constraints.extend(constraints);
        if let Some(updates) = parsed_updates {
            state.preferences.extend(updates.preferences.clone());
            state.constraints.extend(updates.constraints.clone());
        }

        let intent = truncate_chars(user_query.trim(), MAX_INTENT_CHARS);
        let mut steps = Vec::with_capacity(MAX_RECENT_STEPS);
        steps.push(intent.clone());
        steps.extend(
            state
                .recent_plan_steps
                .iter()
                .filter(|s| **s != intent)
                .take(MAX_RECENT_STEPS - 1)
                .cloned(),
        );
        state.recent_plan_steps = steps;

        state.clone()
    }

    /// Bounded summary for one session.
    pub fn summary(&self, session_id: &str) -> String {
        self.get(session_id).to_summary()
    }

    /// First `length` hex chars of the SHA-256 of the summary; empty when the
    /// session has no signal. Mixed into the product query signature so
    /// caches separate sessions that project to different memories.
    pub fn memory_hash(&self, session_id: &str, length: usize) -> String {
        let s = self.summary(session_id);
        if s.is_empty() {
            return String::new();
        }
        let digest = Sha256::digest(s.as_bytes());
        let mut out = String::new();
        for byte in digest.iter() {
            out.push_str(&format!("{byte:02x}"));
            if out.len() >= length {
                break;
            }
        }
        out.truncate(length);
        out
    }

    /// Drop all sessions.
    pub fn clear(&self) {
        self.sessions.lock().expect("memory lock poisoned").clear();
    }
}
