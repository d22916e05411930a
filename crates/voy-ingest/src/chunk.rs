// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transcript chunking: pack timestamped segments into chunks bounded by
//! character and duration budgets, with a soft split at silence gaps and a
//! hard split at topic-boundary cue phrases once the minima are met.

use crate::subtitles::Segment;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Hard split above this many characters.
    pub max_chars: usize,
    /// Boundary cues only split above this many characters.
    pub min_chars: usize,
    /// Hard split above this many seconds.
    pub max_duration_s: f64,
    /// Boundary cues only split above this many seconds.
    pub min_duration_s: f64,
    /// Soft split when the gap to the previous segment exceeds this.
    pub gap_split_s: f64,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            min_chars: 350,
            max_duration_s: 75.0,
            min_duration_s: 25.0,
            gap_split_s: 2.5,
        }
    }
}

impl ChunkParams {
    /// Read overrides from an event payload, defaulting each absent knob.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let defaults = Self::default();
        Self {
            max_chars: payload["chunk_max_chars"]
                .as_u64()
                .map(|v| v as usize)
                .unwrap_or(defaults.max_chars),
            min_chars: payload["chunk_min_chars"]
                .as_u64()
                .map(|v| v as usize)
                .unwrap_or(defaults.min_chars),
            max_duration_s: payload["chunk_max_duration_s"]
                .as_f64()
                .unwrap_or(defaults.max_duration_s),
            min_duration_s: payload["chunk_min_duration_s"]
                .as_f64()
                .unwrap_or(defaults.min_duration_s),
            gap_split_s: payload["gap_split_s"].as_f64().unwrap_or(defaults.gap_split_s),
        }
    }
}

/// One packed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Start of the first segment, whole seconds.
    #[serde(rename = "startSec")]
    pub start_sec: u32,
    /// End of the last segment, whole seconds.
    #[serde(rename = "endSec")]
    pub end_sec: u32,
    /// Concatenated text.
    pub text: String,
}

fn boundary_re() -> &'static regex::Regex {
    static CELL: OnceLock<regex::Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        let cues = [
            r"\bagora\b",
            r"\bpr[oó]xima dica\b",
            r"\boutro ponto\b",
            r"\bmudando de assunto\b",
            r"\bvamos falar de\b",
            r"\bsobre (compras|parques|praias|hotel|comida|transporte)\b",
            r"\bnow\b",
            r"\bnext tip\b",
            r"\bmoving on\b",
            r"\blet's talk about\b",
            r"\bahora\b",
            r"\bsiguiente consejo\b",
            r"\bcambiando de tema\b",
            r"\bvamos a hablar de\b",
        ];
        RegexBuilder::new(&cues.join("|"))
            .case_insensitive(true)
            .build()
            .expect("boundary cue pattern must compile")
    })
}

/// Pack segments into chunks per the parameter budget.
pub fn chunk_segments(segments: &[Segment], params: ChunkParams) -> Vec<Chunk> {
    let normalized: Vec<(f64, f64, &str)> = segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| (s.start, s.start + s.duration.max(0.0), s.text.trim()))
        .collect();

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<(f64, f64, &str)> = Vec::new();

    fn flush(current: &mut Vec<(f64, f64, &str)>, chunks: &mut Vec<Chunk>) {
        if current.is_empty() {
            return;
        }
        let text = current
            .iter()
            .map(|(_, _, t)| *t)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();
        chunks.push(Chunk {
            start_sec: current[0].0 as u32,
            end_sec: current[current.len() - 1].1 as u32,
            text,
        });
        current.clear();
    }

    for (start, end, text) in normalized {
        if let Some((_, prev_end, _)) = current.last() {
            if start - prev_end > params.gap_split_s {
                flush(&mut current, &mut chunks);
            }
        }
        current.push((start, end, text));

        let n_chars: usize = current
            .iter()
            .map(|(_, _, t)| t.len())
            .sum::<usize>()
            + current.len().saturating_sub(1);
        let duration = current[current.len() - 1].1 - current[0].0;
        let tail = if current.len() >= 2 {
            format!(
                "{} {}",
                current[current.len() - 2].2,
                current[current.len() - 1].2
            )
        } else {
            current[current.len() - 1].2.to_string()
        };
        let boundary = boundary_re().is_match(&tail);

        if n_chars >= params.max_chars
            || duration >= params.max_duration_s
            || (boundary
                && n_chars >= params.min_chars
                && duration >= params.min_duration_s)
        {
            flush(&mut current, &mut chunks);
        }
    }
    flush(&mut current, &mut chunks);
    chunks
}
