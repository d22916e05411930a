// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subtitle fetching and VTT parsing.
//!
//! The subtitle tool is an external binary treated as a collaborator behind
//! [`SubtitleFetcher`]: language preference list in, timestamped segments
//! and the chosen language out, or an unavailability error.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use voy_error::VoyError;

/// One timestamped transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Caption text.
    pub text: String,
}

/// Video metadata needed for the write stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VideoMetadata {
    /// Video id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Channel or uploader name.
    pub channel: String,
    /// Upload date, RFC 3339, when known.
    pub upload_date: Option<String>,
    /// Canonical watch URL.
    pub webpage_url: String,
}

/// Result of a successful subtitle fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTranscript {
    /// Parsed segments.
    pub segments: Vec<Segment>,
    /// The subtitle language that was actually available.
    pub chosen_lang: String,
    /// Video metadata.
    pub metadata: VideoMetadata,
}

/// Fetches subtitles and metadata for a video URL.
#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    /// Fetch, trying each language in `lang_preference` in order.
    async fn fetch(
        &self,
        video_url: &str,
        lang_preference: &[String],
    ) -> Result<FetchedTranscript, VoyError>;
}

// ---------------------------------------------------------------------------
// VTT parsing
// ---------------------------------------------------------------------------

fn time_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(\d\d):(\d\d):(\d\d)\.(\d\d\d)").unwrap())
}

fn tag_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn to_seconds(caps: &regex::Captures<'_>) -> f64 {
    let h: f64 = caps[1].parse().unwrap_or(0.0);
    let m: f64 = caps[2].parse().unwrap_or(0.0);
    let s: f64 = caps[3].parse().unwrap_or(0.0);
    let ms: f64 = caps[4].parse().unwrap_or(0.0);
    h * 3600.0 + m * 60.0 + s + ms / 1000.0
}

/// Parse VTT content into segments with start, duration, and cleaned text.
pub fn vtt_to_segments(vtt_text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = vtt_text.lines().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.contains("-->") {
            let mut parts = line.splitn(2, "-->");
            let start_str = parts.next().unwrap_or_default();
            let end_str = parts.next().unwrap_or_default();
            let start = time_re().captures(start_str).map(|c| to_seconds(&c));
            let end = time_re().captures(end_str).map(|c| to_seconds(&c));
            if let (Some(start), Some(end)) = (start, end) {
                i += 1;
                let mut text_lines: Vec<String> = Vec::new();
                while i < lines.len() && !lines[i].trim().is_empty() {
                    let cleaned = tag_re().replace_all(lines[i], "").trim().to_string();
                    if !cleaned.is_empty() {
                        text_lines.push(cleaned);
                    }
                    i += 1;
                }
                let text = text_lines.join(" ").trim().to_string();
                if !text.is_empty() {
                    segments.push(Segment {
                        start,
                        duration: (end - start).max(0.0),
                        text,
                    });
                }
            }
        }
        i += 1;
    }
    segments
}

/// Expand a language hint into the full preference list.
pub fn lang_preference(hint: &str) -> Vec<String> {
    let base = ["pt", "pt-BR", "pt-PT", "en", "es"];
    match hint {
        "auto" | "pt" => base.iter().map(|s| s.to_string()).collect(),
        other => {
            let mut out = vec![other.to_string()];
            for lang in ["en", "es", "pt", "pt-BR", "pt-PT"] {
                if lang != other {
                    out.push(lang.to_string());
                }
            }
            out
        }
    }
}

/// Pull an 11-character video id out of a watch URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    static CELL: OnceLock<Regex> = OnceLock::new();
    let re = CELL.get_or_init(|| Regex::new(r"(?:v=|youtu\.be/)([A-Za-z0-9_-]{11})").unwrap());
    re.captures(url).map(|c| c[1].to_string())
}

/// Parse the tool's `YYYYMMDD` upload date into RFC 3339.
pub fn parse_upload_date(raw: &str) -> Option<String> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
    Some(format!("{}T00:00:00Z", date.format("%Y-%m-%d")))
}

// ---------------------------------------------------------------------------
// yt-dlp fetcher
// ---------------------------------------------------------------------------

/// Subtitle fetcher shelling out to `yt-dlp`.
pub struct YtDlpFetcher {
    /// Binary name or path.
    pub binary: String,
    /// Optional cookies file passed through to the tool.
    pub cookies_file: Option<PathBuf>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".into(),
            cookies_file: None,
        }
    }
}

impl YtDlpFetcher {
    fn cookie_args(&self) -> Vec<String> {
        match &self.cookies_file {
            Some(path) if path.is_file() => {
                vec!["--cookies".into(), path.display().to_string()]
            }
            _ => vec![],
        }
    }

    async fn video_metadata(&self, video_url: &str) -> Result<VideoMetadata, VoyError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args([
            "--dump-single-json",
            "--skip-download",
            "--no-warnings",
            "--no-check-formats",
            "--ignore-no-formats-error",
            "--extractor-retries",
            "1",
            "--socket-timeout",
            "10",
        ]);
        for arg in self.cookie_args() {
            cmd.arg(arg);
        }
        cmd.arg(video_url);

        let output = cmd
            .output()
            .await
            .map_err(|err| VoyError::upstream(format!("subtitle tool unavailable: {err}")))?;
        if !output.status.success() {
            return Err(VoyError::upstream("subtitle tool metadata fetch failed"));
        }
        let meta: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|err| VoyError::parse(format!("metadata is not JSON: {err}")))?;

        let id = meta["id"]
            .as_str()
            .map(str::to_string)
            .or_else(|| extract_video_id(meta["webpage_url"].as_str().unwrap_or_default()))
            .unwrap_or_default();
        let webpage_url = meta["webpage_url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
        let upload_date = meta["upload_date"]
            .as_str()
            .and_then(parse_upload_date)
            .or_else(|| {
                meta["timestamp"].as_f64().and_then(|ts| {
                    chrono::DateTime::from_timestamp(ts as i64, 0)
                        .map(|dt| dt.to_rfc3339().replace("+00:00", "Z"))
                })
            });

        Ok(VideoMetadata {
            id,
            title: meta["title"].as_str().unwrap_or_default().to_string(),
            channel: meta["channel"]
                .as_str()
                .or_else(|| meta["uploader"].as_str())
                .unwrap_or_default()
                .to_string(),
            upload_date,
            webpage_url,
        })
    }

    async fn subtitles_for_lang(
        &self,
        video_url: &str,
        lang: &str,
    ) -> Result<Vec<Segment>, VoyError> {
        let dir = std::env::temp_dir().join(format!("voy-subs-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| VoyError::upstream(format!("temp dir create failed: {err}")))?;

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args([
            "--skip-download",
            "--write-auto-subs",
            "--write-subs",
            "--sub-langs",
            lang,
            "--sub-format",
            "vtt",
            "--no-check-formats",
            "--ignore-no-formats-error",
            "-o",
        ]);
        cmd.arg(dir.join("%(id)s.%(ext)s"));
        for arg in self.cookie_args() {
            cmd.arg(arg);
        }
        cmd.arg(video_url);

        let result = cmd.output().await;
        let segments = match result {
            Err(err) => Err(VoyError::upstream(format!("subtitle tool unavailable: {err}"))),
            Ok(output) if !output.status.success() => {
                Err(VoyError::upstream("subtitle fetch failed"))
            }
            Ok(_) => {
                let mut found = Vec::new();
                let mut entries = tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|err| VoyError::upstream(err.to_string()))?;
                while let Ok(Some(entry)) = entries.next_entry().await {
                    if entry.path().extension().and_then(|e| e.to_str()) == Some("vtt") {
                        if let Ok(text) = tokio::fs::read_to_string(entry.path()).await {
                            found = vtt_to_segments(&text);
                            if !found.is_empty() {
                                break;
                            }
                        }
                    }
                }
                Ok(found)
            }
        };
        let _ = tokio::fs::remove_dir_all(&dir).await;
        segments
    }
}

#[async_trait]
impl SubtitleFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        video_url: &str,
        lang_preference: &[String],
    ) -> Result<FetchedTranscript, VoyError> {
        let metadata = self.video_metadata(video_url).await?;
        for lang in lang_preference {
            match self.subtitles_for_lang(video_url, lang).await {
                Ok(segments) if !segments.is_empty() => {
                    return Ok(FetchedTranscript {
                        segments,
                        chosen_lang: lang.clone(),
                        metadata,
                    });
                }
                _ => continue,
            }
        }
        Err(VoyError::upstream(
            "no subtitles available for preferred languages",
        ))
    }
}
