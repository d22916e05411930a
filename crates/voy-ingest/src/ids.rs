// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic object identities for store upserts.
//!
//! All upserts use UUIDv5 over a stable key, so re-running a write with the
//! same inputs is a no-op at the store.

use md5::{Digest, Md5};
use uuid::Uuid;

fn md5_prefix(text: &str, length: usize) -> String {
    let digest = Md5::digest(text.as_bytes());
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

/// Identity of a video: UUIDv5 over its URL.
pub fn video_uuid(video_url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, video_url.as_bytes())
}

/// Identity of a recommendation card:
/// `{video-uuid}:{startSec}:{endSec}:{md5(text)[..10]}`.
pub fn card_uuid(video_uuid: Uuid, start_sec: u32, end_sec: u32, text: &str) -> Uuid {
    let key = format!(
        "{video_uuid}:{start_sec}:{end_sec}:{}",
        md5_prefix(text, 10)
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
}

/// Identity of a product: UUIDv5 over `{link}::{question}`.
pub fn product_uuid(link: &str, question: &str) -> Uuid {
    let key = format!("{link}::{question}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.trim().as_bytes())
}

/// Identity of a product card:
/// `{product-uuid}:{md5(question || opportunity)[..10]}`.
pub fn product_card_uuid(product_uuid: Uuid, question: &str, opportunity: &str) -> Uuid {
    let digest = md5_prefix(&format!("{question}||{opportunity}"), 10);
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{product_uuid}:{digest}").as_bytes(),
    )
}

/// Deep link into a video at `start_sec`, appending `t=` with the joiner the
/// URL calls for (already-deep-linked URLs pass through).
pub fn timestamp_url(video_url: &str, start_sec: u32) -> String {
    if video_url.contains("t=") {
        return video_url.to_string();
    }
    let joiner = if video_url.contains('?') { "&" } else { "?" };
    format!("{video_url}{joiner}t={start_sec}s")
}
