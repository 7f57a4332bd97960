//! Bio text derivation.
//!
//! Everything here is pure: the scheduler feeds in settings and the current
//! track, and gets back the exact string to publish.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::protocol::Track;

pub const DEFAULT_POLL_INTERVAL_SEC: u32 = 15;
pub const MIN_POLL_INTERVAL_SEC: u32 = 5;
pub const MAX_POLL_INTERVAL_SEC: u32 = 120;

/// The status-message field is cut off remotely past this many characters,
/// so longer bios keep this many and gain a `...` suffix.
pub const BIO_KEEP_CHARS: usize = 124;
pub const BIO_ELLIPSIS: &str = "...";

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(title|artist|album|source)\}").expect("static regex"))
}

fn profile_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://)?(?:www\.)?last\.fm/(?:[a-z]{2}/)?user/([^/?#\s]+)")
            .expect("static regex")
    })
}

/// Clamp a raw polling interval into `[5, 120]` seconds.
///
/// Non-finite input falls back to the default of 15. Fractional input is
/// rounded to the nearest second before clamping.
pub fn clamp_poll_interval(raw: f64) -> u32 {
    if !raw.is_finite() {
        return DEFAULT_POLL_INTERVAL_SEC;
    }
    raw.round()
        .clamp(MIN_POLL_INTERVAL_SEC as f64, MAX_POLL_INTERVAL_SEC as f64) as u32
}

/// Trim and fit a bio into the remote field.
///
/// Lengths are counted in characters, not bytes, so multi-byte text is never
/// split mid-codepoint.
pub fn truncate_bio(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= BIO_KEEP_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(BIO_KEEP_CHARS).collect();
    out.push_str(BIO_ELLIPSIS);
    out
}

/// Substitute `{title}`, `{artist}`, `{album}` and `{source}` in `template`
/// and fit the result into the bio field.
///
/// Substitution is a single pass, so a track title that itself contains
/// `{artist}` is inserted literally. Any other `{...}` is left as written.
pub fn build_bio_from_template(template: &str, track: &Track) -> String {
    let rendered = token_re().replace_all(template, |caps: &Captures<'_>| {
        match &caps[1] {
            "title" => track.title.clone(),
            "artist" => track.artist.clone(),
            "album" => track.album.clone(),
            _ => track.source_label.clone(),
        }
    });
    truncate_bio(&rendered)
}

/// Accept either a bare Last.fm username or a profile URL pasted from the
/// browser, returning just the username.
pub fn normalize_username(input: &str) -> String {
    let trimmed = input.trim();
    match profile_url_re().captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}
