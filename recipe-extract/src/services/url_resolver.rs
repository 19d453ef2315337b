//! Video URL resolution
//!
//! Recognized forms, tried in order:
//! - `youtube.com/watch?v=ID` (any query position)
//! - `youtu.be/ID`
//! - `youtube.com/shorts/ID`
//! - `youtube.com/embed/ID`

use once_cell::sync::Lazy;
use regex::Regex;

const ID: &str = r"([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)";

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?:^|[/.])youtube\.com/watch\?(?:[^#\s]*&)?v={}", ID),
        format!(r"(?:^|[/.])youtu\.be/{}", ID),
        format!(r"(?:^|[/.])youtube\.com/shorts/{}", ID),
        format!(r"(?:^|[/.])youtube\.com/embed/{}", ID),
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Extract the 11-character video ID, or `None` if no pattern matches
pub fn extract_video_id(url: &str) -> Option<String> {
    let url = url.trim();
    PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Canonical watch-page URL for a video ID
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
