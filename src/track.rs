use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// One queued playable file and the silence to leave after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub file: String,
    /// Seconds to wait after the track ends before the next one starts.
    pub gap: f64,
}

impl TrackEntry {
    pub fn new(file: impl Into<String>, gap: f64) -> Self {
        TrackEntry {
            file: file.into(),
            gap,
        }
    }
}

/// Duration and tags for a media file, as reported by a `MediaInfoProvider`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl MediaInfo {
    pub fn with_duration(duration_secs: f64) -> Self {
        MediaInfo {
            duration_secs,
            ..Default::default()
        }
    }

    /// Format duration as MM:SS.
    pub fn duration_display(&self) -> String {
        format_duration(self.duration_secs)
    }
}

/// Format a number of seconds as M:SS. Negative or non-finite input shows 0:00.
pub fn format_duration(secs: f64) -> String {
    let secs = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// A track identifier may name a file in the media directory or an absolute
/// path, but never climb out of a directory with `..`.
pub fn is_valid_identifier(file: &str) -> bool {
    let trimmed = file.trim();
    if trimmed.is_empty() {
        return false;
    }
    !Path::new(trimmed)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_display_formats_correctly() {
        let info = MediaInfo::with_duration(185.4); // 3:05
        assert_eq!(info.duration_display(), "3:05");
    }

    #[test]
    fn format_duration_clamps_bad_input() {
        assert_eq!(format_duration(-3.0), "0:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
        assert_eq!(format_duration(59.9), "0:59");
    }

    #[test]
    fn identifiers_reject_parent_components() {
        assert!(is_valid_identifier("a.wav"));
        assert!(is_valid_identifier("/srv/audio/a.wav"));
        assert!(is_valid_identifier("shows/morning.wav"));
        assert!(!is_valid_identifier("../etc/passwd"));
        assert!(!is_valid_identifier("shows/../../a.wav"));
        assert!(!is_valid_identifier("   "));
    }

    #[test]
    fn media_info_tags_skip_when_absent() {
        let json = serde_json::to_string(&MediaInfo::with_duration(1.5)).unwrap();
        assert_eq!(json, r#"{"duration_secs":1.5}"#);
    }
}
