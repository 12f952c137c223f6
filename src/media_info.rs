//! Media info lookup: duration and tags for a file on disk.
//!
//! The scheduler only needs a duration to time the advance, so every lookup is
//! best-effort. `resolve_queue` turns failures into log lines and leaves the
//! entry out of the cache.

use crate::error::ResolutionError;
use crate::track::{MediaInfo, TrackEntry};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::Accessor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up duration and descriptive tags for a media file.
pub trait MediaInfoProvider: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<MediaInfo, ResolutionError>;
}

/// Which provider the station uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Read tags and stream properties in-process.
    #[default]
    Lofty,
    /// Shell out to `ffprobe`.
    Ffprobe,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Lofty => write!(f, "lofty"),
            ProbeKind::Ffprobe => write!(f, "ffprobe"),
        }
    }
}

impl ProbeKind {
    /// Parse a probe kind from a string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lofty" | "tags" => Some(ProbeKind::Lofty),
            "ffprobe" => Some(ProbeKind::Ffprobe),
            _ => None,
        }
    }
}

/// Build the provider selected in the config.
pub fn provider_for(kind: ProbeKind, ffprobe_path: &str) -> Arc<dyn MediaInfoProvider> {
    debug!(probe = %kind, "media info provider selected");
    match kind {
        ProbeKind::Lofty => Arc::new(LoftyProbe),
        ProbeKind::Ffprobe => Arc::new(FfprobeProbe::new(ffprobe_path)),
    }
}

// ── lofty ────────────────────────────────────────────────────────────────────

/// Reads duration from the stream properties and tags from the primary tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyProbe;

impl MediaInfoProvider for LoftyProbe {
    fn resolve(&self, path: &Path) -> Result<MediaInfo, ResolutionError> {
        if !path.exists() {
            return Err(ResolutionError::NotFound(path.to_path_buf()));
        }

        let tagged_file =
            lofty::read_from_path(path).map_err(|e| ResolutionError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let duration = tagged_file.properties().duration();
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        Ok(MediaInfo {
            duration_secs: duration.as_secs_f64(),
            title: tag.and_then(|t| t.title().map(|s| s.to_string())),
            artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
            album: tag.and_then(|t| t.album().map(|s| s.to_string())),
        })
    }
}

// ── ffprobe ──────────────────────────────────────────────────────────────────

/// Runs `ffprobe -show_format` and reads duration and tags from its JSON.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        FfprobeProbe {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

/// Arguments for a format-only JSON probe of `path`.
pub fn build_ffprobe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        path.to_string_lossy().to_string(),
    ]
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Parse `ffprobe -print_format json -show_format` output.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo, ResolutionError> {
    let probe_err = |reason: String| ResolutionError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| probe_err(format!("bad JSON: {e}")))?;
    let format = output
        .format
        .ok_or_else(|| probe_err("no format section".into()))?;

    let duration_secs = format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| probe_err("missing duration".into()))?;

    // Tag keys vary in case between containers (ARTIST in FLAC, artist in ID3).
    let tag = |name: &str| {
        format
            .tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    Ok(MediaInfo {
        duration_secs,
        title: tag("title"),
        artist: tag("artist"),
        album: tag("album"),
    })
}

impl MediaInfoProvider for FfprobeProbe {
    fn resolve(&self, path: &Path) -> Result<MediaInfo, ResolutionError> {
        if !path.exists() {
            return Err(ResolutionError::NotFound(path.to_path_buf()));
        }

        let output = Command::new(&self.program)
            .args(build_ffprobe_args(path))
            .output()
            .map_err(|e| ResolutionError::Probe {
                path: path.to_path_buf(),
                reason: format!("failed to launch {}: {e}", self.program),
            })?;

        if !output.status.success() {
            return Err(ResolutionError::Probe {
                path: path.to_path_buf(),
                reason: format!(
                    "{} exited with status {}",
                    self.program,
                    output.status.code().unwrap_or(-1)
                ),
            });
        }

        parse_ffprobe_json(path, &String::from_utf8_lossy(&output.stdout))
    }
}

// ── Queue resolution ─────────────────────────────────────────────────────────

/// Resolve every distinct file in `entries`. Files that fail to resolve are
/// logged and left out, so the scheduler treats them as unknown duration.
pub fn resolve_queue<F>(
    provider: &dyn MediaInfoProvider,
    entries: &[TrackEntry],
    locate: F,
) -> HashMap<String, MediaInfo>
where
    F: Fn(&str) -> PathBuf,
{
    let mut cache = HashMap::new();
    for entry in entries {
        if cache.contains_key(&entry.file) {
            continue;
        }
        let path = locate(&entry.file);
        match provider.resolve(&path) {
            Ok(info) => {
                debug!(file = %entry.file, duration = info.duration_secs, "resolved media info");
                cache.insert(entry.file.clone(), info);
            }
            Err(e) => warn!(file = %entry.file, "media info unavailable: {e}"),
        }
    }
    cache
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lofty_rejects_missing_file() {
        let result = LoftyProbe.resolve(Path::new("nonexistent.wav"));
        assert!(matches!(result, Err(ResolutionError::NotFound(_))));
    }

    #[test]
    fn lofty_rejects_non_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not a wav file").unwrap();
        assert!(LoftyProbe.resolve(&path).is_err());
    }

    #[test]
    fn ffprobe_args_end_with_path() {
        let args = build_ffprobe_args(Path::new("/tmp/a.wav"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/a.wav"));
        assert!(args.contains(&"-show_format".to_string()));
    }

    #[test]
    fn parse_ffprobe_reads_duration_and_tags() {
        let json = r#"{"format":{"filename":"a.wav","duration":"10.500000",
            "tags":{"ARTIST":"Someone","album":"Demo","title":"Intro"}}}"#;
        let info = parse_ffprobe_json(Path::new("a.wav"), json).unwrap();
        assert_eq!(info.duration_secs, 10.5);
        assert_eq!(info.artist.as_deref(), Some("Someone"));
        assert_eq!(info.album.as_deref(), Some("Demo"));
        assert_eq!(info.title.as_deref(), Some("Intro"));
    }

    #[test]
    fn parse_ffprobe_without_tags() {
        let json = r#"{"format":{"duration":"3.0"}}"#;
        let info = parse_ffprobe_json(Path::new("a.wav"), json).unwrap();
        assert_eq!(info, MediaInfo::with_duration(3.0));
    }

    #[test]
    fn parse_ffprobe_missing_duration_errors() {
        let json = r#"{"format":{"tags":{}}}"#;
        assert!(parse_ffprobe_json(Path::new("a.wav"), json).is_err());
        assert!(parse_ffprobe_json(Path::new("a.wav"), "{}").is_err());
        assert!(parse_ffprobe_json(Path::new("a.wav"), "not json").is_err());
    }

    #[test]
    fn probe_kind_parses_loosely() {
        assert_eq!(ProbeKind::from_str_loose("FFprobe"), Some(ProbeKind::Ffprobe));
        assert_eq!(ProbeKind::from_str_loose("lofty"), Some(ProbeKind::Lofty));
        assert_eq!(ProbeKind::from_str_loose("mediainfo"), None);
    }

    struct CountingProbe {
        calls: AtomicUsize,
    }

    impl MediaInfoProvider for CountingProbe {
        fn resolve(&self, path: &Path) -> Result<MediaInfo, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.ends_with("bad.wav") {
                Err(ResolutionError::NotFound(path.to_path_buf()))
            } else {
                Ok(MediaInfo::with_duration(4.0))
            }
        }
    }

    #[test]
    fn resolve_queue_skips_failures_and_duplicates() {
        let probe = CountingProbe {
            calls: AtomicUsize::new(0),
        };
        let entries = vec![
            TrackEntry::new("a.wav", 0.0),
            TrackEntry::new("bad.wav", 0.0),
            TrackEntry::new("a.wav", 1.0),
        ];
        let cache = resolve_queue(&probe, &entries, |f| PathBuf::from("/media").join(f));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache["a.wav"].duration_secs, 4.0);
        assert!(!cache.contains_key("bad.wav"));
    }
}
