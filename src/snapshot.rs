use crate::queue::RunState;
use crate::track::format_duration;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Shown in place of metadata that was never resolved.
pub const UNAVAILABLE: &str = "N/A";

/// The track on air, as displayed on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTrack {
    pub file: String,
    pub artist: String,
    pub album: String,
    /// M:SS, or "N/A".
    pub duration: String,
    pub duration_secs: Option<f64>,
}

impl CurrentTrack {
    fn unavailable() -> Self {
        CurrentTrack {
            file: UNAVAILABLE.to_string(),
            artist: UNAVAILABLE.to_string(),
            album: UNAVAILABLE.to_string(),
            duration: UNAVAILABLE.to_string(),
            duration_secs: None,
        }
    }
}

/// Point-in-time view of scheduler progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// On-air indicator.
    pub running: bool,
    pub generation: u64,
    pub frequency: Option<f64>,
    pub ps: Option<String>,
    pub rt: Option<String>,
    pub played_count: u64,
    pub queued_count: usize,
    pub total_played_secs: f64,
    pub total_remaining_secs: f64,
    pub cursor: usize,
    pub upcoming: Vec<String>,
    pub played: Vec<String>,
    pub current: CurrentTrack,
    pub started_at: Option<DateTime<Local>>,
}

/// Round to two decimal places for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ProgressSnapshot {
    /// Build a snapshot from the run state. Never fails; anything missing is
    /// shown as unavailable.
    pub fn from_state(state: &RunState) -> Self {
        let current = match state.current().filter(|_| state.running) {
            Some(track) => {
                let info = state.current_info();
                CurrentTrack {
                    file: track.file.clone(),
                    artist: info
                        .and_then(|i| i.artist.clone())
                        .unwrap_or_else(|| UNAVAILABLE.to_string()),
                    album: info
                        .and_then(|i| i.album.clone())
                        .unwrap_or_else(|| UNAVAILABLE.to_string()),
                    duration: info
                        .map(|i| format_duration(i.duration_secs))
                        .unwrap_or_else(|| UNAVAILABLE.to_string()),
                    duration_secs: info.map(|i| round2(i.duration_secs)),
                }
            }
            None => CurrentTrack::unavailable(),
        };

        let params = state.params.as_ref();

        ProgressSnapshot {
            running: state.running,
            generation: state.generation,
            frequency: params.map(|p| p.frequency),
            ps: params.and_then(|p| p.station.ps.clone()),
            rt: params.and_then(|p| p.station.rt.clone()),
            played_count: state.played_count,
            queued_count: state.queued_count,
            total_played_secs: round2(state.total_played_secs),
            total_remaining_secs: round2(state.total_remaining_secs),
            cursor: state.cursor,
            upcoming: state.upcoming(),
            played: state.played(),
            current,
            started_at: state.started_at,
        }
    }

    /// Render as pretty JSON for the dashboard.
    pub fn to_json(&self) -> String {
        // Serializing plain data with string keys cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if !self.running {
            return "Off air".to_string();
        }
        format!(
            "On air {} MHz | [{}/{}] {} | played {} ({:.2}s) | remaining {:.2}s",
            self.frequency.map_or_else(|| UNAVAILABLE.to_string(), |f| f.to_string()),
            self.cursor + 1,
            self.upcoming.len() + self.played.len(),
            self.current.file,
            self.played_count,
            self.total_played_secs,
            self.total_remaining_secs,
        )
    }
}
