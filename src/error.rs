//! Error types for fm_playout.

use std::path::PathBuf;

/// A malformed start request. Rejected before any run state is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Frequency is required")]
    MissingFrequency,

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("At least one track is required")]
    EmptyQueue,

    #[error("Expected {expected} gap(s) for {tracks} track(s), got {got}")]
    GapCountMismatch {
        tracks: usize,
        expected: usize,
        got: usize,
    },

    #[error("Gap {index} is not a number: {value}")]
    NonNumericGap { index: usize, value: String },

    #[error("Gap {index} must be >= 0 (got {value})")]
    NegativeGap { index: usize, value: f64 },

    #[error("Invalid track identifier '{0}'")]
    InvalidTrack(String),
}

/// Media info lookup failed. Never fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Media file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read '{}': {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Probe failed for '{}': {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },
}

/// The transmitter process could not be started.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transmitter rejected parameters: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write config '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
}
