use crate::error::ConfigError;
use crate::media_info::{ProbeKind, provider_for};
use crate::rds::StationText;
use crate::request::DEFAULT_GAP_SECS;
use crate::scheduler::{PlaybackScheduler, SchedulerOptions};
use crate::transmitter::PiFmRds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const CONFIG_DIR: &str = "fm_playout";
const CONFIG_FILE: &str = "config.json";

fn default_transmitter_path() -> String {
    "PiFmRds/src/pi_fm_rds".to_string()
}

fn default_true() -> bool {
    true
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_extensions() -> Vec<String> {
    vec!["wav".to_string()]
}

fn default_gap() -> f64 {
    DEFAULT_GAP_SECS
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

/// Station settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Path to the `pi_fm_rds` binary.
    #[serde(default = "default_transmitter_path")]
    pub transmitter_path: String,
    /// Run the transmitter through `sudo` (it needs raw GPIO access).
    #[serde(default = "default_true")]
    pub use_sudo: bool,
    /// Where uploaded audio lives; relative track names resolve here.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Extensions listed by `files`.
    #[serde(default = "default_extensions")]
    pub media_extensions: Vec<String>,
    /// Seconds of silence after the last track before the queue repeats.
    #[serde(default = "default_gap")]
    pub default_gap_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rt: Option<String>,
    #[serde(default)]
    pub probe: ProbeKind,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            transmitter_path: default_transmitter_path(),
            use_sudo: true,
            media_dir: default_media_dir(),
            media_extensions: default_extensions(),
            default_gap_secs: DEFAULT_GAP_SECS,
            default_ps: None,
            default_rt: None,
            probe: ProbeKind::default(),
            ffprobe_path: default_ffprobe(),
        }
    }
}

impl StationConfig {
    /// `<config dir>/fm_playout/config.json`, or `config.json` in the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join(CONFIG_DIR).join(CONFIG_FILE),
            None => PathBuf::from(CONFIG_FILE),
        }
    }

    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(StationConfig::default());
        }
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like `load`, but a corrupt or unreadable file falls back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e}; using defaults");
                StationConfig::default()
            }
        }
    }

    /// Persist as pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    /// Set one field from its string form, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty() && v != "none").then(|| v.to_string())
        };

        match key {
            "transmitter_path" => self.transmitter_path = value.to_string(),
            "use_sudo" => self.use_sudo = value.parse().map_err(|_| invalid())?,
            "media_dir" => self.media_dir = PathBuf::from(value),
            "media_extensions" => {
                self.media_extensions = value
                    .split(',')
                    .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect();
            }
            "default_gap_secs" => {
                let gap: f64 = value.trim().parse().map_err(|_| invalid())?;
                if !gap.is_finite() || gap < 0.0 {
                    return Err(invalid());
                }
                self.default_gap_secs = gap;
            }
            "default_ps" => self.default_ps = optional(value),
            "default_rt" => self.default_rt = optional(value),
            "probe" => self.probe = ProbeKind::from_str_loose(value).ok_or_else(invalid)?,
            "ffprobe_path" => self.ffprobe_path = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            media_dir: Some(self.media_dir.clone()),
            default_gap_secs: self.default_gap_secs,
            default_station: StationText::new(self.default_ps.clone(), self.default_rt.clone()),
        }
    }

    /// A scheduler wired to the real transmitter and the configured probe.
    pub fn build_scheduler(&self) -> std::io::Result<PlaybackScheduler> {
        PlaybackScheduler::new(
            provider_for(self.probe, &self.ffprobe_path),
            Arc::new(PiFmRds::new(&self.transmitter_path, self.use_sudo)),
            self.scheduler_options(),
        )
    }
}
