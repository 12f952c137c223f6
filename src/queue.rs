//! Run state: the queue, the cursor, and the progress accumulators.
//!
//! Nothing here touches threads or processes beyond holding the active
//! transmission handle; `PlaybackScheduler` serializes access with a mutex.

use crate::track::{MediaInfo, TrackEntry};
use crate::transmitter::{TransmissionHandle, TransmissionParams};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// State of one scheduler. Reset on every start and stop; only `generation`
/// survives, and it only ever grows.
#[derive(Default)]
pub struct RunState {
    pub generation: u64,
    pub running: bool,
    pub params: Option<TransmissionParams>,
    pub queue: Vec<TrackEntry>,
    pub cursor: usize,
    pub played_count: u64,
    pub queued_count: usize,
    pub total_played_secs: f64,
    pub total_remaining_secs: f64,
    pub durations: HashMap<String, MediaInfo>,
    pub started_at: Option<DateTime<Local>>,
    /// Seconds of audio the current track is being given on air. Zero when
    /// its duration is unknown or the transmitter failed to launch.
    pub current_airtime: f64,
    active: Option<Box<dyn TransmissionHandle>>,
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("generation", &self.generation)
            .field("running", &self.running)
            .field("cursor", &self.cursor)
            .field("queue_len", &self.queue.len())
            .field("played_count", &self.played_count)
            .field("queued_count", &self.queued_count)
            .field("has_active", &self.has_active())
            .finish()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize a new run. The caller must have torn down the previous one.
    /// Returns the new generation.
    pub fn begin(
        &mut self,
        params: TransmissionParams,
        queue: Vec<TrackEntry>,
        durations: HashMap<String, MediaInfo>,
    ) -> u64 {
        self.generation += 1;
        self.total_remaining_secs = queue
            .iter()
            .map(|t| durations.get(&t.file).map_or(0.0, |m| m.duration_secs))
            .sum();
        self.total_played_secs = 0.0;
        self.queued_count = queue.len();
        self.played_count = 0;
        self.cursor = 0;
        self.queue = queue;
        self.durations = durations;
        self.params = Some(params);
        self.started_at = Some(Local::now());
        self.current_airtime = 0.0;
        self.running = true;
        self.generation
    }

    /// Tear down the run: invalidate pending advances, kill the active
    /// transmission and clear everything back to idle. Returns whether there
    /// was anything to stop.
    pub fn reset(&mut self) -> bool {
        let was_active = self.running || self.active.is_some();
        self.generation += 1;
        self.terminate_active();
        self.running = false;
        self.params = None;
        self.queue.clear();
        self.cursor = 0;
        self.played_count = 0;
        self.queued_count = 0;
        self.total_played_secs = 0.0;
        self.total_remaining_secs = 0.0;
        self.durations.clear();
        self.started_at = None;
        self.current_airtime = 0.0;
        was_active
    }

    /// Whether a deferred action armed for `generation` still applies.
    pub fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    pub fn current(&self) -> Option<&TrackEntry> {
        self.queue.get(self.cursor)
    }

    pub fn current_info(&self) -> Option<&MediaInfo> {
        self.current().and_then(|t| self.durations.get(&t.file))
    }

    /// Resolved duration of `file`, or 0 when unknown.
    pub fn duration_of(&self, file: &str) -> f64 {
        self.durations.get(file).map_or(0.0, |m| m.duration_secs)
    }

    /// Record the track that just finished and move the cursor, wrapping to
    /// the top of the queue. Returns true if the queue wrapped.
    pub fn commit_advance(&mut self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        let aired = self.current_airtime;
        self.total_played_secs += aired;
        self.total_remaining_secs = (self.total_remaining_secs - aired).max(0.0);
        self.played_count += 1;
        self.queued_count = self.queued_count.saturating_sub(1);
        self.current_airtime = 0.0;
        self.cursor += 1;
        if self.cursor >= self.queue.len() {
            self.cursor = 0;
            self.queued_count = self.queue.len();
            true
        } else {
            false
        }
    }

    /// Install the handle for the track now on air. Any previous handle is
    /// terminated first.
    pub fn set_active(&mut self, handle: Box<dyn TransmissionHandle>) {
        self.terminate_active();
        self.active = Some(handle);
    }

    /// Kill the outstanding transmission, if any. Returns true if there was one.
    pub fn terminate_active(&mut self) -> bool {
        match self.active.take() {
            Some(mut handle) => {
                debug!(pid = ?handle.pid(), "terminating active transmission");
                handle.terminate();
                true
            }
            None => false,
        }
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Identifiers from the cursor to the end of the queue.
    pub fn upcoming(&self) -> Vec<String> {
        self.queue
            .get(self.cursor..)
            .unwrap_or_default()
            .iter()
            .map(|t| t.file.clone())
            .collect()
    }

    /// Identifiers before the cursor.
    pub fn played(&self) -> Vec<String> {
        self.queue
            .get(..self.cursor)
            .unwrap_or_default()
            .iter()
            .map(|t| t.file.clone())
            .collect()
    }
}
