//! PlaybackScheduler — sequential, timed playout of a queue through one
//! transmitter process.
//!
//! Run state lives behind a single mutex shared by the request path
//! (`start`/`stop`/`snapshot`) and a dedicated driver thread. The driver owns
//! the one pending deferred advance and waits for it with `recv_timeout`, so
//! nothing on the request path ever sleeps for a track's duration.
//!
//! Every run gets a new generation. A deferred advance carries the generation
//! it was armed for and does nothing if the run has since been stopped or
//! superseded. Driver commands are sent while the state lock is held, so the
//! driver sees them in the same order the state changed.

use crate::error::ValidationError;
use crate::library::resolve_path;
use crate::media_info::{MediaInfoProvider, resolve_queue};
use crate::queue::RunState;
use crate::rds::StationText;
use crate::request::{DEFAULT_GAP_SECS, RunPlan, StartRequest, validate_plan};
use crate::snapshot::ProgressSnapshot;
use crate::track::TrackEntry;
use crate::transmitter::{TransmissionParams, TransmitRequest, Transmitter};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound for a single wait. Keeps `Instant` arithmetic in range for
/// absurd durations reported by broken files.
const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 3600);

// ── Options ──────────────────────────────────────────────────────────────────

/// Station-level settings the scheduler applies to every run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Directory relative track identifiers are resolved against.
    pub media_dir: Option<PathBuf>,
    /// Gap after the last track of a `StartRequest`.
    pub default_gap_secs: f64,
    /// Station text used when a request leaves PS or RT out.
    pub default_station: StationText,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            media_dir: None,
            default_gap_secs: DEFAULT_GAP_SECS,
            default_station: StationText::default(),
        }
    }
}

/// Result of `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Nothing was on air. The transmitter is still guaranteed inactive.
    AlreadyIdle,
}

// ── Driver commands ──────────────────────────────────────────────────────────

enum DriverCmd {
    /// Advance `generation` at `deadline`. Replaces any pending advance.
    Arm { generation: u64, deadline: Instant },
    Disarm,
    Shutdown,
}

// ── Scheduler ────────────────────────────────────────────────────────────────

struct Shared {
    state: Mutex<RunState>,
    transmitter: Arc<dyn Transmitter>,
    media_dir: Option<PathBuf>,
}

pub struct PlaybackScheduler {
    shared: Arc<Shared>,
    media: Arc<dyn MediaInfoProvider>,
    options: SchedulerOptions,
    driver_tx: mpsc::Sender<DriverCmd>,
    driver_thread: Option<thread::JoinHandle<()>>,
}

impl PlaybackScheduler {
    /// Create an idle scheduler and spawn its driver thread.
    pub fn new(
        media: Arc<dyn MediaInfoProvider>,
        transmitter: Arc<dyn Transmitter>,
        options: SchedulerOptions,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(RunState::new()),
            transmitter,
            media_dir: options.media_dir.clone(),
        });

        let (driver_tx, driver_rx) = mpsc::channel::<DriverCmd>();
        let driver_shared = shared.clone();
        let driver_thread = thread::Builder::new()
            .name("playout-driver".into())
            .spawn(move || driver_loop(driver_rx, driver_shared))?;

        Ok(PlaybackScheduler {
            shared,
            media,
            options,
            driver_tx,
            driver_thread: Some(driver_thread),
        })
    }

    /// Validate a dashboard request and start a run, superseding any run in
    /// progress. On a validation error nothing changes.
    pub fn start(&self, request: StartRequest) -> Result<u64, ValidationError> {
        let plan = request.into_plan(self.options.default_gap_secs)?;
        Ok(self.start_plan(plan))
    }

    /// Start a run from explicit track entries.
    pub fn start_entries(
        &self,
        params: TransmissionParams,
        entries: Vec<TrackEntry>,
    ) -> Result<u64, ValidationError> {
        let plan = validate_plan(RunPlan { params, entries })?;
        Ok(self.start_plan(plan))
    }

    /// Begin a validated run. Returns its generation.
    fn start_plan(&self, plan: RunPlan) -> u64 {
        let RunPlan { mut params, entries } = plan;
        params.station = params.station.or(&self.options.default_station);

        // Lookups can be slow (ffprobe), so they happen before taking the lock.
        let durations = resolve_queue(self.media.as_ref(), &entries, |file| {
            resolve_path(self.shared.media_dir.as_deref(), file)
        });

        let mut state = self.shared.lock_state();
        if state.reset() {
            info!("superseding the previous run");
        }
        let frequency = params.frequency;
        let track_count = entries.len();
        let generation = state.begin(params, entries, durations);
        info!(generation, frequency, tracks = track_count, "run started");

        let wait = self.shared.launch_current(&mut state);
        self.send(DriverCmd::Arm {
            generation,
            deadline: Instant::now() + wait,
        });
        generation
    }

    /// Stop the run and the transmitter. Safe to call at any time.
    pub fn stop(&self) -> StopOutcome {
        let mut state = self.shared.lock_state();
        let was_active = state.reset();
        self.send(DriverCmd::Disarm);
        drop(state);

        if was_active {
            info!("FM transmission stopped");
            StopOutcome::Stopped
        } else {
            debug!("stop requested while idle");
            StopOutcome::AlreadyIdle
        }
    }

    /// Current progress. Holds the state lock only while copying.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from_state(&self.shared.lock_state())
    }

    fn send(&self, cmd: DriverCmd) {
        // The driver only exits on Shutdown, which is sent from Drop.
        if self.driver_tx.send(cmd).is_err() {
            warn!("playout driver is gone; deferred advance not scheduled");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
        let _ = self.driver_tx.send(DriverCmd::Shutdown);
        if let Some(handle) = self.driver_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        // RunState is consistent between statements; a panic elsewhere must
        // not take the stop path down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put the track at the cursor on air and return how long to wait before
    /// advancing. A track that fails to launch gets only its gap.
    fn launch_current(&self, state: &mut RunState) -> Duration {
        let Some(track) = state.current().cloned() else {
            return Duration::ZERO;
        };
        let Some(params) = state.params.clone() else {
            return Duration::ZERO;
        };

        // At most one transmitter: the previous track's process goes first.
        state.terminate_active();

        let info = state.durations.get(&track.file).cloned().unwrap_or_default();
        let station = &params.station;
        let request = TransmitRequest {
            frequency: params.frequency,
            file: resolve_path(self.media_dir.as_deref(), &track.file),
            ps: station.ps_field(),
            rt: station.rt_field(
                info.artist.as_deref().unwrap_or(""),
                info.title.as_deref().unwrap_or(""),
                info.album.as_deref().unwrap_or(""),
            ),
        };

        match self.transmitter.start(&request) {
            Ok(handle) => {
                state.set_active(handle);
                state.current_airtime = info.duration_secs;
                info!(
                    generation = state.generation,
                    cursor = state.cursor,
                    file = %track.file,
                    duration = info.duration_secs,
                    gap = track.gap,
                    "track on air"
                );
            }
            Err(e) => {
                state.current_airtime = 0.0;
                warn!(
                    generation = state.generation,
                    cursor = state.cursor,
                    file = %track.file,
                    "transmitter failed, skipping after gap: {e}"
                );
            }
        }

        secs_to_wait(state.current_airtime + track.gap)
    }

    /// The deferred advance for `generation`. Returns the next wait, or None
    /// if the run it was armed for is gone.
    fn advance(&self, generation: u64) -> Option<Duration> {
        let mut state = self.lock_state();
        if !state.is_current(generation) {
            debug!(generation, current = state.generation, "stale advance ignored");
            return None;
        }

        if state.commit_advance() {
            info!(generation, played = state.played_count, "queue wrapped to start");
        }
        Some(self.launch_current(&mut state))
    }
}

/// Convert seconds to a wait, treating NaN and negatives as zero.
fn secs_to_wait(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(Duration::ZERO)
        .min(MAX_WAIT)
}

/// Driver thread: holds at most one pending advance and fires it when its
/// deadline passes.
fn driver_loop(rx: mpsc::Receiver<DriverCmd>, shared: Arc<Shared>) {
    let mut pending: Option<(u64, Instant)> = None;

    loop {
        let received = match pending {
            Some((_, deadline)) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        match received {
            Some(DriverCmd::Arm {
                generation,
                deadline,
            }) => pending = Some((generation, deadline)),
            Some(DriverCmd::Disarm) => pending = None,
            Some(DriverCmd::Shutdown) => break,
            None => {
                if let Some((generation, _)) = pending.take() {
                    pending = shared
                        .advance(generation)
                        .map(|wait| (generation, Instant::now() + wait));
                }
            }
        }
    }
    debug!("playout driver exited");
}
