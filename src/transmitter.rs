//! The external FM transmitter process.
//!
//! `PiFmRds` launches `pi_fm_rds` for one file and returns a `ProcessHandle`
//! that owns the child. Only one handle is ever alive per scheduler; dropping
//! or terminating it stops the process and anything it forked.

use crate::error::LaunchError;
use crate::rds::StationText;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frequency and station text for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionParams {
    /// Carrier frequency in MHz.
    pub frequency: f64,
    #[serde(default)]
    pub station: StationText,
}

/// Everything the transmitter needs to air one file.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitRequest {
    pub frequency: f64,
    pub file: PathBuf,
    pub ps: Option<String>,
    pub rt: Option<String>,
}

/// Starts a transmission for one file.
pub trait Transmitter: Send + Sync {
    fn start(&self, request: &TransmitRequest) -> Result<Box<dyn TransmissionHandle>, LaunchError>;
}

/// An outstanding transmission.
///
/// `terminate` must be safe to call more than once and after the process has
/// already exited.
pub trait TransmissionHandle: Send {
    fn terminate(&mut self);

    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32> {
        None
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// How long a terminated transmitter gets to exit before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(3);
const REAP_POLL: Duration = Duration::from_millis(20);

/// Owns a spawned child process. Stopped on `terminate` or drop.
///
/// On Unix the child leads its own process group, so the stop signal also
/// reaches anything it forked (`sudo` runs `pi_fm_rds` as its child). The
/// caller only pays for the signal: waiting out the grace period, killing a
/// straggler and reaping happen on a detached reaper thread.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
    pid: u32,
}

impl ProcessHandle {
    /// Spawn `command` in a fresh process group.
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn()?;
        let pid = child.id();
        Ok(ProcessHandle {
            child: Some(child),
            pid,
        })
    }
}

impl TransmissionHandle for ProcessHandle {
    fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = self.pid;
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid, %status, "transmitter already exited");
            // The leader is gone but its forks may still hold the group.
            #[cfg(unix)]
            signal_stop(pid, &mut child);
            return;
        }

        signal_stop(pid, &mut child);
        if let Ok(Some(status)) = child.try_wait() {
            info!(pid, %status, "transmitter terminated");
            return;
        }

        let reaper = thread::Builder::new()
            .name("transmitter-reaper".into())
            .spawn(move || reap(pid, child));
        if let Err(e) = reaper {
            warn!(pid, "Failed to spawn reaper thread: {e}");
        }
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Wait out the grace period, then kill whatever is left and reap the child.
fn reap(pid: u32, mut child: Child) {
    let deadline = Instant::now() + TERM_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(pid, %status, "transmitter terminated");
                return;
            }
            Ok(None) => thread::sleep(REAP_POLL),
            Err(e) => {
                warn!(pid, "Failed to poll transmitter: {e}");
                break;
            }
        }
    }

    warn!(pid, "transmitter still running after {:?}, killing", TERM_GRACE);
    signal_kill(pid, &mut child);
    match child.wait() {
        Ok(status) => info!(pid, %status, "transmitter killed"),
        Err(e) => warn!(pid, "Failed to reap transmitter: {e}"),
    }
}

/// Ask the transmitter's process group to exit. `sudo` relays SIGTERM to
/// `pi_fm_rds`, which a SIGKILL of `sudo` alone would orphan.
#[cfg(unix)]
fn signal_stop(pid: u32, _child: &mut Child) {
    if let Err(e) = signal_group(pid, libc::SIGTERM) {
        warn!(pid, "Failed to signal transmitter group: {e}");
    }
}

#[cfg(unix)]
fn signal_kill(pid: u32, child: &mut Child) {
    if let Err(e) = signal_group(pid, libc::SIGKILL) {
        warn!(pid, "Failed to kill transmitter group: {e}");
    }
    // The group kill is refused for members owned by another user.
    if let Err(e) = child.kill() {
        debug!(pid, "Direct kill failed: {e}");
    }
}

/// Send `signal` to the process group led by `pid`. A group that has already
/// emptied is not an error.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg only takes integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid, signal) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn signal_stop(pid: u32, child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(pid, "Failed to kill transmitter: {e}");
    }
}

#[cfg(not(unix))]
fn signal_kill(pid: u32, child: &mut Child) {
    signal_stop(pid, child);
}

// ── PiFmRds ──────────────────────────────────────────────────────────────────

/// Launches the PiFmRds `pi_fm_rds` binary.
#[derive(Debug, Clone)]
pub struct PiFmRds {
    binary: PathBuf,
    use_sudo: bool,
}

impl PiFmRds {
    pub fn new(binary: impl Into<PathBuf>, use_sudo: bool) -> Self {
        PiFmRds {
            binary: binary.into(),
            use_sudo,
        }
    }

    /// Program and arguments for `request`, including the `sudo` prefix.
    pub fn command_line(&self, request: &TransmitRequest) -> (String, Vec<String>) {
        let args = build_pifm_args(request);
        if self.use_sudo {
            let mut full = vec![self.binary.to_string_lossy().to_string()];
            full.extend(args);
            ("sudo".to_string(), full)
        } else {
            (self.binary.to_string_lossy().to_string(), args)
        }
    }
}

/// Build the `pi_fm_rds` argument list.
pub fn build_pifm_args(request: &TransmitRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-freq".into(),
        format_frequency(request.frequency),
        "-audio".into(),
        request.file.to_string_lossy().to_string(),
    ];
    if let Some(ps) = &request.ps {
        args.push("-ps".into());
        args.push(ps.clone());
    }
    if let Some(rt) = &request.rt {
        args.push("-rt".into());
        args.push(rt.clone());
    }
    args
}

/// Frequency in MHz with at most one decimal, the precision `pi_fm_rds` tunes to.
pub fn format_frequency(mhz: f64) -> String {
    let rounded = (mhz * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

impl Transmitter for PiFmRds {
    fn start(&self, request: &TransmitRequest) -> Result<Box<dyn TransmissionHandle>, LaunchError> {
        if !request.frequency.is_finite() || request.frequency <= 0.0 {
            return Err(LaunchError::Rejected(format!(
                "frequency {} MHz",
                request.frequency
            )));
        }
        if !request.file.exists() {
            return Err(LaunchError::Rejected(format!(
                "audio file '{}' does not exist",
                request.file.display()
            )));
        }

        let (program, args) = self.command_line(request);
        info!("Executing command: {} {}", program, args.join(" "));

        let mut command = Command::new(&program);
        command.args(&args).stdin(Stdio::null()).stdout(Stdio::null());
        let handle = ProcessHandle::spawn(&mut command).map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        info!(pid = handle.pid, "transmitter started");
        Ok(Box::new(handle))
    }
}
