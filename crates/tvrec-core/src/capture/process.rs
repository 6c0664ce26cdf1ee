//! Handle to the live capture process of a job.

use std::sync::{Arc, Mutex};

/// Pid of the live capture process, shared between the supervisor (which
/// attaches it) and the scheduler (which terminates it on cancel).
#[derive(Debug, Clone, Default)]
pub struct ProcessSlot {
    pid: Arc<Mutex<Option<u32>>>,
}

impl ProcessSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, pid: u32) {
        *self.pid.lock().unwrap() = Some(pid);
    }

    pub fn clear(&self) {
        *self.pid.lock().unwrap() = None;
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap()
    }

    /// Sends SIGTERM to the attached process. Returns false if nothing is attached
    /// or the signal could not be delivered.
    pub fn terminate(&self) -> bool {
        match self.pid() {
            Some(pid) => send_terminate(pid),
            None => false,
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(pid, "SIGTERM failed: {}", std::io::Error::last_os_error());
    }
    rc == 0
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> bool {
    false
}

/// Exit code ffmpeg uses after catching a termination signal.
const FFMPEG_SIGNAL_EXIT: i32 = 255;

/// True if the exit status means the process was stopped by SIGTERM, either
/// killed by it or exiting with ffmpeg's code for a caught signal.
#[cfg(unix)]
pub(crate) fn terminated_by_sigterm(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(libc::SIGTERM) || status.code() == Some(FFMPEG_SIGNAL_EXIT)
}

#[cfg(not(unix))]
pub(crate) fn terminated_by_sigterm(status: &std::process::ExitStatus) -> bool {
    status.code() == Some(FFMPEG_SIGNAL_EXIT)
}
