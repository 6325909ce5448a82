/// Process-group termination shared by the deadline watchdog and the memory monitor
use crate::config::types::TerminationCause;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::sync::{Mutex, PoisonError};

/// One-shot kill arbiter for a run. The first detector to trigger records the
/// cause and kills the group; later triggers change nothing.
#[derive(Debug)]
pub struct KillSwitch {
    pgid: Pid,
    cause: Mutex<Option<TerminationCause>>,
}

impl KillSwitch {
    /// `pgid` is the child's pid; the child must lead its own process group.
    pub fn new(pgid: u32) -> Self {
        Self {
            pgid: Pid::from_raw(pgid as i32),
            cause: Mutex::new(None),
        }
    }

    /// Claim the switch and kill the group. Returns false if already claimed.
    pub fn trigger(&self, cause: TerminationCause) -> bool {
        let mut recorded = self.cause.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *recorded {
            log::debug!(
                "Kill switch for group {} already claimed by {:?}, ignoring {:?}",
                self.pgid,
                existing,
                cause
            );
            return false;
        }
        *recorded = Some(cause);

        log::debug!("Killing process group {} ({:?})", self.pgid, cause);
        if let Err(e) = self.kill_group() {
            log::warn!("Failed to kill process group {}: {}", self.pgid, e);
        }
        true
    }

    pub fn cause(&self) -> Option<TerminationCause> {
        *self.cause.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kill whatever is left of the group after the leader exited
    pub fn sweep(&self) {
        if let Err(e) = self.kill_group() {
            log::warn!("Sweep of process group {} failed: {}", self.pgid, e);
        }
    }

    fn kill_group(&self) -> nix::Result<()> {
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
