/// Liveness probing for the supervised process.
///
/// Sends the null signal (`kill(pid, 0)`), which performs the existence and
/// permission checks without delivering anything.
use chrono::{DateTime, Utc};
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// The supervised process: its PID and when it was last seen alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Pid,
    pub last_seen: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            last_seen: Utc::now(),
        }
    }

    /// Record a positive liveness check.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

/// Answers "is this PID still a live process?".
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: Pid) -> bool;
}

/// Probe backed by the OS process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl LivenessProbe for SignalProbe {
    fn is_alive(&self, pid: Pid) -> bool {
        match kill(pid, None) {
            Ok(()) => true,
            Err(errno) => {
                // ESRCH is the normal exit case; EPERM means the PID now belongs
                // to someone we cannot signal, which is not our target either.
                tracing::debug!(pid = pid.as_raw(), %errno, "liveness probe failed");
                false
            }
        }
    }
}
