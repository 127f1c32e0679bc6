use crate::scanner::ArtifactSource;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The moment the supervised process was first observed dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitEvent {
    pub exit_time: DateTime<Utc>,
}

impl ExitEvent {
    pub fn now() -> Self {
        Self {
            exit_time: Utc::now(),
        }
    }
}

/// Outcome of correlating an exit against the crash reports on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashVerdict {
    NormalExit,
    /// Crash confirmed by the report at this path.
    Crash(PathBuf),
}

/// Decides crash vs. normal exit by polling for a crash report near the exit time.
///
/// Crash reports are written asynchronously, sometimes seconds after the process
/// is gone, so a single look is not enough. The classifier scans up to `retries`
/// times, sleeping `interval` between attempts, and stops at the first report
/// whose timestamp is strictly within `tolerance` of the exit.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    retries: u32,
    interval: Duration,
    tolerance: Duration,
}

impl Classifier {
    pub fn new(retries: u32, interval: Duration, tolerance: Duration) -> Self {
        Self {
            retries,
            interval,
            tolerance,
        }
    }

    /// Run the bounded scan loop. Scan errors use up an attempt but never
    /// produce a crash verdict on their own.
    pub async fn classify(&self, source: &dyn ArtifactSource, exit: &ExitEvent) -> CrashVerdict {
        for attempt in 1..=self.retries {
            if attempt > 1 {
                tokio::time::sleep(self.interval).await;
            }

            let candidates = match source.scan() {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt,
                        retries = self.retries,
                        "diagnostic report scan failed"
                    );
                    continue;
                }
            };
            debug!(attempt, candidates = candidates.len(), "scanned diagnostic reports");

            if let Some(hit) = candidates
                .into_iter()
                .find(|c| within_tolerance(c.created, exit.exit_time, self.tolerance))
            {
                info!(
                    report = %hit.path.display(),
                    attempt,
                    "crash report matches exit time, crash confirmed"
                );
                return CrashVerdict::Crash(hit.path);
            }
        }

        info!(retries = self.retries, "no matching crash report, treating as normal exit");
        CrashVerdict::NormalExit
    }
}

/// `|created - exit| < tolerance`. Equality is outside the window.
pub fn within_tolerance(created: DateTime<Utc>, exit: DateTime<Utc>, tolerance: Duration) -> bool {
    let delta = (created - exit).abs();
    match delta.to_std() {
        Ok(d) => d < tolerance,
        Err(_) => false,
    }
}
