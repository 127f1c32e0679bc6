//! The watchdog run: resolve the target, watch it, and decide what its exit meant.
//!
//! One run supervises exactly one process lifecycle. The run is an explicit state
//! machine advanced by [`Supervisor::step`], so the caller owns the loop and can
//! stop driving it (Ctrl-C, deadline) without the decision logic knowing.

use crate::alert::Alert;
use crate::bundle::{self, BundleLayout, EvidenceBundle};
use crate::classifier::{Classifier, CrashVerdict, ExitEvent};
use crate::config::DaemonConfig;
use crate::discovery::{DiscoveryError, ProcessDiscovery};
use crate::liveness::{LivenessProbe, ProcessHandle};
use crate::scanner::ArtifactSource;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Supervisor states. `Done` and `Failed` are terminal.
#[derive(Debug)]
pub enum SupervisorState {
    Resolving,
    Monitoring(ProcessHandle),
    Classifying {
        handle: ProcessHandle,
        exit: ExitEvent,
    },
    Notifying(EvidenceBundle),
    Done(RunOutcome),
    Failed(Failure),
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Done(_) | SupervisorState::Failed(_))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorState::Resolving => "resolving",
            SupervisorState::Monitoring(_) => "monitoring",
            SupervisorState::Classifying { .. } => "classifying",
            SupervisorState::Notifying(_) => "notifying",
            SupervisorState::Done(_) => "done",
            SupervisorState::Failed(_) => "failed",
        }
    }
}

/// How a completed run ended.
#[derive(Debug)]
pub enum RunOutcome {
    NormalExit,
    Crash(EvidenceBundle),
}

/// Why a run could not supervise anything.
#[derive(Debug)]
pub enum Failure {
    /// Discovery succeeded but nothing matched the target identity.
    NotRunning,
    Discovery(DiscoveryError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::NotRunning => write!(f, "no running process matches the target application"),
            Failure::Discovery(e) => write!(f, "process discovery failed: {e}"),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Failure::NotRunning => None,
            Failure::Discovery(e) => Some(e),
        }
    }
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub poll_interval: Duration,
    pub classifier: Classifier,
    pub log_file: PathBuf,
    pub layout: BundleLayout,
    pub alert_title: String,
    pub alert_message: String,
}

impl Settings {
    /// Resolve run settings from a validated config.
    pub fn from_config(config: &DaemonConfig) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            poll_interval,
            classifier: Classifier::new(config.watch.scan_retries, poll_interval, config.tolerance()),
            log_file: config.export.log_file.clone(),
            layout: BundleLayout {
                export_root: config.export.root.clone(),
                label: config.export.label.clone(),
                log_name: config.export.log_name.clone(),
                report_name: config.export.report_name.clone(),
                write_manifest: config.export.manifest,
            },
            alert_title: config.alert.title.clone(),
            alert_message: config.alert.message.clone(),
        }
    }
}

/// The platform hooks a run talks to.
pub struct Collaborators {
    pub discovery: Box<dyn ProcessDiscovery>,
    pub probe: Box<dyn LivenessProbe>,
    pub reports: Box<dyn ArtifactSource>,
    pub alert: Box<dyn Alert>,
}

pub struct Supervisor {
    settings: Settings,
    hooks: Collaborators,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(settings: Settings, hooks: Collaborators) -> Self {
        Self {
            settings,
            hooks,
            state: SupervisorState::Resolving,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Advance by one transition. Sleeps for one tick while monitoring and for the
    /// classifier's retry window while classifying. A no-op once terminal.
    ///
    /// Cancel-safe: the current state is only replaced once the transition has
    /// finished, so dropping this future mid-sleep leaves the machine where it was.
    pub async fn step(&mut self) -> &SupervisorState {
        let next = match &self.state {
            SupervisorState::Resolving => self.resolve(),
            SupervisorState::Monitoring(handle) => self.monitor(*handle).await,
            SupervisorState::Classifying { handle, exit } => self.classify(*handle, *exit).await,
            SupervisorState::Notifying(bundle) => self.notify(bundle.clone()),
            SupervisorState::Done(_) | SupervisorState::Failed(_) => return &self.state,
        };
        self.state = next;
        &self.state
    }

    /// Drive the machine to a terminal state.
    pub async fn run(&mut self) -> &SupervisorState {
        while !self.state.is_terminal() {
            self.step().await;
        }
        &self.state
    }

    fn resolve(&self) -> SupervisorState {
        match self.hooks.discovery.find() {
            Ok(Some(pid)) => {
                info!(pid = pid.as_raw(), "supervising target process");
                SupervisorState::Monitoring(ProcessHandle::new(pid))
            }
            Ok(None) => {
                error!("no process matches the target application");
                SupervisorState::Failed(Failure::NotRunning)
            }
            Err(e) => {
                error!(error = %e, "process discovery failed");
                SupervisorState::Failed(Failure::Discovery(e))
            }
        }
    }

    async fn monitor(&self, mut handle: ProcessHandle) -> SupervisorState {
        if !self.hooks.probe.is_alive(handle.pid) {
            let exit = ExitEvent::now();
            info!(
                pid = handle.pid.as_raw(),
                last_seen = %handle.last_seen,
                "target process exited, checking for crash reports"
            );
            return SupervisorState::Classifying { handle, exit };
        }
        handle.touch();
        tokio::time::sleep(self.settings.poll_interval).await;
        SupervisorState::Monitoring(handle)
    }

    async fn classify(&self, handle: ProcessHandle, exit: ExitEvent) -> SupervisorState {
        match self
            .settings
            .classifier
            .classify(self.hooks.reports.as_ref(), &exit)
            .await
        {
            CrashVerdict::NormalExit => {
                info!("target process exited normally");
                SupervisorState::Done(RunOutcome::NormalExit)
            }
            CrashVerdict::Crash(report) => {
                let bundle = bundle::bundle(
                    &self.settings.layout,
                    &self.settings.log_file,
                    &report,
                    exit.exit_time,
                    Some(handle.pid.as_raw()),
                );
                SupervisorState::Notifying(bundle)
            }
        }
    }

    fn notify(&self, bundle: EvidenceBundle) -> SupervisorState {
        if let Err(e) = self
            .hooks
            .alert
            .present(&self.settings.alert_title, &self.settings.alert_message)
        {
            warn!(error = %e, "failed to show crash alert");
        }
        SupervisorState::Done(RunOutcome::Crash(bundle))
    }
}
