mod alert;
mod bundle;
mod classifier;
mod config;
mod discovery;
mod liveness;
mod logging;
mod scanner;
mod signals;
mod supervisor;

use alert::{Alert, DialogAlert, NoAlert};
use clap::Parser;
use config::DaemonConfig;
use discovery::{FixedPid, ProcessDiscovery, SystemDiscovery};
use liveness::SignalProbe;
use nix::unistd::Pid;
use scanner::ReportScanner;
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor::{Collaborators, RunOutcome, Settings, Supervisor, SupervisorState};

/// Watchdog for a PCL.Mac instance: waits for the app to exit, checks whether
/// the exit was a crash, and if so exports the log and crash report to the desktop.
#[derive(Parser, Debug)]
#[command(name = "pcl-mac-daemon", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "daemon.toml")]
    config: PathBuf,

    /// Supervise this PID instead of discovering the app
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
    pid: Option<i32>,

    /// Liveness and report-scan interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<f64>,

    /// Number of crash-report scans after exit (overrides config)
    #[arg(long)]
    retries: Option<u32>,

    /// Max seconds between exit and report timestamp (overrides config)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Alert message (overrides config)
    #[arg(long)]
    message: Option<String>,

    /// Alert title (overrides config)
    #[arg(long)]
    title: Option<String>,

    /// Export evidence but don't show a dialog
    #[arg(long)]
    no_alert: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (liveness ticks, scan attempts)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded config.
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(secs) = self.interval {
            config.watch.poll_interval_secs = secs;
        }
        if let Some(n) = self.retries {
            config.watch.scan_retries = n;
        }
        if let Some(secs) = self.tolerance {
            config.watch.tolerance_secs = secs;
        }
        if let Some(ref message) = self.message {
            config.alert.message = message.clone();
        }
        if let Some(ref title) = self.title {
            config.alert.title = title.clone();
        }
        if self.no_alert {
            config.alert.enabled = false;
        }
    }
}

/// Config and I/O problems before supervision starts.
const EXIT_CONFIG: u8 = 2;
/// The target could not be found.
const EXIT_FAILED: u8 = 1;
/// Stopped by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.quiet, cli.verbose);

    tracing::info!("pcl-mac-daemon starting");
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return ExitCode::from(EXIT_CONFIG);
    }

    if cli.dry_run {
        print_settings(&cli, &config);
        return ExitCode::SUCCESS;
    }

    let hooks = match collaborators(&cli, &config) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let mut supervisor = Supervisor::new(Settings::from_config(&config), hooks);
    let mut shutdown = signals::SignalHandler::install();

    tokio::select! {
        state = supervisor.run() => ExitCode::from(exit_status(state)),
        signal = shutdown.recv() => {
            tracing::warn!(signal, "shutdown requested, stopping supervision");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

fn collaborators(cli: &Cli, config: &DaemonConfig) -> Result<Collaborators, config::ConfigError> {
    let discovery: Box<dyn ProcessDiscovery> = match cli.pid {
        Some(pid) => Box::new(FixedPid(Pid::from_raw(pid))),
        None => Box::new(SystemDiscovery::new(
            &config.target.bundle_id,
            &config.target.process_name,
        )),
    };
    let alert: Box<dyn Alert> = if config.alert.enabled {
        Box::new(DialogAlert)
    } else {
        Box::new(NoAlert)
    };
    Ok(Collaborators {
        discovery,
        probe: Box::new(SignalProbe),
        reports: Box::new(ReportScanner::new(
            &config.reports.directory,
            config.report_pattern()?,
            config.watch.timestamp,
        )),
        alert,
    })
}

fn exit_status(state: &SupervisorState) -> u8 {
    match state {
        SupervisorState::Done(RunOutcome::NormalExit) => 0,
        SupervisorState::Done(RunOutcome::Crash(bundle)) => {
            tracing::info!(dir = %bundle.destination.display(), "crash handled");
            0
        }
        SupervisorState::Failed(failure) => {
            tracing::error!(error = %failure, "watchdog could not supervise the target");
            EXIT_FAILED
        }
        other => {
            tracing::error!(state = other.name(), "supervisor stopped in a non-terminal state");
            EXIT_FAILED
        }
    }
}

fn print_settings(cli: &Cli, config: &DaemonConfig) {
    println!("pcl-mac-daemon v{}", env!("CARGO_PKG_VERSION"));
    println!("Config file: {}", cli.config.display());
    match cli.pid {
        Some(pid) => println!("Target: pid {pid}"),
        None => println!(
            "Target: {} ({})",
            config.target.bundle_id, config.target.process_name
        ),
    }
    println!(
        "Watch: every {}s, {} scans, tolerance {}s, {:?} time",
        config.watch.poll_interval_secs,
        config.watch.scan_retries,
        config.watch.tolerance_secs,
        config.watch.timestamp
    );
    println!(
        "Reports: {} ({}*)",
        config.reports.directory.display(),
        config.reports.prefix
    );
    println!("Log file: {}", config.export.log_file.display());
    println!(
        "Export: {}/{}_<timestamp>",
        config.export.root.display(),
        config.export.label
    );
    println!(
        "Alert: {}",
        if config.alert.enabled { "dialog" } else { "off" }
    );
    println!("Dry run mode, config validated, not running.");
}
