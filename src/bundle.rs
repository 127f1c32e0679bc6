//! Crash evidence export.
//!
//! Copies the application log and the matched crash report into a fresh
//! `<label>_<YYYYMMDD-HHMMSS>` directory. Every step is best-effort: a failure
//! is recorded in the returned [`EvidenceBundle`] and the remaining steps still run.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Name of the manifest written alongside the copied evidence.
pub const MANIFEST_NAME: &str = "bundle.json";

/// Outcome of one bundling step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleStep {
    Done,
    Skipped { reason: String },
}

impl BundleStep {
    fn from_io(result: std::io::Result<()>) -> Self {
        match result {
            Ok(()) => BundleStep::Done,
            Err(e) => BundleStep::Skipped {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, BundleStep::Done)
    }
}

/// Where to put the evidence and what to call it.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    pub export_root: PathBuf,
    pub label: String,
    pub log_name: String,
    pub report_name: String,
    pub write_manifest: bool,
}

/// What ended up on disk.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceBundle {
    pub destination: PathBuf,
    pub exit_time: DateTime<Utc>,
    pub pid: Option<i32>,
    pub log_source: PathBuf,
    pub report_source: PathBuf,
    pub directory: BundleStep,
    pub log: BundleStep,
    pub report: BundleStep,
}

impl EvidenceBundle {
    pub fn log_copied(&self) -> bool {
        self.log.is_done()
    }

    pub fn report_copied(&self) -> bool {
        self.report.is_done()
    }
}

/// `<root>/<label>_<local exit time as %Y%m%d-%H%M%S>`.
///
/// Second granularity: two crashes within the same second share a directory.
pub fn destination_dir(layout: &BundleLayout, exit_time: DateTime<Utc>) -> PathBuf {
    let stamp = exit_time.with_timezone(&Local).format("%Y%m%d-%H%M%S");
    layout.export_root.join(format!("{}_{}", layout.label, stamp))
}

/// Export the log and crash report for a confirmed crash. Never fails as a whole.
pub fn bundle(
    layout: &BundleLayout,
    log_source: &Path,
    report_source: &Path,
    exit_time: DateTime<Utc>,
    pid: Option<i32>,
) -> EvidenceBundle {
    let destination = destination_dir(layout, exit_time);

    let directory = BundleStep::from_io(std::fs::create_dir_all(&destination));
    if let BundleStep::Skipped { reason } = &directory {
        tracing::warn!(dir = %destination.display(), reason = %reason, "failed to create export directory");
    }

    let log = copy_step(log_source, &destination.join(&layout.log_name), "log");
    let report = copy_step(report_source, &destination.join(&layout.report_name), "crash report");

    let bundle = EvidenceBundle {
        destination,
        exit_time,
        pid,
        log_source: log_source.to_path_buf(),
        report_source: report_source.to_path_buf(),
        directory,
        log,
        report,
    };

    if layout.write_manifest {
        if let Err(e) = write_manifest(&bundle) {
            tracing::warn!(error = %e, "failed to write bundle manifest");
        }
    }

    tracing::info!(
        dir = %bundle.destination.display(),
        log_copied = bundle.log_copied(),
        report_copied = bundle.report_copied(),
        "crash evidence exported"
    );
    bundle
}

fn copy_step(from: &Path, to: &Path, what: &str) -> BundleStep {
    let step = BundleStep::from_io(std::fs::copy(from, to).map(|_| ()));
    match &step {
        BundleStep::Done => {
            tracing::debug!(from = %from.display(), to = %to.display(), "copied {what}");
        }
        BundleStep::Skipped { reason } => {
            tracing::warn!(from = %from.display(), reason = %reason, "could not copy {what}");
        }
    }
    step
}

/// Write `bundle.json` via temp file + rename so readers never see half a manifest.
fn write_manifest(bundle: &EvidenceBundle) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(bundle)?;
    let tmp = bundle
        .destination
        .join(format!(".{MANIFEST_NAME}.tmp.{}", std::process::id()));
    std::fs::write(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, bundle.destination.join(MANIFEST_NAME))
}
