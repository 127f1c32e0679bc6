/// Target process discovery: resolve the running PCL.Mac instance to a PID.
use nix::unistd::Pid;
use regex::Regex;
use std::process::Command;
use std::sync::LazyLock;

/// `lsappinfo info -only pid <bundle>` prints `"pid"=1234` (or `"pid"=[ NULL ]`).
static LSAPPINFO_PID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""pid"\s*=\s*(\d+)"#).unwrap());

/// Errors from process discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The lookup tool could not be run at all.
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },
    /// The lookup tool ran but its output made no sense.
    Parse { tool: &'static str, output: String },
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::Spawn { tool, source } => {
                write!(f, "failed to run {tool}: {source}")
            }
            DiscoveryError::Parse { tool, output } => {
                write!(f, "unexpected {tool} output: {output:?}")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::Spawn { source, .. } => Some(source),
            DiscoveryError::Parse { .. } => None,
        }
    }
}

/// Finds the PID of the process to supervise. `Ok(None)` means nothing is running.
pub trait ProcessDiscovery: Send + Sync {
    fn find(&self) -> Result<Option<Pid>, DiscoveryError>;
}

/// Looks the target up through the OS: by bundle id on macOS, by
/// executable name everywhere else.
#[derive(Debug, Clone)]
pub struct SystemDiscovery {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    bundle_id: String,
    #[cfg_attr(target_os = "macos", allow(dead_code))]
    process_name: String,
}

impl SystemDiscovery {
    pub fn new(bundle_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            process_name: process_name.into(),
        }
    }
}

impl ProcessDiscovery for SystemDiscovery {
    #[cfg(target_os = "macos")]
    fn find(&self) -> Result<Option<Pid>, DiscoveryError> {
        const TOOL: &str = "lsappinfo";
        let output = Command::new(TOOL)
            .args(["info", "-only", "pid", &self.bundle_id])
            .output()
            .map_err(|e| DiscoveryError::Spawn {
                tool: TOOL,
                source: e,
            })?;
        tracing::debug!(bundle_id = %self.bundle_id, status = ?output.status, "queried lsappinfo");
        parse_lsappinfo(&String::from_utf8_lossy(&output.stdout))
    }

    #[cfg(not(target_os = "macos"))]
    fn find(&self) -> Result<Option<Pid>, DiscoveryError> {
        const TOOL: &str = "pgrep";
        let output = Command::new(TOOL)
            .args(["-n", "-x", &self.process_name])
            .output()
            .map_err(|e| DiscoveryError::Spawn {
                tool: TOOL,
                source: e,
            })?;
        tracing::debug!(process_name = %self.process_name, status = ?output.status, "queried pgrep");
        // pgrep exits 1 when nothing matched
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        parse_pgrep(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Discovery that always answers with a caller-supplied PID (`--pid`).
#[derive(Debug, Clone, Copy)]
pub struct FixedPid(pub Pid);

impl ProcessDiscovery for FixedPid {
    fn find(&self) -> Result<Option<Pid>, DiscoveryError> {
        Ok(Some(self.0))
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_lsappinfo(output: &str) -> Result<Option<Pid>, DiscoveryError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed.contains("NULL") {
        return Ok(None);
    }
    let caps = LSAPPINFO_PID
        .captures(trimmed)
        .ok_or_else(|| DiscoveryError::Parse {
            tool: "lsappinfo",
            output: trimmed.to_string(),
        })?;
    parse_pid(&caps[1], "lsappinfo").map(Some)
}

#[cfg_attr(target_os = "macos", allow(dead_code))]
fn parse_pgrep(output: &str) -> Result<Option<Pid>, DiscoveryError> {
    match output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => parse_pid(line, "pgrep").map(Some),
        None => Ok(None),
    }
}

fn parse_pid(raw: &str, tool: &'static str) -> Result<Pid, DiscoveryError> {
    match raw.parse::<i32>() {
        Ok(n) if n > 0 => Ok(Pid::from_raw(n)),
        _ => Err(DiscoveryError::Parse {
            tool,
            output: raw.to_string(),
        }),
    }
}
