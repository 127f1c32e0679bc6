use crate::scanner::{ReportPattern, TimestampSource};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from daemon.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct DaemonConfig {
    pub target: TargetConfig,
    pub watch: WatchConfig,
    pub reports: ReportsConfig,
    pub export: ExportConfig,
    pub alert: AlertConfig,
}

/// Identity of the supervised application.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Bundle identifier used by macOS discovery.
    pub bundle_id: String,
    /// Executable name used by `pgrep` everywhere else.
    pub process_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_secs: f64,
    pub scan_retries: u32,
    pub tolerance_secs: f64,
    pub timestamp: TimestampSource,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub log_file: PathBuf,
    pub root: PathBuf,
    pub label: String,
    pub log_name: String,
    pub report_name: String,
    pub manifest: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub title: String,
    pub message: String,
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Pattern { pattern, source } => {
                write!(f, "invalid report pattern {pattern:?}: {source}")
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid value for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Pattern { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<DaemonConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(DaemonConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl DaemonConfig {
    /// Reject settings that would make the watchdog spin or never match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_secs("watch.poll_interval_secs", self.watch.poll_interval_secs)?;
        check_secs("watch.tolerance_secs", self.watch.tolerance_secs)?;
        if self.watch.scan_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "watch.scan_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.export.label.is_empty() {
            return Err(ConfigError::Invalid {
                field: "export.label",
                reason: "must not be empty".to_string(),
            });
        }
        self.report_pattern()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.watch.poll_interval_secs)
    }

    pub fn tolerance(&self) -> Duration {
        Duration::from_secs_f64(self.watch.tolerance_secs)
    }

    /// Compile the configured report filename filter.
    pub fn report_pattern(&self) -> Result<ReportPattern, ConfigError> {
        ReportPattern::new(&self.reports.prefix, &self.reports.pattern).map_err(|e| {
            ConfigError::Pattern {
                pattern: self.reports.pattern.clone(),
                source: e,
            }
        })
    }
}

/// Accept exactly the values `Duration::from_secs_f64` can represent.
fn check_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
    Duration::try_from_secs_f64(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("{value} is not a usable number of seconds: {e}"),
        })
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// --- Default implementations ---

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            bundle_id: "io.github.pcl-communtiy.PCL-Mac".to_string(),
            process_name: "PCL.Mac".to_string(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1.0,
            scan_retries: 5,
            tolerance_secs: 1.0,
            timestamp: TimestampSource::Created,
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: home().join("Library").join("Logs").join("DiagnosticReports"),
            prefix: crate::scanner::DEFAULT_PREFIX.to_string(),
            pattern: crate::scanner::DEFAULT_PATTERN.to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        let support = dirs::data_dir().unwrap_or_else(home);
        Self {
            log_file: support.join("PCL-Mac").join("Logs").join("app.log"),
            root: dirs::desktop_dir().unwrap_or_else(home),
            label: "PCL.Mac_CrashReport".to_string(),
            log_name: "app.log".to_string(),
            report_name: "DiagnosticReport.ips".to_string(),
            manifest: true,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "PCL.Mac has crashed".to_string(),
            message: "A crash report was saved to your desktop. Please compress it and send it to the community group.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaemonConfig::default();
        config.validate().unwrap();
        assert_eq!(config.watch.scan_retries, 5);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.tolerance(), Duration::from_secs(1));
        assert_eq!(config.watch.timestamp, TimestampSource::Created);
        assert!(config.reports.directory.ends_with("Library/Logs/DiagnosticReports"));
        assert!(config.export.log_file.ends_with("PCL-Mac/Logs/app.log"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("daemon.toml")).unwrap();
        assert_eq!(config.target.process_name, "PCL.Mac");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(
            &path,
            "[watch]\ntolerance_secs = 10.0\ntimestamp = \"modified\"\n\n[export]\nroot = \"/tmp/out\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.tolerance(), Duration::from_secs(10));
        assert_eq!(config.watch.timestamp, TimestampSource::Modified);
        assert_eq!(config.watch.scan_retries, 5);
        assert_eq!(config.export.root, PathBuf::from("/tmp/out"));
        assert_eq!(config.export.report_name, "DiagnosticReport.ips");
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(&path, "[watch\nbroken").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = DaemonConfig::default();
        config.watch.scan_retries = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "watch.scan_retries",
                ..
            }
        ));
    }

    #[test]
    fn test_negative_and_nan_durations_rejected() {
        let mut config = DaemonConfig::default();
        config.watch.poll_interval_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.watch.tolerance_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        let mut config = DaemonConfig::default();
        config.watch.poll_interval_secs = 1e300;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "watch.poll_interval_secs",
                ..
            }
        ));

        let mut config = DaemonConfig::default();
        config.watch.tolerance_secs = 1e30;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.watch.tolerance_secs = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_large_but_representable_interval_accepted() {
        let mut config = DaemonConfig::default();
        config.watch.poll_interval_secs = 86_400.0;
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = DaemonConfig::default();
        config.reports.pattern = "PCL(".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}
