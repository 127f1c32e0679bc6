/// Diagnostic report discovery: list the reports directory and collect
/// candidates whose names match the target application's crash-report pattern.
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Every crash report written for PCL.Mac starts with this.
pub const DEFAULT_PREFIX: &str = "PCL.Mac";

/// Full-name pattern of a PCL.Mac crash report, e.g. `PCL.Mac-2024-01-01-235959.ips`.
pub const DEFAULT_PATTERN: &str = r"PCL\.Mac-\d{4}-\d{2}-\d{2}-\d{6}\.ips";

/// Which filesystem timestamp stands in for "when the report was written".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Birth time. What the macOS crash reporter is correlated against.
    Created,
    /// Last modification time, for filesystems without birth time.
    Modified,
}

/// A file in the reports directory that passed both name filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticCandidate {
    pub path: PathBuf,
    pub created: DateTime<Utc>,
}

/// Two-stage filename filter: a cheap prefix check, then a whole-name regex.
#[derive(Debug, Clone)]
pub struct ReportPattern {
    prefix: String,
    regex: Regex,
}

impl ReportPattern {
    /// Build a filter. `pattern` must match the entire file name.
    pub fn new(prefix: &str, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.prefix) && self.regex.is_match(file_name)
    }
}

impl Default for ReportPattern {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            regex: Regex::new(&format!("^(?:{DEFAULT_PATTERN})$")).unwrap(),
        }
    }
}

/// Errors from a single scan attempt.
#[derive(Debug)]
pub enum ScanError {
    /// The reports directory could not be listed.
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A matching entry's metadata or timestamp could not be read.
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::ReadDir { path, source } => {
                write!(f, "failed to list reports directory {}: {}", path.display(), source)
            }
            ScanError::Metadata { path, source } => {
                write!(f, "failed to read timestamp of {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::ReadDir { source, .. } => Some(source),
            ScanError::Metadata { source, .. } => Some(source),
        }
    }
}

/// Anything that can produce the current set of crash-report candidates.
pub trait ArtifactSource: Send + Sync {
    fn scan(&self) -> Result<Vec<DiagnosticCandidate>, ScanError>;
}

/// Scans a real directory on disk.
#[derive(Debug, Clone)]
pub struct ReportScanner {
    dir: PathBuf,
    pattern: ReportPattern,
    timestamp: TimestampSource,
}

impl ReportScanner {
    pub fn new(dir: impl Into<PathBuf>, pattern: ReportPattern, timestamp: TimestampSource) -> Self {
        Self {
            dir: dir.into(),
            pattern,
            timestamp,
        }
    }
}

impl ArtifactSource for ReportScanner {
    fn scan(&self) -> Result<Vec<DiagnosticCandidate>, ScanError> {
        scan(&self.dir, &self.pattern, self.timestamp)
    }
}

/// List `dir` (non-recursively) and return every entry whose name passes `pattern`,
/// in directory listing order.
///
/// Fails if the directory cannot be listed or if any matching entry's timestamp
/// cannot be resolved; the caller retries rather than reading that as "no crash".
pub fn scan(
    dir: &Path,
    pattern: &ReportPattern,
    timestamp: TimestampSource,
) -> Result<Vec<DiagnosticCandidate>, ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScanError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        let file_name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if !pattern.matches(&file_name) {
            continue;
        }

        let metadata = std::fs::metadata(&path).map_err(|e| ScanError::Metadata {
            path: path.clone(),
            source: e,
        })?;
        if metadata.is_dir() {
            continue;
        }

        let time = match timestamp {
            TimestampSource::Created => metadata.created(),
            TimestampSource::Modified => metadata.modified(),
        }
        .map_err(|e| ScanError::Metadata {
            path: path.clone(),
            source: e,
        })?;

        tracing::trace!(file = %file_name, "report candidate");
        candidates.push(DiagnosticCandidate {
            path,
            created: DateTime::<Utc>::from(time),
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, unix_secs: i64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "{}").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
        path
    }

    fn names(candidates: &[DiagnosticCandidate]) -> Vec<String> {
        let mut names: Vec<String> = candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_default_pattern_accepts_report_names() {
        let pattern = ReportPattern::default();
        assert!(pattern.matches("PCL.Mac-2024-01-01-235959.ips"));
        assert!(pattern.matches("PCL.Mac-1999-12-31-000000.ips"));
    }

    #[test]
    fn test_default_pattern_rejects_near_misses() {
        let pattern = ReportPattern::default();
        // Wrong digit counts
        assert!(!pattern.matches("PCL.Mac-24-01-01-235959.ips"));
        assert!(!pattern.matches("PCL.Mac-2024-01-01-2359.ips"));
        // Wrong suffix
        assert!(!pattern.matches("PCL.Mac-2024-01-01-235959.crash"));
        assert!(!pattern.matches("PCL.Mac-2024-01-01-235959.ips.bak"));
        // Literal dot, not any char
        assert!(!pattern.matches("PCL_Mac-2024-01-01-235959.ips"));
        // Prefix passes but the whole name does not
        assert!(!pattern.matches("PCL.Mac.Daemon-2024-01-01-235959.ips"));
        assert!(!pattern.matches("Other-2024-01-01-235959.ips"));
    }

    #[test]
    fn test_prefix_is_checked_independently() {
        // Regex alone would accept this; the prefix filter must not.
        let pattern = ReportPattern::new("PCL.Mac", r".*\.ips").unwrap();
        assert!(pattern.matches("PCL.Mac-x.ips"));
        assert!(!pattern.matches("Finder-x.ips"));
    }

    #[test]
    fn test_scan_filters_by_name() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "PCL.Mac-2024-01-01-235959.ips", 1_700_000_000);
        touch(dir.path(), "PCL.Mac-2024-01-02-000001.ips", 1_700_000_100);
        touch(dir.path(), "PCL.Mac-garbage.ips", 1_700_000_000);
        touch(dir.path(), "Safari-2024-01-01-235959.ips", 1_700_000_000);
        touch(dir.path(), "PCL.Mac-2024-01-01-235959.diag", 1_700_000_000);

        let found = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap();
        assert_eq!(
            names(&found),
            vec![
                "PCL.Mac-2024-01-01-235959.ips",
                "PCL.Mac-2024-01-02-000001.ips"
            ]
        );
    }

    #[test]
    fn test_scan_reports_modified_time() {
        let dir = tempdir().unwrap();
        let path = touch(dir.path(), "PCL.Mac-2024-01-01-235959.ips", 1_700_000_000);

        let found = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, path);
        assert_eq!(found[0].created.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_scan_skips_matching_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("PCL.Mac-2024-01-01-235959.ips")).unwrap();

        let found = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempdir().unwrap();
        let found = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_scan_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("DiagnosticReports");
        let err = scan(&missing, &ReportPattern::default(), TimestampSource::Modified).unwrap_err();
        assert!(matches!(err, ScanError::ReadDir { .. }));
        assert!(err.to_string().contains("DiagnosticReports"));
    }

    #[test]
    fn test_unreadable_candidate_fails_the_scan() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "PCL.Mac-2024-01-02-000001.ips", 1_700_000_100);
        std::os::unix::fs::symlink(
            dir.path().join("rotated-away.ips"),
            dir.path().join("PCL.Mac-2024-01-01-235959.ips"),
        )
        .unwrap();

        let err = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap_err();
        match &err {
            ScanError::Metadata { path, .. } => {
                assert!(path.ends_with("PCL.Mac-2024-01-01-235959.ips"))
            }
            other => panic!("expected a metadata error, got {other}"),
        }
    }

    #[test]
    fn test_dangling_non_matching_entry_is_ignored() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("Safari.ips")).unwrap();

        let found = scan(dir.path(), &ReportPattern::default(), TimestampSource::Modified).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_scan_is_repeatable() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "PCL.Mac-2024-01-01-235959.ips", 1_700_000_000);
        touch(dir.path(), "PCL.Mac-2024-01-02-000001.ips", 1_700_000_100);
        let scanner = ReportScanner::new(
            dir.path(),
            ReportPattern::default(),
            TimestampSource::Modified,
        );

        let mut first = scanner.scan().unwrap();
        let mut second = scanner.scan().unwrap();
        first.sort_by(|a, b| a.path.cmp(&b.path));
        second.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(first, second);
    }
}
