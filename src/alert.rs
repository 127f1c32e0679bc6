/// User-facing crash notification.
///
/// The only thing the user ever sees: a blocking modal with a single OK button.
use std::process::Command;

/// Errors from presenting an alert. Always logged, never escalated.
#[derive(Debug)]
pub enum AlertError {
    /// No dialog mechanism on this platform.
    Unsupported,
    Spawn { source: std::io::Error },
    /// The dialog helper exited unsuccessfully.
    Failed { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertError::Unsupported => write!(f, "no dialog mechanism on this platform"),
            AlertError::Spawn { source } => write!(f, "failed to launch dialog: {source}"),
            AlertError::Failed { code, stderr } => {
                write!(f, "dialog exited with {code:?}: {}", stderr.trim())
            }
        }
    }
}

impl std::error::Error for AlertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlertError::Spawn { source } => Some(source),
            _ => None,
        }
    }
}

pub trait Alert: Send + Sync {
    /// Show `message` under `title` and block until the user acknowledges it.
    fn present(&self, title: &str, message: &str) -> Result<(), AlertError>;
}

/// Native modal dialog (AppleScript `display dialog` on macOS).
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogAlert;

impl Alert for DialogAlert {
    fn present(&self, title: &str, message: &str) -> Result<(), AlertError> {
        if !cfg!(target_os = "macos") {
            return Err(AlertError::Unsupported);
        }

        let output = Command::new("/usr/bin/osascript")
            .args(["-e", &dialog_script(title, message)])
            .output()
            .map_err(|e| AlertError::Spawn { source: e })?;
        if !output.status.success() {
            return Err(AlertError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

/// Alerts switched off (`--no-alert`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlert;

impl Alert for NoAlert {
    fn present(&self, title: &str, _message: &str) -> Result<(), AlertError> {
        tracing::debug!(title, "alerts disabled, not showing dialog");
        Ok(())
    }
}

fn dialog_script(title: &str, message: &str) -> String {
    format!(
        "display dialog \"{}\" with title \"{}\" buttons {{\"OK\"}} default button \"OK\" with icon stop",
        applescript_escape(message),
        applescript_escape(title)
    )
}

/// Escape a value for use inside an AppleScript string literal.
fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_script_shape() {
        let script = dialog_script("PCL.Mac has crashed", "See your desktop.");
        assert_eq!(
            script,
            "display dialog \"See your desktop.\" with title \"PCL.Mac has crashed\" buttons {\"OK\"} default button \"OK\" with icon stop"
        );
    }

    #[test]
    fn test_dialog_script_escapes_quotes_and_backslashes() {
        let script = dialog_script("t", r#"say "hi" \ bye"#);
        assert!(script.starts_with(r#"display dialog "say \"hi\" \\ bye" with title"#));
    }

    #[test]
    fn test_no_alert_is_silent_success() {
        assert!(NoAlert.present("title", "message").is_ok());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_dialog_unsupported_off_macos() {
        let err = DialogAlert.present("t", "m").unwrap_err();
        assert!(matches!(err, AlertError::Unsupported));
    }
}
