//! Shutdown signals for the watchdog itself.
//!
//! SIGINT and SIGTERM both stop supervision where it stands; no bundle or
//! alert is produced for a run cut short this way.
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Installed before supervision starts so a signal that arrives early is
/// still queued for [`SignalHandler::recv`].
pub struct SignalHandler {
    term: Option<Signal>,
}

impl SignalHandler {
    pub fn install() -> Self {
        let term = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler, only Ctrl-C will stop the watchdog");
                None
            }
        };
        Self { term }
    }

    /// Resolve with the name of the first shutdown signal received.
    pub async fn recv(&mut self) -> &'static str {
        let Some(term) = self.term.as_mut() else {
            return match tokio::signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(_) => std::future::pending().await,
            };
        };

        let interrupted = tokio::select! {
            r = tokio::signal::ctrl_c() => Some(r),
            _ = term.recv() => None,
        };
        match interrupted {
            None => "SIGTERM",
            Some(Ok(())) => "SIGINT",
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                term.recv().await;
                "SIGTERM"
            }
        }
    }
}
