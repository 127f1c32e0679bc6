/// Tracing subscriber setup.
///
/// Verbosity is decided once here; components just emit events.
use tracing_subscriber::EnvFilter;

/// Level applied to this crate when `RUST_LOG` is not set.
pub fn default_directive(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "pcl_mac_daemon=warn"
    } else if verbose {
        "pcl_mac_daemon=debug"
    } else {
        "pcl_mac_daemon=info"
    }
}

fn filter(quiet: bool, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbose)))
}

/// Install the global fmt subscriber. Call once, before anything logs.
pub fn init(quiet: bool, verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(quiet, verbose))
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
