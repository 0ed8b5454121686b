//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects trace level and
/// the default is info. Returns `false` if a subscriber was already installed,
/// which leaves the existing one in place.
pub fn init(verbose: bool) -> bool {
    let fallback = if verbose { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
