//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_FILTER: &str = "pagenote=info";

/// Install the global fmt subscriber, writing to stderr.
///
/// `RUST_LOG` overrides `default_filter`. Returns false if a subscriber was
/// already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Parse `directives`, falling back to [`DEFAULT_FILTER`] when they are invalid.
fn configured_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
