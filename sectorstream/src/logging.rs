//! Console logging setup.
//!
//! Events go to stderr in a compact single-line format, filtered through
//! `RUST_LOG` (defaulting to `info`). Library code only emits `tracing`
//! events; hosts that install their own subscriber can skip this entirely.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Returns an error when a subscriber is already installed, so embedding
/// hosts that configure logging themselves can call this unconditionally.
pub fn init_logging() -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error_instead_of_panicking() {
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
