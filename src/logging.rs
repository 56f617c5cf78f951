//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! Events go to standard error. After detachment descriptor 2 points at the
//! configured stderr file, so daemon logs end up there.

use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the configured log level
pub const LOG_ENV: &str = "BGRUN_LOG";

/// Initialize the global subscriber. Later calls are no-ops.
pub fn init_logging(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug");
        init_logging("info");
        assert!(tracing::dispatcher::has_been_set());
    }
}
