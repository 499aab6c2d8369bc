//! Logging setup for test binaries and tools built on the testkit.
//!
//! The dispatcher emits one `tracing` span per operation (`rpc.<operation>`,
//! carrying the requested `type_name`), a `debug!` event on entry and an
//! `info!` or `warn!` event on completion. These helpers install a
//! `tracing-subscriber` that writes those events to **stderr**.
//!
//! # Environment Variables
//!
//! - `HEMMER_TESTKIT_LOG`: filter directives for the testkit, e.g.
//!   `hemmer_provider_testkit=debug`
//! - `RUST_LOG`: used when `HEMMER_TESTKIT_LOG` is not set
//!
//! # Example
//!
//! ```ignore
//! #[tokio::test]
//! async fn test_plan() {
//!     hemmer_provider_testkit::init_test_logging();
//!     // ...
//! }
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "HEMMER_TESTKIT_LOG";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the default logging subscriber at `info` level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level, used when neither
/// `HEMMER_TESTKIT_LOG` nor `RUST_LOG` is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

/// Initialize logging for a test, routing output through the test harness
/// so it is only shown for failing tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(fmt::layer().with_test_writer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_testkit=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_testkit::server=debug").is_ok());
    }

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialized twice without panicking");
    }
}
