//! Tracing setup for binaries and tests that embed the crate.
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `PARLEY_LOG=parley=debug`
pub const LOG_ENV: &str = "PARLEY_LOG";
const DEFAULT_FILTER: &str = "info";

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a fmt subscriber filtered by `PARLEY_LOG` (default `info`).
///
/// Safe to call more than once. A subscriber installed elsewhere is left in place.
pub fn init() {
    INIT.call_once(|| {
        if tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init()
            .is_err()
        {
            tracing::debug!("A global tracing subscriber is already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_init_is_idempotent() {
        env::set_var(LOG_ENV, "parley=debug");
        init();
        init();
        tracing::debug!("logging initialized");
        env::remove_var(LOG_ENV);
    }

    #[test]
    #[serial]
    fn test_invalid_filter_falls_back() {
        env::set_var(LOG_ENV, "parley=notalevel[");
        assert_eq!(env_filter().to_string(), DEFAULT_FILTER);
        env::remove_var(LOG_ENV);
    }
}
