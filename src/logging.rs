//! Tracing setup for the binary.
//!
//! Filter precedence: `RUST_LOG`, then `DIGY_LOG_LEVEL`, then the verbose
//! flag. Output goes to stderr so script output on stdout stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DIGY_LOG_LEVEL;

/// Initialize the global tracing subscriber.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(DIGY_LOG_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "digy=debug"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "digy=debug");
        assert_eq!(default_directive(false), "warn");
    }
}
