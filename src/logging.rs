//! Logging utilities
//!
//! Tracing subscriber setup for embedding processes. `RUST_LOG` wins over
//! the configured level when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the tracing subscriber with the given default level.
///
/// Safe to call once per process; returns quietly if a subscriber is
/// already installed (e.g. in tests).
pub fn init(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_filter(filter);

    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}

/// Initialize with JSON output, for processes whose logs are shipped to a
/// collector.
pub fn init_json(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().json().with_filter(filter);

    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("info");
        init("debug");
        init_json("info");
    }
}
