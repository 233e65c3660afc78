//! Tracing setup. `RUST_LOG` wins over the configured level.
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Human readable output. Does nothing if a subscriber is already installed.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// JSON lines for log shipping.
pub fn init_tracing_json(log_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(filter(log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init();
}
