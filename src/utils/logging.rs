// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the fmt subscriber. `RUST_LOG` sets the filter; without it,
/// this crate logs at info and noisy HTTP internals at warn.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,html5ever=warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!("Logging setup complete.");
}
