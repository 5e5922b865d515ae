use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(UtcTime::rfc_3339())
        .init();
}
