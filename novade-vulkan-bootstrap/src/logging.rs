use tracing_subscriber::{fmt, EnvFilter};

/// Installs a stderr `fmt` subscriber. `RUST_LOG` overrides `default_level`; an invalid
/// level falls back to `info`. Does nothing if a global subscriber is already set.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Subscriber for tests, writing through the test harness's captured output.
pub fn init_test_logging() {
    let _ = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
