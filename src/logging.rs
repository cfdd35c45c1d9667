use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global tracing subscriber for embedders and test binaries.
///
/// `RUST_LOG` overrides the configured level. Safe to call more than once;
/// later calls are no-ops.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let _ = fmt().with_env_filter(filter).try_init();
}
