use tracing_subscriber::EnvFilter;

/// Installs the process-wide `fmt` subscriber. `RUST_LOG` overrides the default
/// `info` level. Calling it again is a no-op, so tests may call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}
