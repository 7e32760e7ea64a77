use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured stdout tracing. Call once at service startup.
///
/// JSON lines with event fields flattened to the top level. Filtering follows `RUST_LOG`,
/// falling back to `default_directives` (e.g. `"info,ridepool_auth=debug"`) when unset.
///
/// Safe to call multiple times; subsequent calls are silently ignored.
pub fn init_tracing(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_current_span(true))
        .try_init();
}
