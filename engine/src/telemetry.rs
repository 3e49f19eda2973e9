//! Logging setup
//!
//! Installs a `tracing-subscriber` registry on stderr so that `--json`
//! output on stdout stays machine-readable. Debug builds print pretty
//! human output, release builds print one JSON object per event.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Filter directive for a configured level: dependencies stay at `warn`,
/// this crate logs at `log_level`. Unknown levels fall back to `info`.
pub fn filter_directive(log_level: &str) -> String {
    let level = log_level.trim().to_lowercase();
    let level = if LEVELS.contains(&level.as_str()) {
        level.as_str()
    } else {
        "info"
    };
    format!("warn,cadre_engine={}", level)
}

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    #[cfg(debug_assertions)]
    let output = fmt::layer()
        .pretty()
        .with_target(false)
        .with_writer(std::io::stderr);

    #[cfg(not(debug_assertions))]
    let output = fmt::layer()
        .json()
        .with_current_span(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(output)
        .try_init()
        .ok();
}
