//! Tracing subscriber setup for the daemon.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Resolve the configured level name. An empty name means `trace`; an unknown name
/// also falls back to `trace` and is reported through the second tuple element.
/// The aliases `warning`, `fatal` and `panic` map onto `warn` and `error`.
pub fn resolve_level(configured: &str) -> (LevelFilter, Option<String>) {
    let configured = configured.trim();
    if configured.is_empty() {
        return (LevelFilter::TRACE, None);
    }

    let lower = configured.to_ascii_lowercase();
    let normalized = match lower.as_str() {
        "warning" => "warn",
        "fatal" | "panic" => "error",
        other => other,
    };

    match normalized.parse::<LevelFilter>() {
        Ok(level) => (level, None),
        Err(_) => (
            LevelFilter::TRACE,
            Some(format!("Log level '{}' not supported, setting to 'trace'", configured)),
        ),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured
/// level when it is set.
pub fn init(configured_level: &str) {
    let (level, problem) = resolve_level(configured_level);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    if let Some(problem) = problem {
        tracing::error!("{}", problem);
    } else if !configured_level.is_empty() {
        tracing::info!(level = %level, "Setting log level");
    }
}
