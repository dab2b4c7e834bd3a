//! Subscriber installation.
//!
//! The level is configuration, not process state: callers pass the resolved
//! [`LogLevel`] and the filter is built from it. `RUST_LOG` still wins when set
//! so embedders can widen the filter for a single run.

use tracing_subscriber::EnvFilter;
use ui_renderer::LogLevel;

/// Builds the filter for `level`, scoped to this workspace's crates.
pub fn filter_for(level: LogLevel) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(directives(level))
}

fn directives(level: LogLevel) -> String {
    format!("warn,tandem={level},ui_renderer={level},ui_renderer_mock={level}")
}

/// Installs a formatting subscriber at `level`.
///
/// Returns `false` when a global subscriber is already installed; that
/// subscriber is left in place.
pub fn init(level: LogLevel) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
