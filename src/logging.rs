//! Tracing subscriber setup for hosts embedding the search core.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Env var consulted first for the filter directive; `RUST_LOG` is the fallback.
pub const LOG_ENV: &str = "AGENT_SEARCH_LOG";

/// Install a global fmt subscriber. Safe to call more than once; only the first call
/// has an effect, and an already-installed global subscriber is left alone.
pub fn init_tracing(default_directive: &str) {
    INIT.get_or_init(|| {
        let filter = dotenvy::var(LOG_ENV)
            .ok()
            .and_then(|raw| EnvFilter::try_new(raw).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug");
        init_tracing("trace");
        tracing::debug!("logging initialized");
        assert!(INIT.get().is_some());
    }
}
