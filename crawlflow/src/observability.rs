//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests call
//! one of these helpers once to see them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::errors::CrawlflowError;

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global subscriber filtered by `RUST_LOG`.
///
/// `default_filter` (for example `"crawlflow=debug"`) applies when
/// `RUST_LOG` is unset or invalid.
///
/// # Errors
///
/// Returns `CrawlflowError::Config` if a global subscriber is already set.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<(), CrawlflowError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };
    result.map_err(|e| CrawlflowError::config(format!("tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing("crawlflow=debug", LogFormat::Pretty);
        let err = init_tracing("crawlflow=debug", LogFormat::Json).unwrap_err();
        assert!(matches!(err, CrawlflowError::Config(_)));
    }
}
