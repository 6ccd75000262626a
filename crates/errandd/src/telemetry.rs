//! Process-wide tracing setup.
//!
//! The daemon logs to stderr in either compact or flattened-JSON form,
//! selected by [`Config::log_format`]. Initialisation happens exactly once
//! per process; the pipeline stages then emit through their per-module
//! targets (`errandd::resolver`, `errandd::pool`, ...).

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{subscriber::SetGlobalDefaultError, Subscriber};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use errand_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that the tracing subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while wiring up tracing.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("cannot parse log filter: {0}")]
    Filter(String),
    /// A global subscriber was already installed by someone else.
    #[error("cannot install tracing subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first call.
///
/// Later calls are no-ops that hand back another [`TelemetryHandle`], so the
/// daemon and its tests can both initialise without coordinating.
///
/// # Errors
///
/// Returns a [`TelemetryError`] when the filter expression is invalid or a
/// conflicting global subscriber already exists.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    // Worker threads carry their pool index in the thread name, so names go
    // into every line; ANSI colour only when stderr is a terminal.
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_idempotent() {
        let config = Config::default();
        let first = initialise(&config);
        let second = initialise(&config);
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn bad_filter_is_rejected_before_installation() {
        let result = EnvFilter::try_new("not a [valid] filter//");
        assert!(result.is_err());
    }
}
