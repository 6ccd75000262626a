//! Daemon introspection.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::command::{Action, ActionError, Invocation, ParamSpec};

/// The `info stats` command: version, start time, and uptime.
#[derive(Debug)]
pub struct StatsAction {
    started_unix: u64,
    started: Instant,
}

impl StatsAction {
    /// Captures the current instant as the daemon start time.
    #[must_use]
    pub fn new() -> Self {
        let started_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self {
            started_unix,
            started: Instant::now(),
        }
    }
}

impl Default for StatsAction {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for StatsAction {
    fn spec(&self) -> ParamSpec {
        ParamSpec::new()
    }

    fn execute(&self, _invocation: &Invocation<'_>) -> Result<Value, ActionError> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "started_unix": self.started_unix,
            "uptime_seconds": self.started.elapsed().as_secs(),
        }))
    }
}
