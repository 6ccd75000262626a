//! Shared configuration for the `errand` client and the `errandd` daemon.
//!
//! Both binaries must agree on the socket location and its filesystem
//! preparation, so those live here rather than in either binary crate.

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    default_log_filter, default_socket_path, DEFAULT_LOG_FILTER, DEFAULT_POOL_SIZE,
    DEFAULT_SCHEDULER_CAPACITY,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketPath, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unix socket the daemon listens on.
    pub socket: SocketPath,
    /// `tracing` env-filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Number of worker threads executing actions.
    pub pool_size: usize,
    /// Maximum number of concurrently scheduled deferred actions.
    pub scheduler_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
            pool_size: DEFAULT_POOL_SIZE,
            scheduler_capacity: DEFAULT_SCHEDULER_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = Config::default();
        assert!(config.pool_size > 0);
        assert!(config.scheduler_capacity > 0);
        assert!(config.socket.as_path().as_str().ends_with("errandd.sock"));
    }
}
