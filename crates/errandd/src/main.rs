use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use errand_config::{Config, LogFormat, SocketPath};

/// Local automation daemon serving a Unix socket.
#[derive(Debug, Parser)]
#[command(name = "errandd", version, about)]
struct Args {
    /// Unix socket path to listen on.
    #[arg(long)]
    socket: Option<String>,

    /// Tracing filter expression, e.g. "info" or "errandd::resolver=debug".
    #[arg(long)]
    log_filter: Option<String>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Number of worker threads executing commands.
    #[arg(long)]
    pool_size: Option<usize>,

    /// Maximum number of pending deferred commands.
    #[arg(long)]
    scheduler_capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}

impl Args {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            socket: self.socket.map_or(defaults.socket, SocketPath::new),
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
            log_format: self
                .log_format
                .map_or(defaults.log_format, LogFormat::from),
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            scheduler_capacity: self
                .scheduler_capacity
                .unwrap_or(defaults.scheduler_capacity),
        }
    }
}

fn main() -> ExitCode {
    let config = Args::parse().into_config();

    if let Err(error) = errandd::telemetry::initialise(&config) {
        eprintln!("errandd: {error}");
        return ExitCode::FAILURE;
    }

    let daemon = match errandd::bootstrap(&config) {
        Ok(daemon) => daemon,
        Err(error) => {
            error!(error = %error, "bootstrap failed");
            return ExitCode::FAILURE;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [libc::SIGINT, libc::SIGTERM] {
        if let Err(error) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            error!(error = %error, signal, "failed to register signal handler");
            daemon.shutdown();
            return ExitCode::FAILURE;
        }
    }
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    daemon.shutdown();
    ExitCode::SUCCESS
}
