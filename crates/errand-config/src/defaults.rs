//! Default values shared by the daemon and the client.

use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::socket::SocketPath;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default worker pool size.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default bound on concurrently scheduled deferred actions.
pub const DEFAULT_SCHEDULER_CAPACITY: usize = 1000;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Computes the default socket path for the daemon.
///
/// Prefers the user runtime directory (`$XDG_RUNTIME_DIR`); falls back to a
/// per-uid namespace under the system temp directory.
#[must_use]
pub fn default_socket_path() -> SocketPath {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("errand");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketPath::new(base.join("errandd.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn user_namespace() -> String {
    "shared".to_owned()
}
