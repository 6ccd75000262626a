//! The accept loop feeding accepted connections into the resolver mailbox.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use errand_config::SocketPath;

use super::{Connection, ListenerError, LISTENER_TARGET};
use crate::mailbox::Mailbox;
use crate::request::Request;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the daemon's Unix socket.
///
/// Binding recovers from a stale socket file left by a crashed daemon: a path
/// that is a socket nobody answers on gets removed and rebound, while a live
/// socket or a non-socket file is refused.
#[derive(Debug)]
pub struct SocketListener {
    socket: SocketPath,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds to `socket`, removing a stale socket file if one is found.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the path hosts a live daemon, is not
    /// a socket, or cannot be bound.
    pub fn bind(socket: &SocketPath) -> Result<Self, ListenerError> {
        let listener = bind_unix(socket.as_path().as_std_path())?;
        Ok(Self {
            socket: socket.clone(),
            listener,
        })
    }

    /// Starts the accept loop on a background thread.
    ///
    /// Each accepted connection becomes a [`Request`] under the next
    /// identifier from `ids` and is sent to `resolver`.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the listener cannot be switched to
    /// non-blocking mode.
    pub fn start(
        self,
        resolver: Mailbox<Request>,
        ids: Arc<AtomicU64>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(error) = self.listener.set_nonblocking(true) {
            cleanup_socket_file(&self.socket);
            return Err(ListenerError::NonBlocking { source: error });
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &shutdown_flag, &resolver, &ids));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => Ok(()),
                Err(_) => Err(ListenerError::ThreadPanic),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    resolver: &Mailbox<Request>,
    ids: &AtomicU64,
) {
    info!(
        target: LISTENER_TARGET,
        socket = %listener.socket,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let id = ids.fetch_add(1, Ordering::SeqCst);
                let request = Request::new(id, Connection::new(stream));
                if resolver.send(request).is_err() {
                    // Resolver mailbox closed; the daemon is shutting down.
                    break;
                }
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    cleanup_socket_file(&listener.socket);
}

fn accept_connection(listener: &UnixListener) -> Result<Option<UnixStream>, io::Error> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::Metadata {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::InUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::Probe {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: path.display().to_string(),
        source,
    })
}

fn cleanup_socket_file(socket: &SocketPath) {
    if let Err(error) = fs::remove_file(socket.as_path().as_std_path()) {
        if error.kind() != io::ErrorKind::NotFound {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                socket = %socket,
                "failed to remove unix socket file"
            );
        }
    }
}
