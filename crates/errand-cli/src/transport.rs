//! Socket transport for the client: connect with a bounded timeout.

use std::os::unix::net::UnixStream;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use errand_config::SocketPath;

use crate::errors::AppError;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to the daemon socket, failing after a bounded timeout rather
/// than hanging on a wedged daemon.
///
/// # Errors
///
/// Returns [`AppError::Connect`] when the socket is absent or unresponsive.
pub fn connect(socket: &SocketPath) -> Result<UnixStream, AppError> {
    connect_unix(socket.as_path().as_str()).map_err(|source| AppError::Connect {
        socket: socket.to_string(),
        source,
    })
}

fn connect_unix(path: &str) -> std::io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn connects_to_a_listening_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("errandd.sock");
        let _listener = UnixListener::bind(&path).expect("bind listener");

        let socket = SocketPath::new(path.to_str().expect("utf8 path"));
        connect(&socket).expect("connect");
    }

    #[test]
    fn missing_socket_is_a_connect_error() {
        let socket = SocketPath::new("/nonexistent/errandd.sock");
        let error = connect(&socket).expect_err("must fail");
        assert!(matches!(error, AppError::Connect { .. }));
    }
}
