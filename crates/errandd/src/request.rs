//! An in-flight client request and its single-use response channel.

use serde_json::Value;
use tracing::error;

use errand_proto::ResponseEnvelope;

use crate::profiler::Profiler;
use crate::transport::Connection;

const REQUEST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::request");

/// A connection that owes the client exactly one response.
///
/// The request moves through the pipeline by value and [`Request::respond`]
/// consumes it, so double responses cannot be written. A request dropped with
/// its connection still attached was lost by a pipeline stage; `Drop` logs
/// that loudly.
#[derive(Debug)]
pub struct Request {
    id: u64,
    conn: Option<Connection>,
    verbose: bool,
    worker: Option<String>,
    profiler: Profiler,
}

impl Request {
    /// Wraps an accepted connection under a fresh request identifier.
    #[must_use]
    pub(crate) fn new(id: u64, conn: Connection) -> Self {
        Self {
            id,
            conn: Some(conn),
            verbose: false,
            worker: None,
            profiler: Profiler::new(),
        }
    }

    /// The request identifier, unique for the daemon's lifetime.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the client asked for timing diagnostics in the response.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Records the client's verbosity choice, parsed from the payload.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Records which pool worker served the request.
    pub fn set_worker(&mut self, worker: impl Into<String>) {
        self.worker = Some(worker.into());
    }

    /// The request's own timing timeline.
    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    /// Reads the client's length-prefixed payload from the connection.
    ///
    /// # Errors
    ///
    /// Returns the framing error when the client hangs up or sends an
    /// oversized frame.
    pub fn read_payload(&mut self) -> Result<Vec<u8>, errand_proto::FrameError> {
        match self.conn.as_mut() {
            Some(conn) => conn.read_payload(),
            // Unreachable: respond and abandon both consume the request.
            None => Err(errand_proto::FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "request has no connection",
            ))),
        }
    }

    /// Sends the response and consumes the request.
    ///
    /// Timing and worker diagnostics are attached only when the client asked
    /// for them.
    ///
    /// # Errors
    ///
    /// Returns the underlying framing error; the request is consumed either
    /// way.
    pub fn respond(mut self, response: Value, code: i64) -> Result<(), errand_proto::FrameError> {
        let mut envelope = ResponseEnvelope::new(response, code, self.id);
        if self.verbose {
            envelope.profiler = Some(self.profiler.to_wire());
            envelope.worker = self.worker.take();
        }
        let Some(mut conn) = self.conn.take() else {
            // Unreachable by construction; respond consumes self.
            return Ok(());
        };
        let payload = serde_json::to_vec(&envelope).map_err(std::io::Error::from)?;
        conn.write_payload(&payload)
    }

    /// Drops the connection without answering, for transport-level failures
    /// where no response can reach the client.
    pub fn abandon(mut self) {
        drop(self.conn.take());
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.conn.is_some() {
            error!(
                target: REQUEST_TARGET,
                request_id = self.id,
                "request was dropped without a response"
            );
        }
    }
}
