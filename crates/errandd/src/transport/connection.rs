//! One accepted client connection, speaking length-prefixed frames.

use std::os::unix::net::UnixStream;

use errand_proto::framing::{read_frame, write_frame};
use errand_proto::FrameError;

/// Wrapper around an accepted stream that reads and writes whole frames.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    pub(crate) fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Reads one length-prefixed payload.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the peer hangs up mid-frame or the
    /// declared length exceeds the frame cap.
    pub fn read_payload(&mut self) -> Result<Vec<u8>, FrameError> {
        read_frame(&mut self.stream)
    }

    /// Writes one length-prefixed payload and flushes it.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the payload exceeds the frame cap or the
    /// write fails.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        write_frame(&mut self.stream, payload)
    }
}
