//! Client-side error taxonomy.

use thiserror::Error;

use errand_proto::FrameError;

/// Errors surfaced while talking to the daemon.
#[derive(Debug, Error)]
pub enum AppError {
    /// The same parameter name was given twice.
    #[error("duplicate parameter '{name}'")]
    DuplicateParameter { name: String },
    /// The request could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Connecting to the daemon socket failed.
    #[error("failed to connect to daemon at {socket}: {source}")]
    Connect {
        socket: String,
        #[source]
        source: std::io::Error,
    },
    /// Writing the request frame failed.
    #[error("failed to send request: {0}")]
    Send(#[source] FrameError),
    /// Writing the rendered response to the output stream failed.
    #[error("failed to print response: {0}")]
    Output(#[source] std::io::Error),
    /// Reading the response frame failed.
    #[error("failed to receive response: {0}")]
    Receive(#[source] FrameError),
    /// The daemon's response did not parse.
    #[error("unparseable response from daemon: {0}")]
    Parse(#[source] serde_json::Error),
}
