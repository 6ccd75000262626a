//! Wire protocol shared by the `errand` client and the `errandd` daemon.
//!
//! Both sides exchange length-prefixed JSON documents over a Unix domain
//! stream socket: an 8-byte little-endian byte count followed by exactly that
//! many bytes of UTF-8 JSON. The envelope types here define the JSON shapes;
//! the [`framing`] module implements the prefix handling.

pub mod framing;

pub use framing::FrameError;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request document sent by a client.
///
/// `command` is the ordered token path into the daemon's command tree.
/// `parameters` values are usually strings (the CLI sends `name:value`
/// pairs), but arbitrary JSON values are accepted and forwarded untouched for
/// actions that consume raw payloads.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RequestEnvelope {
    /// Ask the daemon to include diagnostics in the response.
    #[serde(default)]
    pub verbose: bool,
    /// Command tokens, outermost first.
    #[serde(default)]
    pub command: Vec<String>,
    /// Named parameters for the resolved action.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// Response document written by the daemon, exactly once per request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResponseEnvelope {
    /// Action result, or help/error text.
    pub response: Value,
    /// 0 on success, negative on failure.
    pub code: i64,
    /// The request id assigned by the daemon.
    pub id: u64,
    /// Labeled timeline offsets in seconds, present only for verbose requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiler: Option<Vec<(String, f64)>>,
    /// Identity of the worker that executed the action, verbose only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl ResponseEnvelope {
    /// Builds a minimal (non-verbose) response.
    #[must_use]
    pub fn new(response: Value, code: i64, id: u64) -> Self {
        Self {
            response,
            code,
            id,
            profiler: None,
            worker: None,
        }
    }
}

/// Code reported for successful execution.
pub const CODE_OK: i64 = 0;

/// Code reported for any request-level failure.
pub const CODE_FAILURE: i64 = -1;
