//! The responder stage: the single writer of client responses.
//!
//! Workers never touch the client socket; they hand finished results here.
//! The responder merges the worker's timeline into the request's, stamps the
//! serving worker, and consumes the request with its one allowed response.

use serde_json::Value;
use tracing::{debug, warn};

use crate::request::Request;

const RESPONDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::responder");

/// A finished result on its way back to a waiting client.
#[derive(Debug)]
pub struct ResponderMsg {
    /// The request owing a response.
    pub request: Request,
    /// Result value produced by the action (or a failure message).
    pub value: Value,
    /// Response code, zero for success.
    pub code: i64,
    /// The worker's timeline, merged into the request's under a worker
    /// prefix.
    pub work_profiler: crate::profiler::Profiler,
    /// Name of the worker that served the request.
    pub worker: String,
}

/// Finalizes one result: diagnostics, then the response write.
pub fn handle(message: ResponderMsg) {
    let ResponderMsg {
        mut request,
        value,
        code,
        work_profiler,
        worker,
    } = message;

    request.profiler_mut().event("received by responder");
    request
        .profiler_mut()
        .absorb(&format!("{worker}:"), &work_profiler);
    request.set_worker(worker);

    let id = request.id();
    debug!(
        target: RESPONDER_TARGET,
        request_id = id,
        code,
        "writing response"
    );
    if let Err(error) = request.respond(value, code) {
        warn!(
            target: RESPONDER_TARGET,
            request_id = id,
            error = %error,
            "failed to write response"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    use serde_json::json;

    use errand_proto::framing::{read_frame, write_frame};
    use errand_proto::{ResponseEnvelope, CODE_OK};

    use crate::profiler::Profiler;
    use crate::transport::Connection;

    fn roundtrip(verbose: bool) -> ResponseEnvelope {
        let (mut client, server) = UnixStream::pair().expect("socket pair");
        let mut request = crate::request::Request::new(11, Connection::new(server));
        write_frame(&mut client, b"{}").expect("prime payload");
        let _ = request.read_payload();
        request.set_verbose(verbose);
        request.profiler_mut().event("received by resolver");

        let mut work_profiler = Profiler::new();
        work_profiler.event("executed");

        handle(ResponderMsg {
            request,
            value: json!({"done": true}),
            code: CODE_OK,
            work_profiler,
            worker: "worker-0".to_owned(),
        });

        let payload = read_frame(&mut client).expect("read response");
        serde_json::from_slice(&payload).expect("parse response")
    }

    #[test]
    fn verbose_response_carries_worker_and_merged_timeline() {
        let response = roundtrip(true);
        assert_eq!(response.id, 11);
        assert_eq!(response.code, CODE_OK);
        assert_eq!(response.worker.as_deref(), Some("worker-0"));
        let profiler = response.profiler.expect("profiler expected");
        let labels: Vec<&str> = profiler.iter().map(|(label, _)| label.as_str()).collect();
        assert!(labels.contains(&"received by resolver"));
        assert!(labels.contains(&"worker-0:executed"));
        assert!(labels.contains(&"received by responder"));
    }

    #[test]
    fn quiet_response_omits_diagnostics() {
        let response = roundtrip(false);
        assert_eq!(response.id, 11);
        assert!(response.profiler.is_none());
        assert!(response.worker.is_none());
    }
}
