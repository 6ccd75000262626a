//! The resolver stage: payload parsing and command lookup.
//!
//! One resolver thread drains the listener's mailbox. For each request it
//! reads the payload, parses the envelope, walks the command tree, and either
//! answers directly (malformed payload, non-terminal command) or forwards a
//! [`Work`] item to the pool.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use errand_proto::{RequestEnvelope, CODE_FAILURE, CODE_OK};

use crate::command::{CommandTree, Parameters};
use crate::mailbox::Mailbox;
use crate::profiler::Profiler;
use crate::request::Request;
use crate::work::{ResultSink, Work};

const RESOLVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resolver");

/// Fixed client-facing message for payloads that do not parse.
pub const MALFORMED_JSON: &str = "Malformed json";

/// Resolves incoming requests against the command tree and dispatches work.
#[derive(Debug)]
pub struct Resolver {
    tree: Arc<CommandTree>,
    pool: Mailbox<Work>,
}

impl Resolver {
    /// Creates a resolver dispatching into `pool`.
    #[must_use]
    pub fn new(tree: Arc<CommandTree>, pool: Mailbox<Work>) -> Self {
        Self { tree, pool }
    }

    /// Handles one request end to end.
    ///
    /// Every path either responds or abandons: the request never escapes
    /// unanswered except by moving into a [`Work`] item.
    pub fn handle(&self, mut request: Request) {
        request.profiler_mut().event("received by resolver");

        let payload = match request.read_payload() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    target: RESOLVER_TARGET,
                    request_id = request.id(),
                    error = %error,
                    "failed to read request payload"
                );
                request.abandon();
                return;
            }
        };

        let envelope: RequestEnvelope = match serde_json::from_slice(&payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(
                    target: RESOLVER_TARGET,
                    request_id = request.id(),
                    error = %error,
                    "rejecting unparseable payload"
                );
                respond(request, json!(MALFORMED_JSON), CODE_FAILURE);
                return;
            }
        };
        request.set_verbose(envelope.verbose);
        request.profiler_mut().event("payload parsed");

        let resolution = self.tree.resolve(&envelope.command);
        request.profiler_mut().event("resolved command");

        // Unmatched trailing tokens and interior nodes both answer with the
        // deepest matched node's help, at the success code.
        if resolution.consumed < envelope.command.len() || resolution.node.action().is_none() {
            respond(request, json!(resolution.node.help()), CODE_OK);
            return;
        }

        let work = Work {
            request_id: request.id(),
            command: resolution.node,
            parameters: Parameters::from_wire(envelope.parameters),
            profiler: Profiler::new(),
            sink: ResultSink::Client { request },
        };
        if let Err(returned) = self.pool.send(work) {
            if let ResultSink::Client { request } = returned.0.sink {
                respond(request, json!("daemon is shutting down"), CODE_FAILURE);
            }
        }
    }
}

fn respond(request: Request, response: serde_json::Value, code: i64) {
    let id = request.id();
    if let Err(error) = request.respond(response, code) {
        warn!(
            target: RESOLVER_TARGET,
            request_id = id,
            error = %error,
            "failed to write response"
        );
    }
}
