//! Work items flowing into the worker pool.

use std::sync::Arc;

use crate::command::{CommandNode, Parameters};
use crate::profiler::Profiler;
use crate::request::Request;

/// Where a work item's result goes after execution.
#[derive(Debug)]
pub enum ResultSink {
    /// A waiting client; the request still owes a response.
    Client { request: Request },
    /// A scheduler-originated execution with nobody waiting. The outcome is
    /// logged and discarded.
    Background,
}

/// A resolved command plus its parameters, ready for execution.
///
/// Built by the resolver for client requests and by the scheduler for
/// deferred ones; both flow through the same pool mailbox.
#[derive(Debug)]
pub struct Work {
    /// Identifier of the originating request, kept for log correlation even
    /// when the sink is [`ResultSink::Background`].
    pub request_id: u64,
    /// The terminal command node to execute.
    pub command: Arc<CommandNode>,
    /// Parameters as received, validated by the worker before execution.
    pub parameters: Parameters,
    /// The worker's own timeline, merged into the request's by the responder.
    pub profiler: Profiler,
    /// Destination for the result.
    pub sink: ResultSink,
}
