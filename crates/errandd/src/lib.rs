//! The errand daemon: a local automation service behind a Unix socket.
//!
//! Clients submit a command token list plus named parameters as length-prefixed
//! JSON and receive a JSON result. Internally the daemon is a pipeline of
//! actor-style stages, each a dedicated thread draining its own [`mailbox`]:
//!
//! ```text
//! transport (accept) -> resolver -> worker pool -> responder
//!                          ^                |
//!                       scheduler ----------+
//! ```
//!
//! Ownership of a [`request::Request`] moves between stages with each mailbox
//! send; the responder consumes it by value, so at most one response per
//! request is a compile-time property rather than a runtime check. The
//! [`scheduler`] holds deferred actions and feeds them into the same worker
//! pool when they come due.
//!
//! The pluggable units of work are [`command::Action`] implementations hung
//! off an immutable [`command::CommandTree`] built once at startup; see
//! [`actions`] for the built-in command groups.

pub mod actions;
pub mod bootstrap;
pub mod command;
pub mod mailbox;
pub mod pool;
pub mod profiler;
pub mod request;
pub mod resolver;
pub mod responder;
pub mod scheduler;
pub mod telemetry;
pub mod transport;
pub mod work;

pub use bootstrap::{bootstrap, bootstrap_with, BootstrapError, DaemonHandle};
