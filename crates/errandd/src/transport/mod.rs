//! Unix socket transport: binding, stale-socket recovery, and the accept
//! loop feeding the resolver mailbox.

mod connection;
mod errors;
mod listener;

pub use self::connection::Connection;
pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
