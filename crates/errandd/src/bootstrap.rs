//! Daemon bootstrap orchestration: wiring the pipeline stages together.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::info;

use errand_config::{Config, SocketPath, SocketPreparationError};

use crate::actions;
use crate::command::{CommandTree, CommandTreeError};
use crate::mailbox::{spawn_actor, Mailbox};
use crate::pool::WorkerPool;
use crate::request::Request;
use crate::resolver::Resolver;
use crate::responder;
use crate::scheduler::Scheduler;
use crate::transport::{ListenerError, ListenerHandle, SocketListener};
use crate::work::Work;

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Socket directory preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// The registered command hierarchy is structurally invalid.
    #[error("invalid command tree: {source}")]
    CommandTree {
        #[source]
        source: CommandTreeError,
    },
    /// Binding or starting the socket listener failed.
    #[error("failed to start listener: {source}")]
    Listener {
        #[source]
        source: ListenerError,
    },
    /// A pipeline thread could not be spawned.
    #[error("failed to spawn pipeline thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

/// A running daemon and the handles needed to stop it.
pub struct DaemonHandle {
    socket: SocketPath,
    listener: ListenerHandle,
    scheduler: Scheduler,
    resolver_mailbox: Mailbox<Request>,
    work_mailbox: Mailbox<Work>,
    responder_mailbox: Mailbox<responder::ResponderMsg>,
    resolver_thread: JoinHandle<()>,
    responder_thread: JoinHandle<()>,
    scheduler_thread: JoinHandle<()>,
    pool: WorkerPool,
}

impl DaemonHandle {
    /// The socket the daemon is serving on.
    #[must_use]
    pub fn socket(&self) -> &SocketPath {
        &self.socket
    }

    /// The scheduler, for introspection in tests.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stops accepting, drains every stage in pipeline order, and joins all
    /// threads.
    pub fn shutdown(self) {
        info!(target: BOOTSTRAP_TARGET, "daemon shutting down");
        self.listener.shutdown();
        let _ = self.listener.join();
        self.scheduler.shutdown();
        let _ = self.scheduler_thread.join();
        self.resolver_mailbox.close();
        let _ = self.resolver_thread.join();
        self.work_mailbox.close();
        self.pool.join();
        self.responder_mailbox.close();
        let _ = self.responder_thread.join();
    }
}

/// Bootstraps the daemon with a custom command-tree builder.
///
/// The builder receives the live scheduler so schedule-family actions can
/// submit into it.
///
/// # Errors
///
/// Returns a [`BootstrapError`] describing the first wiring step that failed.
pub fn bootstrap_with<F>(config: &Config, build_tree: F) -> Result<DaemonHandle, BootstrapError>
where
    F: FnOnce(&Scheduler) -> Result<Arc<CommandTree>, CommandTreeError>,
{
    config
        .socket
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let work_mailbox: Mailbox<Work> = Mailbox::new();
    let responder_mailbox: Mailbox<responder::ResponderMsg> = Mailbox::new();
    let resolver_mailbox: Mailbox<Request> = Mailbox::new();

    let (scheduler, scheduler_thread) =
        Scheduler::start(config.scheduler_capacity, work_mailbox.clone())
            .map_err(|source| BootstrapError::Spawn { source })?;

    let tree = build_tree(&scheduler).map_err(|source| BootstrapError::CommandTree { source })?;

    let pool = WorkerPool::start(
        config.pool_size,
        work_mailbox.clone(),
        responder_mailbox.clone(),
    )
    .map_err(|source| BootstrapError::Spawn { source })?;

    let responder_thread = spawn_actor("responder", responder_mailbox.clone(), responder::handle)
        .map_err(|source| BootstrapError::Spawn { source })?;

    let resolver = Resolver::new(tree, work_mailbox.clone());
    let resolver_thread = spawn_actor("resolver", resolver_mailbox.clone(), move |request| {
        resolver.handle(request);
    })
    .map_err(|source| BootstrapError::Spawn { source })?;

    let listener = SocketListener::bind(&config.socket)
        .map_err(|source| BootstrapError::Listener { source })?;
    let listener = listener
        .start(resolver_mailbox.clone(), Arc::new(AtomicU64::new(1)))
        .map_err(|source| BootstrapError::Listener { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        socket = %config.socket,
        workers = config.pool_size,
        "daemon ready"
    );

    Ok(DaemonHandle {
        socket: config.socket.clone(),
        listener,
        scheduler,
        resolver_mailbox,
        work_mailbox,
        responder_mailbox,
        resolver_thread,
        responder_thread,
        scheduler_thread,
        pool,
    })
}

/// Bootstraps the daemon with the built-in command tree.
///
/// # Errors
///
/// Returns a [`BootstrapError`] describing the first wiring step that failed.
pub fn bootstrap(config: &Config) -> Result<DaemonHandle, BootstrapError> {
    bootstrap_with(config, actions::default_tree)
}
