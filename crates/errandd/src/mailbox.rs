//! Single-consumer FIFO mailboxes backing the pipeline stages.
//!
//! Every stage owns one mailbox and blocks only on it. `send` never blocks
//! beyond the queue lock, messages are delivered in send order, and each
//! message is handed to exactly one receiver. Closing a mailbox lets the
//! owning actor drain the backlog and then observe `None`, which is the
//! clean-shutdown path used by tests and by [`crate::bootstrap`].

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Handle to a shared FIFO message queue.
///
/// Clones refer to the same queue. The worker pool exploits this: several
/// workers `recv` from one mailbox and each message still reaches exactly one
/// of them.
pub struct Mailbox<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

impl<T> Mailbox<T> {
    /// Creates an empty, open mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueues a message, waking one waiting receiver.
    ///
    /// # Errors
    ///
    /// Returns the message back when the mailbox has been closed.
    pub fn send(&self, message: T) -> Result<(), SendError<T>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(SendError(message));
            }
            state.queue.push_back(message);
        }
        self.inner.available.notify_one();
        Ok(())
    }

    /// Dequeues the oldest message, blocking until one is available.
    ///
    /// Returns `None` once the mailbox is closed and drained.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(message) = state.queue.pop_front() {
                return Some(message);
            }
            if state.closed {
                return None;
            }
            state = self
                .inner
                .available
                .wait(state)
                .unwrap_or_else(|_| panic!("mailbox mutex poisoned"));
        }
    }

    /// Closes the mailbox and wakes every waiting receiver.
    ///
    /// Already queued messages remain receivable; further sends fail.
    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.available.notify_all();
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// True when no messages are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|_| panic!("mailbox mutex poisoned"))
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Mailbox")
            .field("queued", &self.len())
            .finish()
    }
}

/// Returned by [`Mailbox::send`] on a closed mailbox, carrying the message.
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("mailbox is closed")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Spawns a named thread that drains `mailbox` through `handle` until the
/// mailbox is closed.
///
/// # Errors
///
/// Returns an error when the OS refuses to spawn the thread.
pub fn spawn_actor<T, F>(
    name: &str,
    mailbox: Mailbox<T>,
    mut handle: F,
) -> io::Result<JoinHandle<()>>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    thread::Builder::new().name(name.to_owned()).spawn(move || {
        while let Some(message) = mailbox.recv() {
            handle(message);
        }
    })
}
