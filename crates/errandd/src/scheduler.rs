//! Deferred execution: a time-ordered queue with a dedicated waiter thread.
//!
//! Insertions are ordered by due instant with insertion order breaking ties.
//! The waiter holds a single condition variable: empty queue blocks
//! indefinitely, a pending head waits no longer than its remaining delta, and
//! every insertion wakes the waiter so an earlier-due entry preempts the
//! current wait. Due entries are never executed on the waiter thread; they go
//! to the worker pool like everything else.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{CommandNode, Parameters};
use crate::mailbox::Mailbox;
use crate::profiler::Profiler;
use crate::work::{ResultSink, Work};

const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");

/// Errors surfaced when deferring a command.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Every slot up to the configured capacity is occupied.
    #[error("scheduler capacity of {capacity} deferred commands exhausted")]
    CapacityExhausted { capacity: usize },
    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShutDown,
}

struct Entry {
    slot: usize,
    request_id: u64,
    command: Arc<CommandNode>,
    parameters: Parameters,
}

struct State {
    /// Time-ordered index; the insertion sequence breaks due-time ties.
    queue: BTreeMap<(Instant, u64), Entry>,
    /// Slot id to queue key, for free-slot checks and future cancellation.
    slots: HashMap<usize, (Instant, u64)>,
    seq: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    capacity: usize,
    pool: Mailbox<Work>,
}

/// Handle to the deferred-command queue. Clones share the queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Creates the queue and spawns its waiter thread.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS refuses to spawn the waiter thread.
    pub fn start(capacity: usize, pool: Mailbox<Work>) -> std::io::Result<(Self, JoinHandle<()>)> {
        let scheduler = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: BTreeMap::new(),
                    slots: HashMap::new(),
                    seq: 0,
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
                capacity,
                pool,
            }),
        };
        let waiter = scheduler.clone();
        let handle = thread::Builder::new()
            .name("scheduler".to_owned())
            .spawn(move || waiter.run())?;
        Ok((scheduler, handle))
    }

    /// Defers `command` until `due`, returning the allocated slot id.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::CapacityExhausted`] when every slot is
    /// taken, or [`SchedulerError::ShutDown`] after shutdown.
    pub fn add(
        &self,
        due: Instant,
        command: Arc<CommandNode>,
        parameters: Parameters,
        request_id: u64,
    ) -> Result<usize, SchedulerError> {
        let slot = {
            let mut state = self.lock();
            if state.shutdown {
                return Err(SchedulerError::ShutDown);
            }
            let slot = (0..self.shared.capacity)
                .find(|slot| !state.slots.contains_key(slot))
                .ok_or(SchedulerError::CapacityExhausted {
                    capacity: self.shared.capacity,
                })?;
            let key = (due, state.seq);
            state.seq += 1;
            state.queue.insert(
                key,
                Entry {
                    slot,
                    request_id,
                    command,
                    parameters,
                },
            );
            state.slots.insert(slot, key);
            slot
        };
        self.shared.wakeup.notify_one();
        debug!(
            target: SCHEDULER_TARGET,
            request_id,
            slot,
            "deferred command queued"
        );
        Ok(slot)
    }

    /// Number of pending deferred commands.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Stops the waiter thread; pending entries are discarded.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.shared.wakeup.notify_all();
    }

    fn run(&self) {
        info!(target: SCHEDULER_TARGET, "scheduler waiter active");
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return;
            }
            let Some((&key, _)) = state.queue.iter().next() else {
                state = self.wait(state);
                continue;
            };
            let now = Instant::now();
            let (due, _) = key;
            if due > now {
                let timeout = due - now;
                state = self
                    .shared
                    .wakeup
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(|_| panic!("scheduler mutex poisoned"))
                    .0;
                // The head may have changed while waiting; re-evaluate.
                continue;
            }
            let entry = match state.queue.remove(&key) {
                Some(entry) => entry,
                None => continue,
            };
            state.slots.remove(&entry.slot);
            drop(state);
            self.submit(entry);
            state = self.lock();
        }
    }

    fn submit(&self, entry: Entry) {
        debug!(
            target: SCHEDULER_TARGET,
            request_id = entry.request_id,
            slot = entry.slot,
            command = entry.command.name(),
            "deferred command due"
        );
        let work = Work {
            request_id: entry.request_id,
            command: entry.command,
            parameters: entry.parameters,
            profiler: Profiler::new(),
            sink: ResultSink::Background,
        };
        if self.shared.pool.send(work).is_err() {
            warn!(
                target: SCHEDULER_TARGET,
                request_id = entry.request_id,
                "worker pool mailbox closed; dropping deferred command"
            );
        }
    }

    fn wait<'a>(&'a self, state: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.shared
            .wakeup
            .wait(state)
            .unwrap_or_else(|_| panic!("scheduler mutex poisoned"))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|_| panic!("scheduler mutex poisoned"))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Scheduler")
            .field("capacity", &self.shared.capacity)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::command::{
        Action, ActionError, CommandBuilder, CommandTree, Invocation, ParamKind, ParamSpec,
    };

    struct Tag;

    impl Action for Tag {
        fn spec(&self) -> ParamSpec {
            ParamSpec::new().param("tag", ParamKind::Text, "identifying tag")
        }

        fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError> {
            Ok(json!(invocation.parameters.text("tag").unwrap_or_default()))
        }
    }

    fn tagged_node() -> Arc<CommandNode> {
        let tree = CommandTree::build(
            CommandBuilder::new("root")
                .child(CommandBuilder::new("tag").description("tag echo").action(Tag)),
        )
        .expect("valid tree");
        tree.resolve(&["tag".to_owned()]).node
    }

    fn tag_params(tag: &str) -> Parameters {
        Parameters::from_wire(
            [("tag".to_owned(), json!(tag))]
                .into_iter()
                .collect(),
        )
    }

    fn received_tags(pool: &Mailbox<Work>, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                let work = pool.recv().expect("due work item");
                work.parameters.text("tag").expect("tag parameter")
            })
            .collect()
    }

    #[test]
    fn due_entries_fire_in_due_order_not_insertion_order() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(8, pool.clone()).expect("start scheduler");
        let node = tagged_node();
        let base = Instant::now();

        for (delay_ms, tag) in [(50_u64, "late"), (10, "early"), (30, "middle")] {
            scheduler
                .add(
                    base + Duration::from_millis(delay_ms),
                    Arc::clone(&node),
                    tag_params(tag),
                    1,
                )
                .expect("add entry");
        }

        assert_eq!(received_tags(&pool, 3), vec!["early", "middle", "late"]);
        scheduler.shutdown();
        waiter.join().expect("join waiter");
    }

    #[test]
    fn earlier_insertion_preempts_a_pending_wait() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(8, pool.clone()).expect("start scheduler");
        let node = tagged_node();
        let base = Instant::now();

        scheduler
            .add(base + Duration::from_secs(60), Arc::clone(&node), tag_params("distant"), 1)
            .expect("add distant entry");
        scheduler
            .add(base + Duration::from_millis(10), node, tag_params("near"), 2)
            .expect("add near entry");

        let started = Instant::now();
        assert_eq!(received_tags(&pool, 1), vec!["near"]);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "waiter must re-evaluate before the distant deadline"
        );
        scheduler.shutdown();
        waiter.join().expect("join waiter");
    }

    #[test]
    fn ties_fire_in_insertion_order() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(8, pool.clone()).expect("start scheduler");
        let node = tagged_node();
        let due = Instant::now() + Duration::from_millis(15);

        for tag in ["first", "second", "third"] {
            scheduler
                .add(due, Arc::clone(&node), tag_params(tag), 1)
                .expect("add entry");
        }

        assert_eq!(received_tags(&pool, 3), vec!["first", "second", "third"]);
        scheduler.shutdown();
        waiter.join().expect("join waiter");
    }

    #[test]
    fn slots_are_lowest_free_and_reused_after_firing() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(4, pool.clone()).expect("start scheduler");
        let node = tagged_node();

        let soon = Instant::now() + Duration::from_millis(10);
        let far = Instant::now() + Duration::from_secs(60);
        let first = scheduler
            .add(soon, Arc::clone(&node), tag_params("soon"), 1)
            .expect("add soon");
        let second = scheduler
            .add(far, Arc::clone(&node), tag_params("far"), 2)
            .expect("add far");
        assert_eq!(first, 0);
        assert_eq!(second, 1);

        let _ = received_tags(&pool, 1);
        // Give the waiter a moment to release the fired slot.
        let deadline = Instant::now() + Duration::from_secs(2);
        while scheduler.pending() > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let reused = scheduler
            .add(far, node, tag_params("reuse"), 3)
            .expect("add reuse");
        assert_eq!(reused, 0, "fired slot is the lowest free slot again");
        scheduler.shutdown();
        waiter.join().expect("join waiter");
    }

    #[test]
    fn capacity_exhaustion_is_an_error_not_a_drop() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(2, pool).expect("start scheduler");
        let node = tagged_node();
        let far = Instant::now() + Duration::from_secs(60);

        scheduler
            .add(far, Arc::clone(&node), Parameters::empty(), 1)
            .expect("first slot");
        scheduler
            .add(far, Arc::clone(&node), Parameters::empty(), 2)
            .expect("second slot");
        let error = scheduler
            .add(far, node, Parameters::empty(), 3)
            .expect_err("third must fail");
        assert!(matches!(error, SchedulerError::CapacityExhausted { capacity: 2 }));
        scheduler.shutdown();
        waiter.join().expect("join waiter");
    }

    #[test]
    fn add_after_shutdown_is_refused() {
        let pool = Mailbox::new();
        let (scheduler, waiter) = Scheduler::start(2, pool).expect("start scheduler");
        scheduler.shutdown();
        waiter.join().expect("join waiter");
        let error = scheduler
            .add(Instant::now(), tagged_node(), Parameters::empty(), 1)
            .expect_err("should refuse");
        assert!(matches!(error, SchedulerError::ShutDown));
    }
}
