//! The worker pool: validation and execution of resolved commands.
//!
//! All workers drain one shared mailbox, so an idle worker picks up the next
//! item regardless of which client it came from. Action panics are contained
//! per work item; a panicking action fails that request and the worker moves
//! on.

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use errand_proto::{CODE_FAILURE, CODE_OK};

use crate::command::Invocation;
use crate::mailbox::{spawn_actor, Mailbox};
use crate::responder::ResponderMsg;
use crate::work::{ResultSink, Work};

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Handle to the pool's worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers draining `work`, delivering client results to
    /// `responder`.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS refuses to spawn a worker thread.
    pub fn start(
        size: usize,
        work: Mailbox<Work>,
        responder: Mailbox<ResponderMsg>,
    ) -> std::io::Result<Self> {
        let workers = (0..size)
            .map(|index| {
                let name = format!("worker-{index}");
                let worker = name.clone();
                let responder = responder.clone();
                spawn_actor(&name, work.clone(), move |item| {
                    process(&worker, item, &responder);
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { workers })
    }

    /// Waits for every worker to exit. Call after closing the work mailbox.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                error!(target: POOL_TARGET, "worker thread panicked outside a work item");
            }
        }
    }
}

fn process(worker: &str, mut work: Work, responder: &Mailbox<ResponderMsg>) {
    work.profiler.event("received by worker");
    let (value, code) = run(&mut work);

    match work.sink {
        ResultSink::Client { request } => {
            let message = ResponderMsg {
                request,
                value,
                code,
                work_profiler: work.profiler,
                worker: worker.to_owned(),
            };
            if responder.send(message).is_err() {
                warn!(
                    target: POOL_TARGET,
                    request_id = work.request_id,
                    "responder mailbox closed; dropping result"
                );
            }
        }
        ResultSink::Background => {
            info!(
                target: POOL_TARGET,
                request_id = work.request_id,
                command = work.command.name(),
                code,
                result = %value,
                "deferred command finished"
            );
        }
    }
}

fn run(work: &mut Work) -> (Value, i64) {
    let Some(action) = work.command.action() else {
        return (json!(work.command.help()), CODE_FAILURE);
    };

    if let Some(reason) = action.validate(&work.parameters) {
        return (json!(format!("{reason}\n{}", action.help())), CODE_FAILURE);
    }

    let invocation = Invocation {
        request_id: work.request_id,
        parameters: &work.parameters,
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| action.execute(&invocation)));
    work.profiler.event("executed");

    match outcome {
        Ok(Ok(value)) => (value, CODE_OK),
        Ok(Err(error)) => (json!(error.to_string()), CODE_FAILURE),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                target: POOL_TARGET,
                request_id = work.request_id,
                command = work.command.name(),
                message,
                "action panicked"
            );
            (json!(format!("command panicked: {message}")), CODE_FAILURE)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "opaque panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::command::{
        Action, ActionError, CommandBuilder, CommandTree, ParamKind, ParamSpec, Parameters,
    };
    use crate::profiler::Profiler;

    struct Doubler;

    impl Action for Doubler {
        fn spec(&self) -> ParamSpec {
            ParamSpec::new()
                .grouped_param("value", ParamKind::Integer, "input", "value to double")
                .group("input", 1, Some(1))
        }

        fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError> {
            let value = invocation
                .parameters
                .integer("value")
                .ok_or_else(|| ActionError::new("missing value"))?;
            Ok(json!(value * 2))
        }
    }

    struct Panicker;

    impl Action for Panicker {
        fn spec(&self) -> ParamSpec {
            ParamSpec::new()
        }

        fn execute(&self, _invocation: &Invocation<'_>) -> Result<Value, ActionError> {
            panic!("boom");
        }
    }

    fn terminal(action: impl Action + 'static) -> std::sync::Arc<crate::command::CommandNode> {
        let tree = CommandTree::build(
            CommandBuilder::new("root").child(
                CommandBuilder::new("cmd")
                    .description("under test")
                    .action(action),
            ),
        )
        .expect("valid tree");
        tree.resolve(&["cmd".to_owned()]).node
    }

    fn background_work(
        node: std::sync::Arc<crate::command::CommandNode>,
        parameters: Parameters,
    ) -> Work {
        Work {
            request_id: 1,
            command: node,
            parameters,
            profiler: Profiler::new(),
            sink: ResultSink::Background,
        }
    }

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        Parameters::from_wire(
            pairs
                .iter()
                .map(|(name, value)| ((*name).to_owned(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn valid_parameters_execute_and_succeed() {
        let mut work = background_work(terminal(Doubler), params(&[("value", json!("21"))]));
        let (value, code) = run(&mut work);
        assert_eq!(value, json!(42));
        assert_eq!(code, CODE_OK);
    }

    #[test]
    fn validation_failure_carries_reason_and_help() {
        let mut work = background_work(
            terminal(Doubler),
            params(&[("value", json!("loud"))]),
        );
        let (value, code) = run(&mut work);
        assert_eq!(code, CODE_FAILURE);
        let text = value.as_str().expect("failure text");
        assert!(text.contains("'value'"), "reason names the parameter");
        assert!(text.contains("Arguments:"), "help text is appended");
    }

    #[test]
    fn action_error_becomes_failure_text() {
        struct Failer;
        impl Action for Failer {
            fn spec(&self) -> ParamSpec {
                ParamSpec::new()
            }
            fn execute(&self, _invocation: &Invocation<'_>) -> Result<Value, ActionError> {
                Err(ActionError::new("device unavailable"))
            }
        }
        let mut work = background_work(terminal(Failer), Parameters::empty());
        let (value, code) = run(&mut work);
        assert_eq!(value, json!("device unavailable"));
        assert_eq!(code, CODE_FAILURE);
    }

    #[test]
    fn panicking_action_is_contained() {
        let mut work = background_work(terminal(Panicker), Parameters::empty());
        let (value, code) = run(&mut work);
        assert_eq!(code, CODE_FAILURE);
        assert!(value.as_str().expect("text").contains("boom"));
    }

    #[test]
    fn pool_survives_a_panicking_item_and_keeps_serving() {
        struct Counter {
            hits: Arc<AtomicUsize>,
        }
        impl Action for Counter {
            fn spec(&self) -> ParamSpec {
                ParamSpec::new()
            }
            fn execute(&self, _invocation: &Invocation<'_>) -> Result<Value, ActionError> {
                self.hits.fetch_add(1, Ordering::SeqCst);
                Ok(json!("ok"))
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let counting = terminal(Counter {
            hits: Arc::clone(&hits),
        });
        let panicking = terminal(Panicker);

        let work = Mailbox::new();
        let responder = Mailbox::new();
        let pool = WorkerPool::start(1, work.clone(), responder).expect("start pool");

        work.send(background_work(panicking, Parameters::empty()))
            .expect("send panicking item");
        work.send(background_work(counting, Parameters::empty()))
            .expect("send counting item");
        work.close();
        pool.join();

        assert_eq!(hits.load(Ordering::SeqCst), 1, "pool kept serving");
    }
}
