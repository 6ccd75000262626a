//! Deferred execution of another command.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde_json::{json, Value};

use crate::command::{
    Action, ActionError, CommandTree, Invocation, ParamKind, ParamSpec, Parameters,
};
use crate::scheduler::Scheduler;

/// The `schedule add` command: resolve and validate a target command now,
/// run it after a delay.
///
/// The command tree is handed over through a cell because the tree cannot
/// exist before its own nodes do; [`crate::actions::default_tree`] populates
/// the cell right after building.
pub struct ScheduleAddAction {
    scheduler: Scheduler,
    tree: Arc<OnceCell<Arc<CommandTree>>>,
}

impl ScheduleAddAction {
    /// Creates the action; `tree` must be populated before the first request
    /// arrives.
    #[must_use]
    pub fn new(scheduler: Scheduler, tree: Arc<OnceCell<Arc<CommandTree>>>) -> Self {
        Self { scheduler, tree }
    }

    fn tree(&self) -> Result<&Arc<CommandTree>, ActionError> {
        self.tree
            .get()
            .ok_or_else(|| ActionError::new("command tree is not available yet"))
    }
}

impl Action for ScheduleAddAction {
    fn spec(&self) -> ParamSpec {
        ParamSpec::new()
            .grouped_param("command", ParamKind::Raw, "payload", "target command tokens")
            .grouped_param(
                "parameters",
                ParamKind::Raw,
                "payload",
                "parameters for the target command",
            )
            .grouped_param("in", ParamKind::Integer, "when", "delay in seconds")
            .group("payload", 2, Some(2))
            .group("when", 1, Some(1))
    }

    fn validate(&self, parameters: &Parameters) -> Option<String> {
        let mut reasons = Vec::new();
        if let Some(reason) = self.spec().fail_reason(parameters) {
            reasons.push(reason);
        }
        if parameters.contains("command") && target_tokens(parameters).is_none() {
            reasons.push("parameter 'command' must be an array of strings".to_owned());
        }
        if parameters.contains("parameters") && target_parameters(parameters).is_none() {
            reasons.push("parameter 'parameters' must be an object".to_owned());
        }
        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("\n"))
        }
    }

    fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError> {
        let tokens = target_tokens(invocation.parameters)
            .ok_or_else(|| ActionError::new("parameter 'command' must be an array of strings"))?;
        let target_params = target_parameters(invocation.parameters)
            .ok_or_else(|| ActionError::new("parameter 'parameters' must be an object"))?;
        let delay = invocation
            .parameters
            .integer("in")
            .filter(|seconds| *seconds >= 0)
            .ok_or_else(|| ActionError::new("parameter 'in' must be a non-negative integer"))?;

        let tree = self.tree()?;
        let resolution = tree.resolve(&tokens);
        if resolution.consumed < tokens.len() || resolution.node.action().is_none() {
            return Err(ActionError::new(format!(
                "cannot schedule '{}': not a runnable command\n{}",
                tokens.join(" "),
                resolution.node.help()
            )));
        }
        let action = resolution
            .node
            .action()
            .ok_or_else(|| ActionError::new("resolved command has no action"))?;
        if let Some(reason) = action.validate(&target_params) {
            return Err(ActionError::new(format!(
                "scheduled command is invalid:\n{reason}"
            )));
        }

        let seconds = u64::try_from(delay)
            .map_err(|_| ActionError::new("parameter 'in' is out of range"))?;
        let due = Instant::now() + Duration::from_secs(seconds);
        let slot = self
            .scheduler
            .add(due, resolution.node, target_params, invocation.request_id)
            .map_err(|error| ActionError::new(error.to_string()))?;
        Ok(json!(slot))
    }
}

fn target_tokens(parameters: &Parameters) -> Option<Vec<String>> {
    let Value::Array(items) = parameters.raw("command")? else {
        return None;
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect()
}

fn target_parameters(parameters: &Parameters) -> Option<Parameters> {
    let Value::Object(map) = parameters.raw("parameters")? else {
        return None;
    };
    let values: BTreeMap<String, Value> = map
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Some(Parameters::from_wire(values))
}
