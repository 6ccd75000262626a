//! The command tree: a registry of named, aliasable command nodes with
//! pluggable actions at the leaves.
//!
//! The tree is built once at startup from a [`CommandBuilder`] hierarchy and
//! is immutable afterwards, so resolution never takes a lock. Structural
//! rules are enforced at build time: alias uniqueness among siblings, and the
//! children-or-action exclusivity of every node.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

mod params;

pub use params::{ParamKind, ParamSpec, Parameters};

/// The validated parameters and request identity handed to an action.
#[derive(Debug)]
pub struct Invocation<'a> {
    /// Identifier of the request being served, for correlation in logs.
    pub request_id: u64,
    /// Parameters, already checked against the action's [`ParamSpec`].
    pub parameters: &'a Parameters,
}

/// Failure produced by an action at execution time.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    /// Wraps a failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// A unit of executable behavior hung off a terminal command node.
///
/// Implementations declare their parameters once via [`Action::spec`];
/// validation and usage text derive from that declaration unless overridden.
pub trait Action: Send + Sync {
    /// The parameter declaration this action accepts.
    fn spec(&self) -> ParamSpec;

    /// Runs the action against validated parameters.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] carrying a client-facing message.
    fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError>;

    /// Checks `parameters` against the declaration, returning every failure
    /// joined line by line.
    fn validate(&self, parameters: &Parameters) -> Option<String> {
        self.spec().fail_reason(parameters)
    }

    /// Usage text for this action's parameters.
    fn help(&self) -> String {
        self.spec().help()
    }
}

/// Structural error detected while freezing a builder into a tree.
#[derive(Debug, Error)]
pub enum CommandTreeError {
    /// Two siblings answer to the same name or alias.
    #[error("duplicate name or alias '{alias}' under command '{parent}'")]
    DuplicateAlias { parent: String, alias: String },
    /// A node carries both children and an action.
    #[error("command '{name}' has both subcommands and an action")]
    ActionWithChildren { name: String },
    /// A node carries neither children nor an action.
    #[error("command '{name}' has neither subcommands nor an action")]
    Useless { name: String },
}

/// Mutable command description, frozen into a [`CommandNode`] at build time.
pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    description: String,
    action: Option<Box<dyn Action>>,
    children: Vec<CommandBuilder>,
}

impl CommandBuilder {
    /// Starts a command named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            aliases: Vec::new(),
            description: String::new(),
            action: None,
            children: Vec::new(),
        }
    }

    /// Adds an alternative name.
    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_owned());
        self
    }

    /// Sets the one-line description shown in help.
    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Attaches the action making this a terminal command.
    #[must_use]
    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Adds a subcommand.
    #[must_use]
    pub fn child(mut self, child: CommandBuilder) -> Self {
        self.children.push(child);
        self
    }

    fn freeze(self) -> Result<Arc<CommandNode>, CommandTreeError> {
        if self.action.is_some() && !self.children.is_empty() {
            return Err(CommandTreeError::ActionWithChildren { name: self.name });
        }
        if self.action.is_none() && self.children.is_empty() {
            return Err(CommandTreeError::Useless { name: self.name });
        }

        let mut seen = HashSet::new();
        for child in &self.children {
            for alias in child.all_names() {
                if !seen.insert(alias.to_owned()) {
                    return Err(CommandTreeError::DuplicateAlias {
                        parent: self.name.clone(),
                        alias: alias.to_owned(),
                    });
                }
            }
        }

        let children = self
            .children
            .into_iter()
            .map(CommandBuilder::freeze)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(CommandNode {
            name: self.name,
            aliases: self.aliases,
            description: self.description,
            action: self.action,
            children,
        }))
    }

    fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Debug for CommandBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandBuilder")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .finish()
    }
}

/// A frozen node in the command tree.
///
/// Terminal nodes carry an action; interior nodes carry children. The two are
/// mutually exclusive, enforced at build time.
pub struct CommandNode {
    name: String,
    aliases: Vec<String>,
    description: String,
    action: Option<Box<dyn Action>>,
    children: Vec<Arc<CommandNode>>,
}

impl CommandNode {
    /// The node's primary name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attached action, if this is a terminal node.
    #[must_use]
    pub fn action(&self) -> Option<&dyn Action> {
        self.action.as_deref()
    }

    /// True when `token` matches the node's name or any alias.
    #[must_use]
    pub fn answers_to(&self, token: &str) -> bool {
        self.name == token || self.aliases.iter().any(|alias| alias == token)
    }

    /// Renders the help text for this node: description, aliases, and either
    /// the action's usage or the subcommand listing.
    #[must_use]
    pub fn help(&self) -> String {
        let mut text = format!("{}: {}\n", self.name, self.description);
        if !self.aliases.is_empty() {
            text.push_str(&format!("Aliases: {}\n", self.aliases.join(", ")));
        }
        if let Some(action) = &self.action {
            text.push_str(&action.help());
        } else {
            text.push_str("Subcommands:\n");
            for child in &self.children {
                text.push_str(&format!("  {}: {}\n", child.name, child.description));
            }
        }
        text
    }

    fn find_child(&self, token: &str) -> Option<&Arc<CommandNode>> {
        self.children.iter().find(|child| child.answers_to(token))
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandNode")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("terminal", &self.action.is_some())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Result of walking the tree along a token list.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The deepest node reached.
    pub node: Arc<CommandNode>,
    /// How many tokens were consumed reaching it.
    pub consumed: usize,
}

/// Immutable, shareable command tree.
#[derive(Debug, Clone)]
pub struct CommandTree {
    root: Arc<CommandNode>,
}

impl CommandTree {
    /// Freezes a builder hierarchy into a tree, validating its structure.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandTreeError`] describing the first structural rule
    /// violated.
    pub fn build(root: CommandBuilder) -> Result<Self, CommandTreeError> {
        Ok(Self {
            root: root.freeze()?,
        })
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &Arc<CommandNode> {
        &self.root
    }

    /// Walks the tree along `tokens`, stopping at the first token no child
    /// answers to. Never fails: an empty or unmatched prefix resolves to the
    /// deepest node reached, with `consumed` saying how far the walk got.
    #[must_use]
    pub fn resolve(&self, tokens: &[String]) -> Resolution {
        let mut node = &self.root;
        let mut consumed = 0;
        for token in tokens {
            match node.find_child(token) {
                Some(child) => {
                    node = child;
                    consumed += 1;
                }
                None => break,
            }
        }
        Resolution {
            node: Arc::clone(node),
            consumed,
        }
    }
}
