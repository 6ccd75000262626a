//! Request parameters and their declarative validation.
//!
//! A [`ParamSpec`] describes what an action accepts: named parameters with an
//! expected kind, optional membership in named groups, and per-group
//! cardinality bounds. Validation is exhaustive: every problem found in one
//! pass is reported, joined line by line, so the caller sees the full list at
//! once. The same declarations render the action's usage text.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// Immutable name-to-value mapping built once per request from the wire
/// payload.
///
/// Values are usually strings; typed accessors coerce from strings first and
/// fall back to native JSON types, so clients may send either.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    /// Wraps a raw wire mapping.
    #[must_use]
    pub fn from_wire(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// An empty parameter set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the parameter is present, regardless of its value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over the present parameter names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The raw JSON value, for pass-through parameters.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The value as an integer: a parseable string or a JSON integer.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            Value::String(text) => text.trim().parse().ok(),
            Value::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    /// The value as text: a string, or a number/bool rendered as text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// True when the parameter is present as a valueless flag (empty string
    /// or JSON null).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            _ => false,
        }
    }

    /// Number of present parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no parameters are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Expected shape of a declared parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// An integer, sent as a string or a JSON number.
    Integer,
    /// Free-form text.
    Text,
    /// Presence-only: the value must be empty.
    Flag,
    /// Arbitrary JSON, passed through untouched.
    Raw,
}

impl ParamKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Integer => "<int>",
            Self::Text => "<text>",
            Self::Flag => "",
            Self::Raw => "<json>",
        }
    }
}

#[derive(Debug, Clone)]
struct ParamDecl {
    name: String,
    kind: ParamKind,
    groups: Vec<String>,
    description: String,
}

#[derive(Debug, Clone)]
struct GroupRule {
    name: String,
    min: usize,
    /// `None` means unbounded.
    max: Option<usize>,
}

/// Declarative parameter specification: builder, validator, and help
/// renderer.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    params: Vec<ParamDecl>,
    groups: Vec<GroupRule>,
}

impl ParamSpec {
    /// Starts an empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter outside any group.
    #[must_use]
    pub fn param(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.push_param(name, kind, &[], description)
    }

    /// Declares a parameter belonging to one group.
    #[must_use]
    pub fn grouped_param(self, name: &str, kind: ParamKind, group: &str, description: &str) -> Self {
        self.push_param(name, kind, &[group], description)
    }

    fn push_param(mut self, name: &str, kind: ParamKind, groups: &[&str], description: &str) -> Self {
        self.params.push(ParamDecl {
            name: name.to_owned(),
            kind,
            groups: groups.iter().map(|group| (*group).to_owned()).collect(),
            description: description.to_owned(),
        });
        self
    }

    /// Constrains how many of a group's members may be present.
    ///
    /// `max` of `None` means unbounded.
    #[must_use]
    pub fn group(mut self, name: &str, min: usize, max: Option<usize>) -> Self {
        self.groups.push(GroupRule {
            name: name.to_owned(),
            min,
            max,
        });
        self
    }

    /// Validates `parameters`, returning every failure joined line by line,
    /// or `None` when the parameters satisfy the specification.
    ///
    /// Group counting considers only parameters that are present *and*
    /// well-typed, so a mistyped member produces exactly one reason.
    #[must_use]
    pub fn fail_reason(&self, parameters: &Parameters) -> Option<String> {
        let mut reasons = Vec::new();
        let mut group_counts: HashMap<&str, usize> = HashMap::new();

        for decl in &self.params {
            if !parameters.contains(&decl.name) {
                continue;
            }
            match check_kind(decl, parameters) {
                Some(reason) => reasons.push(reason),
                None => {
                    for group in &decl.groups {
                        *group_counts.entry(group.as_str()).or_insert(0) += 1;
                    }
                }
            }
        }

        for rule in &self.groups {
            let members = self.group_members(&rule.name).join(", ");
            let count = group_counts.get(rule.name.as_str()).copied().unwrap_or(0);
            if count < rule.min {
                reasons.push(format!(
                    "group '{}' requires at least {} of: {members}",
                    rule.name, rule.min
                ));
            }
            if let Some(max) = rule.max {
                if count > max {
                    reasons.push(format!(
                        "group '{}' allows at most {max} of: {members}",
                        rule.name
                    ));
                }
            }
        }

        for name in parameters.names() {
            if !self.params.iter().any(|decl| decl.name == name) {
                reasons.push(format!("unexpected parameter '{name}'"));
            }
        }

        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("\n"))
        }
    }

    /// Renders the declarations as usage text. Pure function of the
    /// declarations: repeated calls yield identical text.
    #[must_use]
    pub fn help(&self) -> String {
        let mut text = String::new();
        if !self.params.is_empty() {
            text.push_str("Arguments:\n");
            for decl in &self.params {
                let shape = decl.kind.describe();
                if shape.is_empty() {
                    text.push_str(&format!("  {}: {}\n", decl.name, decl.description));
                } else {
                    text.push_str(&format!("  {}:{shape}: {}\n", decl.name, decl.description));
                }
            }
        }
        for rule in &self.groups {
            let members = self.group_members(&rule.name).join(", ");
            text.push_str(&format!("{}\n", describe_rule(rule, &members)));
        }
        text
    }

    fn group_members(&self, group: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|decl| decl.groups.iter().any(|name| name == group))
            .map(|decl| decl.name.as_str())
            .collect()
    }
}

fn check_kind(decl: &ParamDecl, parameters: &Parameters) -> Option<String> {
    match decl.kind {
        ParamKind::Integer => {
            if parameters.integer(&decl.name).is_none() {
                return Some(format!(
                    "parameter '{}' value '{}' is not an integer",
                    decl.name,
                    render(parameters.raw(&decl.name))
                ));
            }
        }
        ParamKind::Text => {
            if parameters.text(&decl.name).is_none() {
                return Some(format!("parameter '{}' expects a text value", decl.name));
            }
        }
        ParamKind::Flag => {
            if !parameters.flag(&decl.name) {
                return Some(format!(
                    "parameter '{}' expects no value (got '{}')",
                    decl.name,
                    render(parameters.raw(&decl.name))
                ));
            }
        }
        ParamKind::Raw => {}
    }
    None
}

fn describe_rule(rule: &GroupRule, members: &str) -> String {
    match (rule.min, rule.max) {
        (1, Some(1)) => format!("Must have one of: {members}"),
        (min, Some(max)) if min == max => format!("Must have exactly {min} of: {members}"),
        (0, Some(max)) => format!("May have at most {max} of: {members}"),
        (min, None) => format!("Must have at least {min} of: {members}"),
        (min, Some(max)) => format!("Must have between {min} and {max} of: {members}"),
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn wire(pairs: &[(&str, Value)]) -> Parameters {
        Parameters::from_wire(
            pairs
                .iter()
                .map(|(name, value)| ((*name).to_owned(), value.clone()))
                .collect(),
        )
    }

    fn volume_spec() -> ParamSpec {
        ParamSpec::new()
            .grouped_param("set", ParamKind::Integer, "operations", "set volume")
            .grouped_param("incr", ParamKind::Integer, "operations", "change volume")
            .grouped_param("mute", ParamKind::Flag, "operations", "toggle mute")
            .group("operations", 1, Some(1))
    }

    #[test]
    fn accepts_a_single_operation() {
        let params = wire(&[("incr", json!("5"))]);
        assert_eq!(volume_spec().fail_reason(&params), None);
    }

    #[test]
    fn integer_accessor_coerces_strings_first() {
        let params = wire(&[("set", json!("42")), ("incr", json!(7))]);
        assert_eq!(params.integer("set"), Some(42));
        assert_eq!(params.integer("incr"), Some(7));
        assert_eq!(params.integer("missing"), None);
    }

    #[test]
    fn rejects_conflicting_operations_naming_both() {
        let params = wire(&[("incr", json!("5")), ("set", json!("10"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("at most 1"));
        assert!(reason.contains("set"));
        assert!(reason.contains("incr"));
    }

    #[test]
    fn rejects_missing_required_operation() {
        let reason = volume_spec()
            .fail_reason(&Parameters::empty())
            .expect("should fail");
        assert!(reason.contains("at least 1"));
        assert!(reason.contains("mute"));
    }

    #[test]
    fn reports_unparseable_integer_with_the_bad_value() {
        let params = wire(&[("set", json!("loud"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("'set'"));
        assert!(reason.contains("'loud'"));
    }

    #[test]
    fn flag_with_a_value_is_rejected() {
        let params = wire(&[("mute", json!("yes"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("'mute'"));
        assert!(reason.contains("expects no value"));
    }

    #[rstest]
    #[case::empty_string(json!(""), true)]
    #[case::null(Value::Null, true)]
    #[case::text(json!("x"), false)]
    #[case::number(json!(1), false)]
    fn flag_accepts_only_valueless_shapes(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(wire(&[("mute", value)]).flag("mute"), expected);
    }

    #[test]
    fn unexpected_parameter_is_reported() {
        let params = wire(&[("incr", json!("5")), ("bogus", json!("1"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("unexpected parameter 'bogus'"));
    }

    #[test]
    fn validation_accumulates_all_failures() {
        // One group under-filled, one unexpected parameter: both reported.
        let params = wire(&[("bogus", json!("1"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("at least 1"));
        assert!(reason.contains("unexpected parameter 'bogus'"));
        assert_eq!(reason.lines().count(), 2);
    }

    #[test]
    fn mistyped_group_member_does_not_count_toward_the_group() {
        // 'set' is present but mistyped, so the group is still under-filled.
        let params = wire(&[("set", json!("loud"))]);
        let reason = volume_spec().fail_reason(&params).expect("should fail");
        assert!(reason.contains("is not an integer"));
        assert!(reason.contains("at least 1"));
    }

    #[test]
    fn raw_parameters_accept_any_json() {
        let spec = ParamSpec::new().param("payload", ParamKind::Raw, "raw payload");
        let params = wire(&[("payload", json!({"nested": [1, 2]}))]);
        assert_eq!(spec.fail_reason(&params), None);
    }

    #[test]
    fn help_lists_parameters_and_group_rules() {
        let help = volume_spec().help();
        assert!(help.contains("set:<int>"));
        assert!(help.contains("mute:"));
        assert!(help.contains("Must have one of: set, incr, mute"));
    }

    #[test]
    fn help_is_idempotent() {
        let spec = volume_spec();
        assert_eq!(spec.help(), spec.help());
    }
}
