//! Command-line parsing and request construction.

use std::collections::BTreeMap;

use clap::Parser;
use serde_json::Value;

use errand_config::{default_socket_path, SocketPath};
use errand_proto::RequestEnvelope;

use crate::errors::AppError;

/// Sends a command to the errand daemon.
#[derive(Debug, Parser)]
#[command(name = "errand", version, about)]
pub struct Args {
    /// Unix socket path of the daemon.
    #[arg(long)]
    pub socket: Option<String>,

    /// Request timing diagnostics and print the full response envelope.
    #[arg(short, long)]
    pub verbose: bool,

    /// Command path, e.g. `volume` or `display brightness`.
    #[arg(value_name = "COMMAND")]
    pub command: Vec<String>,

    /// Parameters after `--`, as `name:value` pairs; a bare `name` is a
    /// valueless flag.
    #[arg(last = true, value_name = "PARAM")]
    pub params: Vec<String>,
}

impl Args {
    /// The socket to connect to.
    #[must_use]
    pub fn socket_path(&self) -> SocketPath {
        self.socket
            .as_deref()
            .map_or_else(default_socket_path, SocketPath::new)
    }

    /// Builds the wire request from the parsed words.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DuplicateParameter`] when the same name appears
    /// twice after `--`.
    pub fn request(&self) -> Result<RequestEnvelope, AppError> {
        let mut parameters = BTreeMap::new();
        for word in &self.params {
            let (name, value) = split_parameter(word);
            if parameters
                .insert(name.to_owned(), Value::String(value.to_owned()))
                .is_some()
            {
                return Err(AppError::DuplicateParameter {
                    name: name.to_owned(),
                });
            }
        }
        Ok(RequestEnvelope {
            verbose: self.verbose,
            command: self.command.clone(),
            parameters,
        })
    }
}

/// Splits `name:value`; a bare `name` becomes an empty value, marking a
/// flag. Only the first colon splits, so values may contain colons.
fn split_parameter(word: &str) -> (&str, &str) {
    match word.split_once(':') {
        Some((name, value)) => (name, value),
        None => (word, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(words: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("errand").chain(words.iter().copied()))
            .expect("parse args")
    }

    #[test]
    fn command_words_and_parameters_are_split_at_the_separator() {
        let args = parse(&["volume", "--", "incr:5"]);
        let request = args.request().expect("build request");
        assert_eq!(request.command, vec!["volume"]);
        assert_eq!(request.parameters.get("incr"), Some(&json!("5")));
        assert!(!request.verbose);
    }

    #[test]
    fn bare_parameter_becomes_a_flag() {
        let args = parse(&["volume", "--", "mute"]);
        let request = args.request().expect("build request");
        assert_eq!(request.parameters.get("mute"), Some(&json!("")));
    }

    #[rstest]
    #[case::plain("incr:5", "incr", "5")]
    #[case::colon_in_value("at:12:30", "at", "12:30")]
    #[case::bare_flag("mute", "mute", "")]
    #[case::empty_value("set:", "set", "")]
    fn parameter_words_split_on_the_first_colon(
        #[case] word: &str,
        #[case] name: &str,
        #[case] value: &str,
    ) {
        assert_eq!(split_parameter(word), (name, value));
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let args = parse(&["volume", "--", "incr:5", "incr:7"]);
        let error = args.request().expect_err("must reject duplicate");
        assert!(matches!(error, AppError::DuplicateParameter { ref name } if name == "incr"));
    }

    #[test]
    fn no_separator_means_no_parameters() {
        let args = parse(&["info", "stats"]);
        let request = args.request().expect("build request");
        assert_eq!(request.command, vec!["info", "stats"]);
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn verbose_flag_is_forwarded() {
        let args = parse(&["-v", "volume", "--", "incr:5"]);
        let request = args.request().expect("build request");
        assert!(request.verbose);
    }
}
