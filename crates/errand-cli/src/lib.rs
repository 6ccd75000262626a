//! The `errand` client: builds a request from command-line words, sends it
//! over the daemon socket, and renders the response.
//!
//! Words before `--` are the command path; words after are `name:value`
//! parameters, with a bare `name` meaning a valueless flag.

use std::io::Write;

pub mod cli;
pub mod errors;
pub mod transport;

pub use cli::Args;
pub use errors::AppError;

use errand_proto::framing::{read_frame, write_frame};
use errand_proto::ResponseEnvelope;

/// Exit status derived from a daemon response code.
///
/// The code is folded into the unsigned byte a process can actually report,
/// so the daemon's `-1` failure code surfaces as exit status 255.
#[must_use]
pub fn exit_status(code: i64) -> u8 {
    u8::try_from(code.rem_euclid(256)).unwrap_or(u8::MAX)
}

/// Sends `args`' request to the daemon and renders the response to `out`.
///
/// Returns the daemon's response code.
///
/// # Errors
///
/// Returns an [`AppError`] when the daemon is unreachable, the exchange
/// fails, or the response does not parse.
pub fn run(args: &Args, out: &mut impl Write) -> Result<i64, AppError> {
    let envelope = args.request()?;
    let payload = serde_json::to_vec(&envelope).map_err(AppError::Serialize)?;

    let mut connection = transport::connect(&args.socket_path())?;
    write_frame(&mut connection, &payload).map_err(AppError::Send)?;
    let response_bytes = read_frame(&mut connection).map_err(AppError::Receive)?;
    let response: ResponseEnvelope =
        serde_json::from_slice(&response_bytes).map_err(AppError::Parse)?;

    render(&response, args.verbose, out).map_err(AppError::Output)?;
    Ok(response.code)
}

/// Renders the response: bare strings print unquoted, everything else (and
/// every verbose response) prints as pretty JSON.
fn render(
    response: &ResponseEnvelope,
    verbose: bool,
    out: &mut impl Write,
) -> Result<(), std::io::Error> {
    if verbose {
        let rendered = serde_json::to_string_pretty(response)
            .unwrap_or_else(|_| response.response.to_string());
        return writeln!(out, "{rendered}");
    }
    match response.response.as_str() {
        Some(text) => writeln!(out, "{text}"),
        None => {
            let rendered = serde_json::to_string_pretty(&response.response)
                .unwrap_or_else(|_| response.response.to_string());
            writeln!(out, "{rendered}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rendered(response: &ResponseEnvelope, verbose: bool) -> String {
        let mut out = Vec::new();
        render(response, verbose, &mut out).expect("render");
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn bare_string_prints_unquoted() {
        let response = ResponseEnvelope::new(json!("volume: adjust the volume"), 0, 1);
        assert_eq!(rendered(&response, false), "volume: adjust the volume\n");
    }

    #[test]
    fn structured_response_prints_as_json() {
        let response = ResponseEnvelope::new(json!({"old_volume": 40}), 0, 1);
        let text = rendered(&response, false);
        assert!(text.contains("\"old_volume\": 40"));
    }

    #[test]
    fn verbose_prints_the_whole_envelope() {
        let mut response = ResponseEnvelope::new(json!("done"), 0, 7);
        response.worker = Some("worker-0".to_owned());
        let text = rendered(&response, true);
        assert!(text.contains("\"worker\""));
        assert!(text.contains("\"id\": 7"));
    }

    #[test]
    fn exit_status_folds_negative_codes() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(-1), 255);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(511), 255);
    }
}
