//! Mapping host failures back to the fragment that caused them.

use crate::assemble::FragmentSpan;
use crate::error::{Error, HostFailure};
use regex::Regex;
use std::sync::OnceLock;

fn error_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*error in line (\d+):?[ \t]*\r?\n?(.*)$").expect("valid error line regex")
    })
}

/// Split a host message of the form `Error in line N\n<message>`.
pub fn parse_error_line(message: &str) -> Option<(usize, String)> {
    let caps = error_line_regex().captures(message)?;
    let line = caps[1].parse().ok()?;
    Some((line, caps[2].trim_end().to_string()))
}

/// Turn a host failure into [`Error::ScriptExecution`] when its line falls
/// in a known span; otherwise keep it as [`Error::HostFailure`].
pub fn diagnose(failure: HostFailure, spans: &[FragmentSpan]) -> Error {
    let Some((line, message)) = parse_error_line(&failure.message) else {
        tracing::debug!(message = %failure.message, "host failure without a line number");
        return Error::HostFailure(failure);
    };
    let Some(span) = spans.iter().find(|s| s.contains(line)) else {
        tracing::debug!(line, "host failure line outside the assembled script");
        return Error::HostFailure(failure);
    };
    Error::ScriptExecution {
        message,
        origin: span.origin.clone(),
        detail: span.detail.clone(),
        fragment_line: span.relative_line(line),
        absolute_line: line,
    }
}
