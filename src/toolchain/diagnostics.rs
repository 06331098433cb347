//! Diagnostic extraction from ca65/ld65 output.
//!
//! Recognized shapes:
//!
//! ```text
//! main.s(12): Error: Unexpected trailing garbage characters
//! main.s:12: Warning: Symbol 'tmp' is defined but never used
//! ld65: Error: Missing memory area assignment for segment 'HEADER'
//! ld65: Warning: link.x(5): Segment 'STARTUP' does not exist
//! ld65: Error: link.x:5: Attribute expected
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Diagnostic, Severity};

static LOCATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<file>(?:[A-Za-z]:)?[^:()\s][^:()]*?)(?:\((?P<pline>\d+)\)|:(?P<cline>\d+)):\s*(?P<sev>Fatal error|Error|Warning|Note|Info):\s*(?P<msg>.*)$",
    )
    .expect("located diagnostic pattern")
});

static TOOL_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<tool>[A-Za-z0-9_.-]+):\s*(?P<sev>Fatal error|Error|Warning|Note|Info):\s*(?P<msg>.*)$")
        .expect("tool diagnostic pattern")
});

static NESTED_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>(?:[A-Za-z]:)?[^:()\s][^:()]*?)(?:\((?P<pline>\d+)\)|:(?P<cline>\d+)):\s*(?P<msg>.*)$")
        .expect("nested location pattern")
});

fn severity(label: &str) -> Severity {
    match label {
        "Fatal error" | "Error" => Severity::Error,
        "Warning" => Severity::Warning,
        _ => Severity::Note,
    }
}

/// Parse one output line. Returns `None` for lines that are not diagnostics.
pub fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let line = line.trim_end();

    if let Some(caps) = LOCATED.captures(line) {
        let line_no = caps
            .name("pline")
            .or_else(|| caps.name("cline"))
            .and_then(|m| m.as_str().parse().ok());
        return Some(Diagnostic {
            severity: severity(&caps["sev"]),
            file: Some(caps["file"].to_string()),
            line: line_no,
            message: caps["msg"].to_string(),
        });
    }

    let caps = TOOL_PREFIXED.captures(line)?;
    let severity = severity(&caps["sev"]);
    let message = &caps["msg"];

    match NESTED_LOCATION.captures(message) {
        Some(nested) => Some(Diagnostic {
            severity,
            file: Some(nested["file"].to_string()),
            line: nested
                .name("pline")
                .or_else(|| nested.name("cline"))
                .and_then(|m| m.as_str().parse().ok()),
            message: nested["msg"].to_string(),
        }),
        None => Some(Diagnostic {
            severity,
            file: None,
            line: None,
            message: message.to_string(),
        }),
    }
}

/// Collect diagnostics from a batch of output lines, in order.
pub fn collect_diagnostics<'a, I>(lines: I) -> Vec<Diagnostic>
where
    I: IntoIterator<Item = &'a String>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_diagnostic(line))
        .collect()
}
