//! Per-line classification of child stdout.

use serde_json::Value;

/// Keys whose presence marks a decoded object as a protocol envelope.
/// Presence is enough: `"result": null` still counts.
pub const ENVELOPE_KEYS: [&str; 4] = ["jsonrpc", "method", "result", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Forwarded to stdout untouched.
    Protocol,
    /// Not JSON at all.
    NonParseable,
    /// Valid JSON without any envelope key.
    NonProtocol,
}

impl LineClass {
    /// Tag written in front of diagnostic lines on stderr.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::Protocol => None,
            Self::NonParseable => Some("NON-PARSEABLE"),
            Self::NonProtocol => Some("NON-PROTOCOL"),
        }
    }
}

/// Classify one logical line (without its terminator).
pub fn classify_line(line: &str) -> LineClass {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return LineClass::NonParseable,
    };

    let is_envelope = value
        .as_object()
        .is_some_and(|obj| ENVELOPE_KEYS.iter().any(|k| obj.contains_key(*k)));

    if is_envelope {
        LineClass::Protocol
    } else {
        LineClass::NonProtocol
    }
}
