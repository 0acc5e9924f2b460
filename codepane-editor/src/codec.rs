//! Wire encoding for [`Message`].
//!
//! Messages travel as JSON objects tagged by `kind`. Outbound messages are
//! additionally embedded in a single-quoted script string literal, since the
//! only way into the runtime is evaluating a script.

use codepane_core::util::is_script_path;

use crate::error::BridgeError;
use crate::protocol::{Message, MessageKind};

/// Encode a message as its JSON wire text.
pub fn encode(message: &Message) -> Result<String, BridgeError> {
    serde_json::to_string(message).map_err(|e| {
        log::error!("Failed to serialize {} message: {}", message.kind(), e);
        BridgeError::EncodeFailed(e.to_string())
    })
}

/// Decode JSON wire text into a message.
///
/// The `kind` tag is checked against the closed set before the payload is
/// interpreted, so an unrecognized kind is reported as such rather than as a
/// generic parse failure.
pub fn decode(raw: &str) -> Result<Message, BridgeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| BridgeError::MalformedMessage(e.to_string()))?;

    let tag = match value.get("kind") {
        Some(serde_json::Value::String(tag)) => tag.clone(),
        Some(other) => {
            return Err(BridgeError::MalformedMessage(format!(
                "`kind` must be a string, got {}",
                other
            )))
        }
        None if value.is_object() => {
            return Err(BridgeError::MalformedMessage(
                "missing `kind` field".to_string(),
            ))
        }
        None => {
            return Err(BridgeError::MalformedMessage(
                "expected a JSON object".to_string(),
            ))
        }
    };

    if MessageKind::from_tag(&tag).is_none() {
        return Err(BridgeError::UnknownMessageKind(tag));
    }

    serde_json::from_value(value)
        .map_err(|e| BridgeError::MalformedMessage(format!("invalid `{}` payload: {}", tag, e)))
}

/// Escape `s` for use inside a single-quoted script string literal.
pub fn escape_script_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Build the script that hands `message` to `function` inside the runtime,
/// e.g. `codepaneReceive('{"kind":"pushMode","mode":"json"}')`.
///
/// `function` must be a dotted identifier path; it is the one part of the
/// script that is not escaped.
pub fn script_invocation(function: &str, message: &Message) -> Result<String, BridgeError> {
    if !is_script_path(function) {
        return Err(BridgeError::EncodeFailed(format!(
            "invalid receive function {:?}",
            function
        )));
    }
    let json = encode(message)?;
    Ok(format!("{}('{}')", function, escape_script_string(&json)))
}
