use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec;
use crate::dispatcher::EmbeddedRuntime;
use crate::protocol::Message;

#[derive(Debug, Default)]
struct Recorded {
    loads: Vec<u64>,
    scripts: Vec<String>,
    unloaded: bool,
}

/// Runtime double that records what the bridge asks of it. Clones share the
/// same record, so tests keep one clone and hand the other to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingRuntime {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingRuntime {
    pub fn loads(&self) -> Vec<u64> {
        self.inner.lock().loads.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.inner.lock().scripts.clone()
    }

    /// Outbound messages, decoded back from the evaluated scripts.
    pub fn sent(&self) -> Vec<Message> {
        self.scripts().iter().map(|s| parse_script(s)).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().scripts.clear();
    }

    pub fn is_unloaded(&self) -> bool {
        self.inner.lock().unloaded
    }
}

impl EmbeddedRuntime for RecordingRuntime {
    fn load(&mut self, cycle: u64) {
        self.inner.lock().loads.push(cycle);
    }

    fn evaluate_script(&mut self, script: &str) {
        self.inner.lock().scripts.push(script.to_string());
    }

    fn unload(&mut self) {
        self.inner.lock().unloaded = true;
    }
}

/// Reverse of `codec::escape_script_string`, as the script engine would read
/// the literal.
pub fn unescape_script_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16).expect("4 hex digits");
                out.push(char::from_u32(code).expect("valid scalar"));
            }
            Some(other) => out.push(other),
            None => panic!("dangling backslash in {:?}", s),
        }
    }
    out
}

/// Decode a `fn('<literal>')` script back into the message it carries.
pub fn parse_script(script: &str) -> Message {
    let start = script.find("('").expect("script call") + 2;
    let end = script.rfind("')").expect("script call end");
    let json = unescape_script_string(&script[start..end]);
    codec::decode(&json).expect("decodable message")
}
