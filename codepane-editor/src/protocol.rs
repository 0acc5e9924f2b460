use std::fmt;

use codepane_core::{Appearance, Mode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages crossing the host/runtime boundary
// ---------------------------------------------------------------------------

/// A single one-way message between the host and the script running in the
/// embedded runtime. The `kind` tag selects the variant on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Message {
    // Runtime → host (posted through the script message handler)
    LoadComplete,
    ContentChanged {
        text: String,
    },
    PullContentResponse {
        /// Echo of the request id. Absent means "answers the outstanding pull".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        text: String,
    },
    Error {
        message: String,
    },
    Log {
        message: String,
    },

    // Host → runtime (delivered by evaluating a script)
    PushContent {
        text: String,
    },
    PushMode {
        mode: Mode,
    },
    PushAppearance {
        appearance: Appearance,
    },
    PullContentRequest {
        id: u64,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::LoadComplete => MessageKind::LoadComplete,
            Message::ContentChanged { .. } => MessageKind::ContentChanged,
            Message::PullContentResponse { .. } => MessageKind::PullContentResponse,
            Message::Error { .. } => MessageKind::Error,
            Message::Log { .. } => MessageKind::Log,
            Message::PushContent { .. } => MessageKind::PushContent,
            Message::PushMode { .. } => MessageKind::PushMode,
            Message::PushAppearance { .. } => MessageKind::PushAppearance,
            Message::PullContentRequest { .. } => MessageKind::PullContentRequest,
        }
    }
}

// ---------------------------------------------------------------------------
// Kind tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    LoadComplete,
    ContentChanged,
    PullContentResponse,
    Error,
    Log,
    PushContent,
    PushMode,
    PushAppearance,
    PullContentRequest,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        MessageKind::LoadComplete,
        MessageKind::ContentChanged,
        MessageKind::PullContentResponse,
        MessageKind::Error,
        MessageKind::Log,
        MessageKind::PushContent,
        MessageKind::PushMode,
        MessageKind::PushAppearance,
        MessageKind::PullContentRequest,
    ];

    /// The wire tag, as it appears in the `kind` field.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::LoadComplete => "loadComplete",
            MessageKind::ContentChanged => "contentChanged",
            MessageKind::PullContentResponse => "pullContentResponse",
            MessageKind::Error => "error",
            MessageKind::Log => "log",
            MessageKind::PushContent => "pushContent",
            MessageKind::PushMode => "pushMode",
            MessageKind::PushAppearance => "pushAppearance",
            MessageKind::PullContentRequest => "pullContentRequest",
        }
    }

    pub fn from_tag(tag: &str) -> Option<MessageKind> {
        MessageKind::ALL.into_iter().find(|k| k.as_str() == tag)
    }

    /// Whether the host may send this kind to the runtime.
    pub fn is_outbound(self) -> bool {
        matches!(
            self,
            MessageKind::PushContent
                | MessageKind::PushMode
                | MessageKind::PushAppearance
                | MessageKind::PullContentRequest
        )
    }

    pub fn is_inbound(self) -> bool {
        !self.is_outbound()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound view
// ---------------------------------------------------------------------------

/// A decoded message that the runtime is allowed to send, ready for routing
/// to the session's handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    LoadComplete,
    ContentChanged(String),
    PullContentResponse { id: Option<u64>, text: String },
    RuntimeError(String),
    Log(String),
}

impl TryFrom<Message> for Inbound {
    type Error = MessageKind;

    /// Fails with the offending kind when `message` is outbound-only.
    fn try_from(message: Message) -> Result<Self, MessageKind> {
        match message {
            Message::LoadComplete => Ok(Inbound::LoadComplete),
            Message::ContentChanged { text } => Ok(Inbound::ContentChanged(text)),
            Message::PullContentResponse { id, text } => {
                Ok(Inbound::PullContentResponse { id, text })
            }
            Message::Error { message } => Ok(Inbound::RuntimeError(message)),
            Message::Log { message } => Ok(Inbound::Log(message)),
            other => Err(other.kind()),
        }
    }
}
