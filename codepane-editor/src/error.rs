use std::time::Duration;

use crate::lifecycle::LoadState;
use crate::protocol::MessageKind;

/// Every failure the bridge can surface to the host.
///
/// None of these are fatal: the host can always recover by reloading or by
/// dropping the session and creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown message kind '{0}'")]
    UnknownMessageKind(String),
    #[error("message kind '{0}' is not valid in this direction")]
    UnexpectedMessage(MessageKind),
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),
    #[error("editor runtime is not available (state: {0})")]
    RuntimeNotAvailable(LoadState),
    #[error("a content pull is already pending")]
    RequestAlreadyPending,
    #[error("editor runtime did not respond within {0:?}")]
    RuntimeUnresponsive(Duration),
    #[error("editor failed to load: {0}")]
    LoadFailed(String),
    #[error("editor runtime reported an error: {0}")]
    RuntimeError(String),
    #[error("request was cancelled")]
    Cancelled,
    #[error("editor session is closed")]
    SessionClosed,
}
