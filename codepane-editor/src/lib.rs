pub mod assets;
pub mod codec;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod protocol;
pub mod schema;
pub mod session;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Delivery, EmbeddedRuntime, Transition};
pub use error::BridgeError;
pub use handle::{SessionHandle, Snapshot};
pub use lifecycle::LoadState;
pub use protocol::{Message, MessageKind};
pub use session::{EditorSession, SessionEvent};
