use std::time::Duration;

use codepane_core::{Appearance, BridgeSettings, Mode};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::dispatcher::{Delivery, EmbeddedRuntime};
use crate::error::BridgeError;
use crate::lifecycle::LoadState;
use crate::session::{EditorSession, PullResult, PullTicket, SessionEvent};

type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

enum Command {
    SetText(String, Reply<Delivery>),
    SetMode(Mode, Reply<Delivery>),
    SetAppearance(Appearance, Reply<Delivery>),
    Snapshot(oneshot::Sender<Snapshot>),
    Reload(oneshot::Sender<u64>),
    NavigationFinished(u64),
    NavigationFailed(u64, String),
    Deliver(String),
    Pull(Reply<PullTicket>),
    ExpirePull(u64, Duration),
    Close,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
    pub mode: Mode,
    pub revision: u64,
    pub state: LoadState,
    pub cycle: u64,
}

/// Cloneable handle to an [`EditorSession`] running on its own task.
///
/// Host calls and runtime callbacks all become commands on one channel, so
/// the session sees them strictly one at a time. The pull is the only call
/// that waits on the runtime, and it does so without holding up the queue.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Create a session and start its task. Must be called within a tokio
    /// runtime. The session ends when every handle is dropped or on `close`.
    pub fn spawn<R>(
        runtime: R,
        text: impl Into<String>,
        mode: Mode,
        settings: &BridgeSettings,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)
    where
        R: EmbeddedRuntime + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = EditorSession::new(runtime, text, mode, settings, event_tx);
        let id = session.id();
        let (tx, rx) = mpsc::unbounded_channel();
        let pull_timeout = settings.pull_timeout();
        tokio::spawn(run_session(session, rx, tx.downgrade(), pull_timeout));

        (SessionHandle { id, tx }, event_rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ── Runtime callbacks (never block) ─────────────────────────────────

    pub fn navigation_finished(&self, cycle: u64) -> Result<(), BridgeError> {
        self.send(Command::NavigationFinished(cycle))
    }

    pub fn navigation_failed(&self, cycle: u64, diagnostic: &str) -> Result<(), BridgeError> {
        self.send(Command::NavigationFailed(cycle, diagnostic.to_string()))
    }

    /// Hand over a raw message posted by the runtime's script.
    pub fn deliver(&self, raw: &str) -> Result<(), BridgeError> {
        self.send(Command::Deliver(raw.to_string()))
    }

    // ── Host operations ─────────────────────────────────────────────────

    pub async fn set_text(&self, text: impl Into<String>) -> Result<Delivery, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetText(text.into(), tx))?;
        rx.await.map_err(|_| BridgeError::SessionClosed)?
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<Delivery, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetMode(mode, tx))?;
        rx.await.map_err(|_| BridgeError::SessionClosed)?
    }

    pub async fn set_appearance(&self, appearance: Appearance) -> Result<Delivery, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetAppearance(appearance, tx))?;
        rx.await.map_err(|_| BridgeError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> Result<Snapshot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| BridgeError::SessionClosed)
    }

    /// The host's current copy of the buffer.
    pub async fn text(&self) -> Result<String, BridgeError> {
        Ok(self.snapshot().await?.text)
    }

    pub async fn mode(&self) -> Result<Mode, BridgeError> {
        Ok(self.snapshot().await?.mode)
    }

    pub async fn state(&self) -> Result<LoadState, BridgeError> {
        Ok(self.snapshot().await?.state)
    }

    /// Explicit new load request; returns the cycle now in flight.
    pub async fn reload(&self) -> Result<u64, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Reload(tx))?;
        rx.await.map_err(|_| BridgeError::SessionClosed)
    }

    /// Fetch the runtime's authoritative text, waiting at most the configured
    /// pull timeout.
    ///
    /// The deadline belongs to the session task, so dropping this future
    /// early still frees the pull slot once the timeout passes.
    pub async fn pull_text(&self) -> PullResult {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Pull(tx))?;
        let ticket = rx.await.map_err(|_| BridgeError::SessionClosed)??;
        ticket.reply.await.map_err(|_| BridgeError::Cancelled)?
    }

    /// Tear the session down. Pending pulls resolve as cancelled.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }

    fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.tx.send(command).map_err(|_| BridgeError::SessionClosed)
    }
}

async fn run_session<R: EmbeddedRuntime>(
    mut session: EditorSession<R>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    expiry_tx: mpsc::WeakUnboundedSender<Command>,
    pull_timeout: Duration,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::SetText(text, reply) => {
                let _ = reply.send(session.set_text(text));
            }
            Command::SetMode(mode, reply) => {
                let _ = reply.send(session.set_mode(mode));
            }
            Command::SetAppearance(appearance, reply) => {
                let _ = reply.send(session.set_appearance(appearance));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Snapshot {
                    text: session.text().to_string(),
                    mode: session.mode(),
                    revision: session.revision(),
                    state: session.state(),
                    cycle: session.cycle(),
                });
            }
            Command::Reload(reply) => {
                let _ = reply.send(session.reload());
            }
            Command::NavigationFinished(cycle) => {
                session.navigation_finished(cycle);
            }
            Command::NavigationFailed(cycle, diagnostic) => {
                session.navigation_failed(cycle, &diagnostic);
            }
            Command::Deliver(raw) => {
                // Failures are already reported on the event channel.
                let _ = session.on_message(&raw);
            }
            Command::Pull(reply) => {
                let ticket = session.request_pull();
                if let Ok(ticket) = &ticket {
                    spawn_pull_deadline(&expiry_tx, ticket.id, pull_timeout);
                }
                let _ = reply.send(ticket);
            }
            Command::ExpirePull(id, waited) => {
                session.expire_pull(id, waited);
            }
            Command::Close => break,
        }
    }
    log::debug!("Session task for {} finished", session.id());
    // Release the runtime before the command queue is dropped.
    drop(session);
}

/// Queue `ExpirePull(id)` once `timeout` has passed. Expiry of a pull that
/// was already answered is a no-op in the session.
fn spawn_pull_deadline(tx: &mpsc::WeakUnboundedSender<Command>, id: u64, timeout: Duration) {
    let tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        // Every handle gone means the session is already torn down.
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(Command::ExpirePull(id, timeout));
        }
    });
}
