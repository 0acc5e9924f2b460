use std::time::Duration;

use codepane_core::{Appearance, BridgeSettings, Mode};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::content::ContentModel;
use crate::dispatcher::{Delivery, Dispatcher, EmbeddedRuntime, Transition};
use crate::error::BridgeError;
use crate::lifecycle::LoadState;
use crate::protocol::{Inbound, Message};

/// Host-visible notifications from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged { state: LoadState, cycle: u64 },
    /// The script inside the runtime announced it is wired up.
    Acknowledged { cycle: u64 },
    /// The runtime changed the buffer.
    ContentChanged { revision: u64 },
    Diagnostic(BridgeError),
}

pub type PullResult = Result<String, BridgeError>;

/// Receiving side of an outstanding pull.
#[derive(Debug)]
pub struct PullTicket {
    pub id: u64,
    pub reply: oneshot::Receiver<PullResult>,
}

struct PendingPull {
    id: u64,
    reply: oneshot::Sender<PullResult>,
}

/// One editor surface: the host-owned buffer kept in sync with one embedded
/// runtime instance.
///
/// All methods take `&mut self`; the owner serializes runtime callbacks and
/// host calls onto one queue (see [`crate::handle::SessionHandle`]).
pub struct EditorSession<R: EmbeddedRuntime> {
    id: Uuid,
    content: ContentModel,
    appearance: Appearance,
    dispatcher: Dispatcher<R>,
    pending_pull: Option<PendingPull>,
    next_pull_id: u64,
    acknowledged: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<R: EmbeddedRuntime> EditorSession<R> {
    /// Create the session and start loading the runtime.
    pub fn new(
        runtime: R,
        text: impl Into<String>,
        mode: Mode,
        settings: &BridgeSettings,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let mut session = EditorSession {
            id: Uuid::new_v4(),
            content: ContentModel::new(text, mode),
            appearance: settings.appearance,
            dispatcher: Dispatcher::new(runtime, settings.receive_function.clone()),
            pending_pull: None,
            next_pull_id: 1,
            acknowledged: false,
            events,
        };
        log::debug!("Created editor session {} ({})", session.id, mode);
        session.start_load();
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        self.content.text()
    }

    pub fn mode(&self) -> Mode {
        self.content.mode()
    }

    pub fn revision(&self) -> u64 {
        self.content.revision()
    }

    pub fn appearance(&self) -> Appearance {
        self.appearance
    }

    pub fn state(&self) -> LoadState {
        self.dispatcher.state()
    }

    pub fn cycle(&self) -> u64 {
        self.dispatcher.cycle()
    }

    pub fn queued_len(&self) -> usize {
        self.dispatcher.lifecycle().queued_len()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn has_pending_pull(&self) -> bool {
        self.pending_pull.is_some()
    }

    pub fn runtime(&self) -> &R {
        self.dispatcher.runtime()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Explicitly (re)load the runtime. This is the only way out of `Failed`.
    /// A load already in flight is left alone.
    pub fn reload(&mut self) -> u64 {
        if self.state() == LoadState::Loading {
            return self.cycle();
        }
        self.start_load()
    }

    fn start_load(&mut self) -> u64 {
        self.cancel_pull(BridgeError::Cancelled);
        self.acknowledged = false;
        let cycle = self.dispatcher.begin_load();

        // Initial sync heads the cycle's queue so it reaches the runtime
        // before anything the host sends while loading. Mode goes first:
        // the editor interprets content according to it.
        let initial = [
            Message::PushMode {
                mode: self.content.mode(),
            },
            Message::PushContent {
                text: self.content.text().to_string(),
            },
            Message::PushAppearance {
                appearance: self.appearance,
            },
        ];
        for message in initial {
            if let Err(e) = self.dispatcher.send(message) {
                self.report(e);
            }
        }

        self.emit(SessionEvent::StateChanged {
            state: LoadState::Loading,
            cycle,
        });
        cycle
    }

    /// Runtime callback: navigation for `cycle` succeeded.
    pub fn navigation_finished(&mut self, cycle: u64) -> Transition {
        let transition = self.dispatcher.navigation_finished(cycle);
        if let Transition::Ready { errors, .. } = &transition {
            self.emit(SessionEvent::StateChanged {
                state: LoadState::Ready,
                cycle,
            });
            for error in errors {
                self.report(error.clone());
            }
        }
        transition
    }

    /// Runtime callback: navigation for `cycle` failed with `diagnostic`.
    /// The buffer keeps its last consistent value and nothing is retried.
    pub fn navigation_failed(&mut self, cycle: u64, diagnostic: &str) -> Transition {
        let transition = self.dispatcher.navigation_failed(cycle);
        if let Transition::Failed { discarded } = transition {
            log::warn!(
                "Editor session {} failed to load (cycle {}, {} message(s) dropped): {}",
                self.id,
                cycle,
                discarded,
                diagnostic
            );
            self.cancel_pull(BridgeError::LoadFailed(diagnostic.to_string()));
            self.emit(SessionEvent::StateChanged {
                state: LoadState::Failed,
                cycle,
            });
            self.emit(SessionEvent::Diagnostic(BridgeError::LoadFailed(
                diagnostic.to_string(),
            )));
        }
        transition
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Runtime callback: a raw message posted by the script. Undecodable
    /// input is reported and never changes the buffer.
    pub fn on_message(&mut self, raw: &str) -> Result<(), BridgeError> {
        let inbound = match self.dispatcher.on_message(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.report(e.clone());
                return Err(e);
            }
        };

        match inbound {
            Inbound::LoadComplete => {
                self.acknowledged = true;
                self.emit(SessionEvent::Acknowledged {
                    cycle: self.cycle(),
                });
            }
            Inbound::ContentChanged(text) => self.apply_runtime_text(text),
            Inbound::PullContentResponse { id, text } => self.resolve_pull(id, text),
            Inbound::RuntimeError(message) => {
                self.report(BridgeError::RuntimeError(message));
            }
            Inbound::Log(message) => {
                log::info!("[editor {}] {}", self.id, message);
            }
        }
        Ok(())
    }

    fn apply_runtime_text(&mut self, text: String) {
        // Only the document of a completed cycle speaks for the buffer; a
        // page being replaced may still post edits the host already
        // superseded.
        if self.state() != LoadState::Ready {
            log::debug!(
                "Discarding content change in state {} for session {}",
                self.state(),
                self.id
            );
            return;
        }
        if self.content.set_text(text) {
            self.emit(SessionEvent::ContentChanged {
                revision: self.content.revision(),
            });
        }
    }

    fn resolve_pull(&mut self, id: Option<u64>, text: String) {
        let matches = match (&self.pending_pull, id) {
            (Some(pending), Some(id)) => pending.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            log::debug!(
                "Discarding stale pull response {:?} for session {}",
                id,
                self.id
            );
            return;
        }
        let Some(pending) = self.pending_pull.take() else {
            return;
        };
        if self.content.set_text(text.clone()) {
            self.emit(SessionEvent::ContentChanged {
                revision: self.content.revision(),
            });
        }
        let _ = pending.reply.send(Ok(text));
    }

    // -----------------------------------------------------------------------
    // Host operations
    // -----------------------------------------------------------------------

    /// Replace the buffer and push it to the runtime. The local update stands
    /// even when the runtime is unavailable; the next load pushes it.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<Delivery, BridgeError> {
        let text = text.into();
        self.content.set_text(text.clone());
        self.send(Message::PushContent { text })
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<Delivery, BridgeError> {
        self.content.set_mode(mode);
        self.send(Message::PushMode { mode })
    }

    pub fn set_appearance(&mut self, appearance: Appearance) -> Result<Delivery, BridgeError> {
        self.appearance = appearance;
        self.send(Message::PushAppearance { appearance })
    }

    /// Ask the runtime for its current text. At most one pull may be
    /// outstanding; whoever owns the session arms a deadline and calls
    /// [`Self::expire_pull`] when it passes.
    pub fn request_pull(&mut self) -> Result<PullTicket, BridgeError> {
        if self.pending_pull.is_some() {
            self.report(BridgeError::RequestAlreadyPending);
            return Err(BridgeError::RequestAlreadyPending);
        }
        let id = self.next_pull_id;
        self.send(Message::PullContentRequest { id })?;
        self.next_pull_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending_pull = Some(PendingPull { id, reply: tx });
        Ok(PullTicket { id, reply: rx })
    }

    /// Give up on pull `id` after `waited`. Returns false when that pull is
    /// no longer outstanding.
    pub fn expire_pull(&mut self, id: u64, waited: Duration) -> bool {
        if !matches!(&self.pending_pull, Some(pending) if pending.id == id) {
            return false;
        }
        self.cancel_pull(BridgeError::RuntimeUnresponsive(waited));
        self.report(BridgeError::RuntimeUnresponsive(waited));
        true
    }

    fn cancel_pull(&mut self, reason: BridgeError) {
        if let Some(pending) = self.pending_pull.take() {
            log::debug!(
                "Cancelling pull {} for session {}: {}",
                pending.id,
                self.id,
                reason
            );
            let _ = pending.reply.send(Err(reason));
        }
    }

    fn send(&mut self, message: Message) -> Result<Delivery, BridgeError> {
        self.dispatcher.send(message).inspect_err(|e| {
            self.report(e.clone());
        })
    }

    fn report(&self, error: BridgeError) {
        log::warn!("Editor session {}: {}", self.id, error);
        self.emit(SessionEvent::Diagnostic(error));
    }

    fn emit(&self, event: SessionEvent) {
        // The host may have stopped listening; the session carries on.
        let _ = self.events.send(event);
    }
}

impl<R: EmbeddedRuntime> Drop for EditorSession<R> {
    fn drop(&mut self) {
        self.cancel_pull(BridgeError::Cancelled);
        let discarded = self.dispatcher.teardown();
        log::debug!(
            "Closed editor session {} ({} queued message(s) dropped)",
            self.id,
            discarded
        );
    }
}
