use crate::codec;
use crate::error::BridgeError;
use crate::lifecycle::{LifecycleController, LoadState};
use crate::protocol::{Inbound, Message};

/// The embedded web runtime, as seen by the bridge.
///
/// Implementations wrap a concrete WebView. Navigation results and inbound
/// messages are not part of this trait: the host feeds them back into the
/// session from the WebView's own callbacks.
pub trait EmbeddedRuntime {
    /// Start loading the editor document. The outcome must be reported back
    /// exactly once, tagged with `cycle`.
    fn load(&mut self, cycle: u64);

    /// Evaluate a script in the runtime's page context.
    fn evaluate_script(&mut self, script: &str);

    /// Release the runtime when the session goes away.
    fn unload(&mut self) {}
}

/// What `send` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// Outcome of feeding a navigation signal to the dispatcher.
///
/// `errors` holds queued messages that could not be delivered on `Ready`;
/// the rest of the queue is still flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Ready {
        flushed: usize,
        errors: Vec<BridgeError>,
    },
    Failed { discarded: usize },
    Ignored,
}

/// Routes messages across the runtime boundary, gated by the load lifecycle.
pub struct Dispatcher<R: EmbeddedRuntime> {
    runtime: R,
    lifecycle: LifecycleController,
    receive_function: String,
}

impl<R: EmbeddedRuntime> Dispatcher<R> {
    pub fn new(runtime: R, receive_function: impl Into<String>) -> Self {
        Dispatcher {
            runtime,
            lifecycle: LifecycleController::new(),
            receive_function: receive_function.into(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.lifecycle.state()
    }

    pub fn cycle(&self) -> u64 {
        self.lifecycle.cycle()
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Start a load cycle and ask the runtime to navigate. While a cycle is
    /// already in flight this only returns its number.
    pub fn begin_load(&mut self) -> u64 {
        let was_loading = self.lifecycle.state() == LoadState::Loading;
        let cycle = self.lifecycle.begin_load();
        if !was_loading {
            log::info!("Loading editor runtime (cycle {})", cycle);
            self.runtime.load(cycle);
        }
        cycle
    }

    /// Deliver `message` now when `Ready`, hold it while `Loading`.
    pub fn send(&mut self, message: Message) -> Result<Delivery, BridgeError> {
        let kind = message.kind();
        if !kind.is_outbound() {
            return Err(BridgeError::UnexpectedMessage(kind));
        }
        match self.lifecycle.state() {
            LoadState::Ready => {
                self.deliver(&message)?;
                Ok(Delivery::Sent)
            }
            LoadState::Loading => {
                self.lifecycle.enqueue(message);
                Ok(Delivery::Queued)
            }
            state => Err(BridgeError::RuntimeNotAvailable(state)),
        }
    }

    pub fn navigation_finished(&mut self, cycle: u64) -> Transition {
        let Some(queued) = self.lifecycle.navigation_finished(cycle) else {
            return Transition::Ignored;
        };
        let flushed = queued.len();
        let errors: Vec<BridgeError> = queued
            .iter()
            .filter_map(|message| self.deliver(message).err())
            .collect();
        log::info!(
            "Editor runtime ready (cycle {}), flushed {} queued message(s)",
            cycle,
            flushed
        );
        Transition::Ready { flushed, errors }
    }

    pub fn navigation_failed(&mut self, cycle: u64) -> Transition {
        match self.lifecycle.navigation_failed(cycle) {
            Some(discarded) => Transition::Failed { discarded },
            None => Transition::Ignored,
        }
    }

    /// Decode a raw inbound payload and check it is a kind the runtime may
    /// send. Never touches session state.
    pub fn on_message(&self, raw: &str) -> Result<Inbound, BridgeError> {
        let message = codec::decode(raw)?;
        Inbound::try_from(message).map_err(BridgeError::UnexpectedMessage)
    }

    /// Drop queued messages and release the runtime.
    pub fn teardown(&mut self) -> usize {
        let discarded = self.lifecycle.reset();
        self.runtime.unload();
        discarded
    }

    fn deliver(&mut self, message: &Message) -> Result<(), BridgeError> {
        let script = codec::script_invocation(&self.receive_function, message)?;
        self.runtime.evaluate_script(&script);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingRuntime;
    use codepane_core::Mode;

    fn dispatcher() -> (Dispatcher<RecordingRuntime>, RecordingRuntime) {
        let runtime = RecordingRuntime::default();
        (Dispatcher::new(runtime.clone(), "codepaneReceive"), runtime)
    }

    fn push(text: &str) -> Message {
        Message::PushContent {
            text: text.to_string(),
        }
    }

    #[test]
    fn send_before_load_is_rejected() {
        let (mut d, runtime) = dispatcher();
        assert_eq!(
            d.send(push("a")),
            Err(BridgeError::RuntimeNotAvailable(LoadState::Unloaded))
        );
        assert!(runtime.sent().is_empty());
    }

    #[test]
    fn send_while_loading_queues_then_flushes_in_order() {
        let (mut d, runtime) = dispatcher();
        let cycle = d.begin_load();
        assert_eq!(runtime.loads(), vec![cycle]);

        assert_eq!(d.send(push("1")), Ok(Delivery::Queued));
        assert_eq!(d.send(push("2")), Ok(Delivery::Queued));
        assert!(runtime.sent().is_empty());

        assert_eq!(
            d.navigation_finished(cycle),
            Transition::Ready {
                flushed: 2,
                errors: vec![]
            }
        );
        assert_eq!(d.send(push("3")), Ok(Delivery::Sent));
        assert_eq!(runtime.sent(), vec![push("1"), push("2"), push("3")]);
    }

    #[test]
    fn send_after_failure_is_rejected() {
        let (mut d, runtime) = dispatcher();
        let cycle = d.begin_load();
        d.send(push("lost")).unwrap();
        assert_eq!(d.navigation_failed(cycle), Transition::Failed { discarded: 1 });
        assert_eq!(
            d.send(push("a")),
            Err(BridgeError::RuntimeNotAvailable(LoadState::Failed))
        );
        assert!(runtime.sent().is_empty());
    }

    #[test]
    fn begin_load_twice_navigates_once() {
        let (mut d, runtime) = dispatcher();
        let cycle = d.begin_load();
        assert_eq!(d.begin_load(), cycle);
        assert_eq!(runtime.loads().len(), 1);
    }

    #[test]
    fn inbound_only_kinds_cannot_be_sent() {
        let (mut d, _) = dispatcher();
        let cycle = d.begin_load();
        d.navigation_finished(cycle);
        assert!(matches!(
            d.send(Message::ContentChanged { text: "x".into() }),
            Err(BridgeError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn on_message_routes_inbound_kinds() {
        let (d, _) = dispatcher();
        assert_eq!(
            d.on_message(r#"{"kind":"contentChanged","text":"{\"a\":1}"}"#),
            Ok(Inbound::ContentChanged("{\"a\":1}".into()))
        );
        assert_eq!(
            d.on_message(r#"{"kind":"loadComplete"}"#),
            Ok(Inbound::LoadComplete)
        );
    }

    #[test]
    fn on_message_rejects_outbound_kinds_and_garbage() {
        let (d, _) = dispatcher();
        assert!(matches!(
            d.on_message(r#"{"kind":"pushMode","mode":"json"}"#),
            Err(BridgeError::UnexpectedMessage(_))
        ));
        assert!(matches!(
            d.on_message("{\"kind\":\"contentChanged\",\"te"),
            Err(BridgeError::MalformedMessage(_))
        ));
        assert!(matches!(
            d.on_message(r#"{"kind":"bogus"}"#),
            Err(BridgeError::UnknownMessageKind(_))
        ));
    }

    #[test]
    fn scripts_target_the_configured_function() {
        let runtime = RecordingRuntime::default();
        let mut d = Dispatcher::new(runtime.clone(), "ob.receive");
        let cycle = d.begin_load();
        d.navigation_finished(cycle);
        d.send(Message::PushMode { mode: Mode::Xml }).unwrap();
        let scripts = runtime.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].starts_with("ob.receive('"));
    }

    #[test]
    fn flush_returns_undeliverable_messages() {
        let runtime = RecordingRuntime::default();
        let mut d = Dispatcher::new(runtime.clone(), "not a function()");
        let cycle = d.begin_load();
        d.send(push("a")).unwrap();
        d.send(push("b")).unwrap();

        match d.navigation_finished(cycle) {
            Transition::Ready { flushed, errors } => {
                assert_eq!(flushed, 2);
                assert_eq!(errors.len(), 2);
                assert!(errors
                    .iter()
                    .all(|e| matches!(e, BridgeError::EncodeFailed(_))));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
        assert!(runtime.scripts().is_empty());
        assert_eq!(d.state(), LoadState::Ready);
    }

    #[test]
    fn teardown_unloads_runtime() {
        let (mut d, runtime) = dispatcher();
        d.begin_load();
        d.send(push("a")).unwrap();
        assert_eq!(d.teardown(), 1);
        assert!(runtime.is_unloaded());
        assert_eq!(d.state(), LoadState::Unloaded);
    }
}
