use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::protocol::Message;

/// Load state of the embedded runtime for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
            LoadState::Failed => "failed",
        })
    }
}

/// Finite state machine over [`LoadState`] plus the outbound queue that is
/// held while a load cycle is in flight.
///
/// Every entry into `Loading` starts a new cycle. Navigation signals name the
/// cycle they belong to; signals for another cycle, or arriving outside
/// `Loading`, are ignored.
#[derive(Debug)]
pub struct LifecycleController {
    state: LoadState,
    cycle: u64,
    queue: VecDeque<Message>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    pub fn new() -> Self {
        LifecycleController {
            state: LoadState::Unloaded,
            cycle: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Current cycle number; 0 until the first load begins.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Enter `Loading` with a fresh cycle. Already `Loading` is a no-op that
    /// returns the cycle in flight.
    pub fn begin_load(&mut self) -> u64 {
        if self.state == LoadState::Loading {
            log::debug!("Load already in progress (cycle {})", self.cycle);
            return self.cycle;
        }
        self.cycle += 1;
        self.state = LoadState::Loading;
        self.queue.clear();
        self.cycle
    }

    /// Hold `message` until the cycle completes. Only valid while `Loading`;
    /// returns false (and drops nothing) otherwise.
    pub fn enqueue(&mut self, message: Message) -> bool {
        if self.state != LoadState::Loading {
            return false;
        }
        self.queue.push_back(message);
        true
    }

    /// `Loading → Ready`. Returns the queued messages in FIFO order, or
    /// `None` when the signal is a duplicate or belongs to another cycle.
    pub fn navigation_finished(&mut self, cycle: u64) -> Option<Vec<Message>> {
        if !self.accepts(cycle, "finished") {
            return None;
        }
        self.state = LoadState::Ready;
        Some(self.queue.drain(..).collect())
    }

    /// `Loading → Failed`. Returns how many queued messages were discarded,
    /// or `None` when the signal is ignored.
    pub fn navigation_failed(&mut self, cycle: u64) -> Option<usize> {
        if !self.accepts(cycle, "failed") {
            return None;
        }
        self.state = LoadState::Failed;
        let discarded = self.queue.len();
        self.queue.clear();
        Some(discarded)
    }

    /// Back to `Unloaded`, dropping anything queued. Returns the drop count.
    pub fn reset(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.state = LoadState::Unloaded;
        discarded
    }

    fn accepts(&self, cycle: u64, signal: &str) -> bool {
        if self.state != LoadState::Loading || cycle != self.cycle {
            log::debug!(
                "Ignoring navigation {} signal for cycle {} (state {}, current cycle {})",
                signal,
                cycle,
                self.state,
                self.cycle
            );
            return false;
        }
        true
    }
}
