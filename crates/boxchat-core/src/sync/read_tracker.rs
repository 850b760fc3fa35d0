//! Debounced read marking
//!
//! A message counts as read only after it has stayed visible, with the
//! window focused, for the whole dwell time. Hiding it, losing focus, or the
//! message already being read cancels its timer. Fired ids are delivered on
//! the channel returned by [`ReadTracker::new`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct TrackerState {
    focused: bool,
    visible: HashSet<String>,
    /// id -> (ticket, timer)
    timers: HashMap<String, (u64, JoinHandle<()>)>,
    next_ticket: u64,
}

impl TrackerState {
    fn cancel(&mut self, id: &str) {
        if let Some((_, timer)) = self.timers.remove(id) {
            timer.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
    }

    /// Remove the timer for `id` if it is still the one holding `ticket`.
    ///
    /// A timer that was cancelled or replaced after its sleep ended must not
    /// fire.
    fn claim(&mut self, id: &str, ticket: u64) -> bool {
        match self.timers.get(id) {
            Some((current, _)) if *current == ticket => {
                self.timers.remove(id);
                self.visible.remove(id);
                true
            }
            _ => false,
        }
    }
}

/// Per-message dwell timers.
pub struct ReadTracker {
    dwell: Duration,
    state: Arc<Mutex<TrackerState>>,
    fired: mpsc::UnboundedSender<String>,
}

impl ReadTracker {
    /// Create a tracker and the receiver its read events arrive on.
    ///
    /// The tracker starts focused.
    pub fn new(dwell: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let state = TrackerState {
            focused: true,
            ..TrackerState::default()
        };
        let tracker = Self {
            dwell,
            state: Arc::new(Mutex::new(state)),
            fired,
        };
        (tracker, rx)
    }

    /// A message scrolled into view. `already_read` messages are ignored.
    pub fn message_visible(&self, id: &str, already_read: bool) {
        let mut state = self.state.lock();
        if already_read {
            state.visible.remove(id);
            state.cancel(id);
            return;
        }
        state.visible.insert(id.to_string());
        if state.focused && !state.timers.contains_key(id) {
            self.arm(&mut state, id.to_string());
        }
    }

    /// A message left the view.
    pub fn message_hidden(&self, id: &str) {
        let mut state = self.state.lock();
        state.visible.remove(id);
        state.cancel(id);
    }

    /// Window focus changed. Losing focus cancels every timer; regaining it
    /// restarts timers for messages still visible.
    pub fn set_focused(&self, focused: bool) {
        let mut state = self.state.lock();
        if state.focused == focused {
            return;
        }
        state.focused = focused;
        if focused {
            let visible: Vec<String> = state.visible.iter().cloned().collect();
            for id in visible {
                self.arm(&mut state, id);
            }
        } else {
            state.cancel_all();
        }
    }

    /// Cancel everything; used when the conversation or identity changes.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.visible.clear();
        state.cancel_all();
    }

    /// Number of timers currently running.
    pub fn pending(&self) -> usize {
        self.state.lock().timers.len()
    }

    fn arm(&self, state: &mut TrackerState, id: String) {
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let deadline = tokio::time::Instant::now() + self.dwell;
        let shared = Arc::clone(&self.state);
        let fired = self.fired.clone();
        let key = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if !shared.lock().claim(&key, ticket) {
                return;
            }
            tracing::debug!(id = %key, "read dwell elapsed");
            let _ = fired.send(key);
        });
        if let Some((_, previous)) = state.timers.insert(id, (ticket, timer)) {
            previous.abort();
        }
    }
}

impl Drop for ReadTracker {
    fn drop(&mut self) {
        self.reset();
    }
}
