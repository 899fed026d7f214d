//! Debounced change-event queue between the UI layer and the engine.
//!
//! Rapid UI edits produce a burst of change events; recomputing schemas and
//! previews per keystroke would be wasteful. The queue coalesces events over a
//! short quiet window (100 ms by default) so a consumer thread wakes once per
//! burst with a deduplicated set of changes. The engine only owns the queue
//! and the drain logic; the consumer thread belongs to the UI layer.

use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::Duration;

/// Something upstream of a recomputation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// One node's settings changed; preview recomputation can be restricted
    /// to its descendants.
    NodeChanged(String),
    /// A source schema changed; everything must be repropagated.
    MetaChanged,
}

/// A multi-producer, single-consumer queue of [`ChangeEvent`]s with a
/// coalescing drain.
pub struct UpdateQueue {
    tx: Sender<ChangeEvent>,
    rx: Mutex<Receiver<ChangeEvent>>,
    window: Duration,
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::with_window(Duration::from_millis(100))
    }
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            window,
        }
    }

    /// A cloneable handle for producers (UI callbacks).
    pub fn sender(&self) -> Sender<ChangeEvent> {
        self.tx.clone()
    }

    pub fn push(&self, event: ChangeEvent) {
        // The receiver lives as long as the queue, so send cannot fail.
        let _ = self.tx.send(event);
    }

    /// Drains everything currently queued without waiting, deduplicated.
    pub fn try_drain(&self) -> Vec<ChangeEvent> {
        // A consumer that panicked mid-drain left the channel intact; recover
        // the guard instead of wedging every later caller.
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            push_dedup(&mut events, event);
        }
        events
    }

    /// Blocks up to `timeout` for a first event, then keeps collecting until
    /// the queue stays quiet for one coalescing window. Returns `None` when
    /// no event arrived at all.
    pub fn wait_coalesced(&self, timeout: Duration) -> Option<Vec<ChangeEvent>> {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        let first = match rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };
        let mut events = vec![first];
        while let Ok(event) = rx.recv_timeout(self.window) {
            push_dedup(&mut events, event);
        }
        Some(events)
    }
}

fn push_dedup(events: &mut Vec<ChangeEvent>, event: ChangeEvent) {
    if !events.contains(&event) {
        events.push(event);
    }
}
