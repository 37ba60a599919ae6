//! At-most-once notification gate.
//!
//! Every notifiable event carries a deterministic key; the gate tracks a
//! bounded, insertion-ordered set of already-sent keys and refuses to
//! re-emit a duplicate. The bound keeps memory flat over months of uptime;
//! eviction is oldest-first, so a key only leaves the set long after its
//! signal completed.

use crate::events::MonitorEvent;
use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast;

pub struct NotificationGate {
    events: broadcast::Sender<MonitorEvent>,
    sent: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl NotificationGate {
    #[must_use]
    pub fn new(events: broadcast::Sender<MonitorEvent>, cap: usize) -> Self {
        Self {
            events,
            sent: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Marks a key as already delivered without emitting anything. Used
    /// when partially-hit state is reloaded from storage, so a restart
    /// cannot re-notify targets that fired before it.
    pub fn preseed(&mut self, key: String) {
        self.remember(key);
    }

    /// Emits an event unless its dedup key was already delivered.
    ///
    /// Returns whether the event was emitted. Delivery failure (no
    /// subscribers on the channel) is logged and does not undo the dedup
    /// bookkeeping: state transitions stay authoritative even when a
    /// notification goes nowhere.
    pub fn emit(&mut self, event: MonitorEvent) -> bool {
        if let Some(key) = event.dedup_key() {
            if self.sent.contains(&key) {
                tracing::debug!(%key, "duplicate notification suppressed");
                return false;
            }
            self.remember(key);
        }

        if let Err(err) = self.events.send(event) {
            tracing::warn!(error = %err, "notification delivery failed (no subscribers)");
        }
        true
    }

    #[must_use]
    pub fn seen(&self, key: &str) -> bool {
        self.sent.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    fn remember(&mut self, key: String) {
        if self.sent.contains(&key) {
            return;
        }
        while self.sent.len() >= self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.sent.remove(&oldest);
            } else {
                break;
            }
        }
        self.order.push_back(key.clone());
        self.sent.insert(key);
    }
}
