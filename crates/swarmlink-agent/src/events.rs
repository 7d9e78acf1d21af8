//! Per-agent event log: pub/sub with a bounded history ring.

use std::collections::VecDeque;
use std::sync::Mutex;
use swarmlink_types::FederationEvent;
use tokio::sync::broadcast;

/// Maximum events retained in the history ring buffer.
const HISTORY_SIZE: usize = 256;

/// Capacity of the live broadcast channel.
const CHANNEL_CAPACITY: usize = 1024;

/// One agent's event stream plus a ring of recent history.
///
/// Emitting never blocks and never fails: subscribers that lag are
/// skipped by the broadcast channel, and the history ring drops its
/// oldest entry when full.
pub struct EventLog {
    sender: broadcast::Sender<FederationEvent>,
    history: Mutex<VecDeque<FederationEvent>>,
}

impl EventLog {
    /// Create an empty event log.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_SIZE)),
        }
    }

    /// Record an event and fan it out to live subscribers.
    pub fn emit(&self, event: FederationEvent) {
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.sender.subscribe()
    }

    /// The most recent events, newest first.
    pub fn history(&self, limit: usize) -> Vec<FederationEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
