//! Vector clocks: the causality primitive for federation sync.
//!
//! A [`VectorClock`] maps node ids to event counters. Comparing two clocks
//! yields a causal ordering or detects that they are concurrent. All clock
//! operations are pure; the stateful [`ClockManager`] wraps a single node's
//! clock for use in sync cycles. Conflict *resolution* never happens here:
//! callers apply last-write-wins by wall-clock timestamp after a conflict
//! is flagged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    /// Every counter matches.
    Equal,
    /// The left clock causally precedes the right.
    Before,
    /// The left clock causally follows the right.
    After,
    /// Neither clock precedes the other.
    Concurrent,
}

/// A per-node counter map.
///
/// Serializes as a plain JSON object (`{"node": counter}`). A node only
/// ever advances its own counter; counters for other nodes change through
/// [`VectorClock::merge`] and never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    /// Create a clock seeded with `node` at zero.
    pub fn with_node(node: impl Into<String>) -> Self {
        let mut counters = BTreeMap::new();
        counters.insert(node.into(), 0);
        Self { counters }
    }

    /// Counter for `node`; zero if the node is unknown.
    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Return a new clock with `node`'s counter advanced by one.
    pub fn increment(&self, node: &str) -> VectorClock {
        let mut counters = self.counters.clone();
        *counters.entry(node.to_string()).or_insert(0) += 1;
        Self { counters }
    }

    /// Return the pointwise maximum of both clocks.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut counters = self.counters.clone();
        for (node, &counter) in &other.counters {
            let entry = counters.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
        Self { counters }
    }

    /// Compare two clocks over the union of their nodes.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;
        for node in self.counters.keys().chain(other.counters.keys()) {
            let ours = self.get(node);
            let theirs = other.get(node);
            if ours < theirs {
                less = true;
            }
            if ours > theirs {
                greater = true;
            }
        }
        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// True when this clock causally precedes `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    /// True when neither clock precedes the other.
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Nodes known to this clock.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.counters.keys().map(String::as_str)
    }

    /// True when no node has been recorded.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Number of nodes recorded.
    pub fn len(&self) -> usize {
        self.counters.len()
    }
}

/// Tracks one node's view of causality across the federation.
///
/// `tick` advances the node's own counter; `merge` folds in a remote clock
/// without ticking. A sync cycle that incorporates remote knowledge as a
/// local event uses `merge_and_tick`.
#[derive(Debug, Clone)]
pub struct ClockManager {
    node_id: String,
    clock: VectorClock,
}

impl ClockManager {
    /// Create a manager for `node_id` with its counter seeded at zero.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let clock = VectorClock::with_node(node_id.as_str());
        Self { node_id, clock }
    }

    /// Advance this node's own counter and return the new clock.
    pub fn tick(&mut self) -> VectorClock {
        self.clock = self.clock.increment(&self.node_id);
        self.clock.clone()
    }

    /// Fold a remote clock into the local one without ticking.
    pub fn merge(&mut self, remote: &VectorClock) {
        self.clock = self.clock.merge(remote);
    }

    /// Merge a remote clock, then advance the own counter once.
    pub fn merge_and_tick(&mut self, remote: &VectorClock) -> VectorClock {
        self.clock = self.clock.merge(remote);
        self.tick()
    }

    /// True when `remote` is concurrent with the local clock.
    pub fn detect_conflict(&self, remote: &VectorClock) -> bool {
        self.clock.is_concurrent_with(remote)
    }

    /// Snapshot of the current clock.
    pub fn current(&self) -> VectorClock {
        self.clock.clone()
    }

    /// The node this manager ticks for.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}
