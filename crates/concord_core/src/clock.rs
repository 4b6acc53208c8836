//! Vector clocks for causal ordering between nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Causal relation between two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    /// Every counter is `<=` the other's and at least one is `<`
    Before,
    /// Every counter is `>=` the other's and at least one is `>`
    After,
    /// Neither clock dominates: the histories diverged, or they are identical
    Concurrent,
}

/// Per-node logical counters
///
/// Missing nodes read as zero. Serializes as a plain `{node: counter}` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock with `node_id` registered at zero
    #[must_use]
    pub fn for_node(node_id: &str) -> Self {
        let mut clocks = BTreeMap::new();
        clocks.insert(node_id.to_string(), 0);
        Self { clocks }
    }

    /// Increment the counter for `node_id`, starting from zero if unknown
    pub fn tick(&mut self, node_id: &str) {
        let counter = self.clocks.entry(node_id.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    /// Counter for `node_id`
    #[must_use]
    pub fn get(&self, node_id: &str) -> u64 {
        self.clocks.get(node_id).copied().unwrap_or(0)
    }

    /// Element-wise maximum with `other`
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &value) in &other.clocks {
            let entry = self.clocks.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    /// Merged copy of `self` and `other`
    #[must_use]
    pub fn merged(&self, other: &VectorClock) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Causal relation of `self` relative to `other`
    #[must_use]
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_greater = false;
        let mut other_greater = false;

        for node in self.clocks.keys().chain(other.clocks.keys()) {
            let mine = self.get(node);
            let theirs = other.get(node);
            if mine > theirs {
                self_greater = true;
            } else if theirs > mine {
                other_greater = true;
            }
        }

        match (self_greater, other_greater) {
            (true, false) => ClockOrdering::After,
            (false, true) => ClockOrdering::Before,
            _ => ClockOrdering::Concurrent,
        }
    }

    /// Largest per-node counter gap between the two clocks
    #[must_use]
    pub fn max_divergence(&self, other: &VectorClock) -> u64 {
        self.clocks
            .keys()
            .chain(other.clocks.keys())
            .map(|node| self.get(node).abs_diff(other.get(node)))
            .max()
            .unwrap_or(0)
    }

    /// Borrow the underlying map
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.clocks
    }

    /// Consume into the underlying map
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, u64> {
        self.clocks
    }

    /// Number of nodes tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Whether no node has been seen
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(clocks: BTreeMap<String, u64>) -> Self {
        Self { clocks }
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (node, value)) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", node, value)?;
        }
        write!(f, "}}")
    }
}
