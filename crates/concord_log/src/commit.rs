//! Commit log entries.

use concord_core::{Hash, Timestamp, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a commit records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// A node reported new state
    StateUpdate { node_id: String },
    /// The live view was reverted to a checkpoint
    Rollback { checkpoint_id: String },
    /// Drift across nodes was resolved by majority vote
    DriftResolved { checkpoint_id: String },
}

impl Operation {
    /// Checkpoint this operation refers to, if any
    #[must_use]
    pub fn checkpoint_id(&self) -> Option<&str> {
        match self {
            Self::StateUpdate { .. } => None,
            Self::Rollback { checkpoint_id } | Self::DriftResolved { checkpoint_id } => {
                Some(checkpoint_id)
            }
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateUpdate { node_id } => write!(f, "state_update_{}", node_id),
            Self::Rollback { checkpoint_id } => write!(f, "rollback_to_{}", checkpoint_id),
            Self::DriftResolved { checkpoint_id } => write!(f, "drift_resolved_{}", checkpoint_id),
        }
    }
}

/// One durable fact in the commit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEntry {
    /// When the commit was appended
    pub timestamp: Timestamp,
    /// What happened
    pub operation: Operation,
    /// Checksum of the state the operation produced
    pub state_hash: Hash,
    /// Nodes whose state the operation touched
    pub affected_nodes: Vec<String>,
    /// Coordinator clock at commit time
    pub vector_clock: VectorClock,
    /// Extra data needed to undo the operation
    pub rollback_data: Option<Value>,
}

impl CommitEntry {
    /// Create an entry stamped with the current time
    #[must_use]
    pub fn new(operation: Operation, state_hash: Hash, vector_clock: VectorClock) -> Self {
        Self {
            timestamp: Timestamp::now(),
            operation,
            state_hash,
            affected_nodes: Vec::new(),
            vector_clock,
            rollback_data: None,
        }
    }

    /// Set the affected nodes
    #[must_use]
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = String>) -> Self {
        self.affected_nodes = nodes.into_iter().collect();
        self
    }

    /// Attach rollback data
    #[must_use]
    pub fn with_rollback_data(mut self, data: Value) -> Self {
        self.rollback_data = Some(data);
        self
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_display() {
        let op = Operation::StateUpdate { node_id: "vault1".to_string() };
        assert_eq!(op.to_string(), "state_update_vault1");
        assert_eq!(op.checkpoint_id(), None);

        let op = Operation::Rollback { checkpoint_id: "c1".to_string() };
        assert_eq!(op.to_string(), "rollback_to_c1");
        assert_eq!(op.checkpoint_id(), Some("c1"));
    }

    #[test]
    fn test_entry_builder() {
        let entry = CommitEntry::new(
            Operation::DriftResolved { checkpoint_id: "cp".to_string() },
            Hash::compute(b"state"),
            VectorClock::for_node("SYNC-1"),
        )
        .with_nodes(["a".to_string(), "b".to_string()])
        .with_rollback_data(json!({"checkpoint_id": "cp"}))
        .at(Timestamp::from_millis(5));

        assert_eq!(entry.timestamp, Timestamp::from_millis(5));
        assert_eq!(entry.affected_nodes, vec!["a", "b"]);
        assert!(entry.rollback_data.is_some());
    }

    #[test]
    fn test_operation_serializes_tagged() {
        let op = Operation::Rollback { checkpoint_id: "c1".to_string() };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, json!({"kind": "rollback", "checkpoint_id": "c1"}));
    }
}
