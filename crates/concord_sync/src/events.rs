//! Events published to subscribers such as dashboards and alerting.

use concord_core::Timestamp;
use concord_state::StateSnapshot;
use serde::{Deserialize, Serialize};

/// Egress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Drift was resolved by majority vote
    DriftResolved {
        /// Majority state
        resolved_state: StateSnapshot,
        /// Checkpoint taken before resolving
        checkpoint_id: String,
        /// Every node whose snapshot took part
        affected_nodes: Vec<String>,
    },
    /// The live view was reverted to a checkpoint
    RollbackCompleted {
        /// Checkpoint restored
        checkpoint_id: String,
        /// Capture time of the restored snapshot
        timestamp: Timestamp,
    },
}

impl SyncEvent {
    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DriftResolved { .. } => "drift_resolved",
            Self::RollbackCompleted { .. } => "rollback_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_matches_name() {
        let event = SyncEvent::RollbackCompleted {
            checkpoint_id: "c1".to_string(),
            timestamp: Timestamp::from_millis(7),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["checkpoint_id"], "c1");
        assert_eq!(json["timestamp"], 7);
    }
}
