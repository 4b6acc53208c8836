//! Agent status and sync mode.

use serde::{Deserialize, Serialize};

/// How the agent synchronizes
///
/// Only [`SyncMode::SteadyBeat`] is driven today. The other modes are
/// declared for wire compatibility; nothing transitions into them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    /// Regular beats, full-state reports
    #[default]
    SteadyBeat,
    /// Only diffs travel between nodes
    DeltaOnly,
    /// Every resolution goes through a vote
    MajorityVote,
    /// Node rejoining after a partition
    IsolatedReconverge,
}

/// Liveness of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    /// Operating normally
    #[default]
    Alive,
    /// Operating with reduced guarantees
    Degraded,
    /// Shut down
    Offline,
    /// Restoring from a checkpoint
    Recovering,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SteadyBeat => "STEADY_BEAT",
            Self::DeltaOnly => "DELTA_ONLY",
            Self::MajorityVote => "MAJORITY_VOTE",
            Self::IsolatedReconverge => "ISOLATED_RECONVERGE",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Alive => "ALIVE",
            Self::Degraded => "DEGRADED",
            Self::Offline => "OFFLINE",
            Self::Recovering => "RECOVERING",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&SyncMode::IsolatedReconverge).unwrap(), "\"ISOLATED_RECONVERGE\"");
        assert_eq!(serde_json::to_string(&AgentStatus::Alive).unwrap(), "\"ALIVE\"");
        assert_eq!(SyncMode::DeltaOnly.to_string(), "DELTA_ONLY");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SyncMode::default(), SyncMode::SteadyBeat);
        assert_eq!(AgentStatus::default(), AgentStatus::Alive);
    }
}
