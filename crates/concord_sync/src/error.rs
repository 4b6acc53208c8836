//! Synchronizer errors.

use concord_core::CoreError;
use concord_log::RecoveryError;
use concord_state::DifferError;

/// Synchronizer result type
pub type AgentResult<T> = Result<T, AgentError>;

/// Synchronizer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// State could not be canonically encoded
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Conflict resolution failed
    #[error(transparent)]
    Differ(#[from] DifferError),

    /// Commit log or checkpoint lookup failed
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Beat from an agent with no registered secret
    #[error("Untrusted peer: {0}")]
    UntrustedPeer(String),

    /// Beat signature does not match its payload
    #[error("Invalid beat signature from {0}")]
    InvalidSignature(String),

    /// Beat sequence number did not advance
    #[error("Stale beat from {agent_id}: sequence {received} <= {last_seen}")]
    StaleBeat {
        /// Sending agent
        agent_id: String,
        /// Sequence number on the rejected beat
        received: u64,
        /// Highest sequence number already accepted
        last_seen: u64,
    },

    /// Vote on an unknown proposal
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    /// Configuration value out of range
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::StaleBeat {
            agent_id: "SYNC-B".to_string(),
            received: 3,
            last_seen: 5,
        };
        assert_eq!(err.to_string(), "Stale beat from SYNC-B: sequence 3 <= 5");

        let err: AgentError = DifferError::EmptyInput.into();
        assert_eq!(err.to_string(), "No snapshots to resolve");
    }

    #[test]
    fn test_recovery_error_converts() {
        let err: AgentError = RecoveryError::CheckpointNotFound("c9".to_string()).into();
        assert!(matches!(err, AgentError::Recovery(_)));
        assert!(err.to_string().contains("c9"));
    }
}
