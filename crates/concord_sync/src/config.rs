//! Synchronizer configuration.

use crate::error::{AgentError, AgentResult};
use crate::quorum::DEFAULT_MAX_PROPOSALS;
use concord_log::{DEFAULT_MAX_CHECKPOINTS, DEFAULT_MAX_ENTRIES};
use serde::{Deserialize, Serialize};

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identity of this agent in beats and vector clocks
    pub agent_id: String,
    /// Commit log capacity before the oldest half is evicted
    pub max_log_entries: usize,
    /// Checkpoints retained before the oldest is evicted
    pub max_checkpoints: usize,
    /// Drift is reported when distinct/total checksums exceeds this ratio
    pub drift_threshold: f64,
    /// Latency samples kept for the rolling average
    pub latency_window: usize,
    /// Logical-clock gap to a peer that triggers a divergence warning
    pub clock_drift_threshold: u64,
    /// Votes needed to decide a proposal
    pub quorum_size: usize,
    /// Proposals tracked before the oldest is dropped
    pub max_proposals: usize,
    /// Buffered events per subscriber before the slowest one lags
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Create a config for `agent_id` with defaults everywhere else
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            max_log_entries: DEFAULT_MAX_ENTRIES,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            drift_threshold: 0.5,
            latency_window: 100,
            clock_drift_threshold: 5,
            quorum_size: 3,
            max_proposals: DEFAULT_MAX_PROPOSALS,
            event_capacity: 64,
        }
    }

    /// Set commit log capacity
    #[must_use]
    pub fn with_max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = max;
        self
    }

    /// Set checkpoint capacity
    #[must_use]
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    /// Set how many proposals are tracked
    #[must_use]
    pub fn with_max_proposals(mut self, max: usize) -> Self {
        self.max_proposals = max;
        self
    }

    /// Set drift threshold
    #[must_use]
    pub fn with_drift_threshold(mut self, threshold: f64) -> Self {
        self.drift_threshold = threshold;
        self
    }

    /// Set latency window
    #[must_use]
    pub fn with_latency_window(mut self, window: usize) -> Self {
        self.latency_window = window;
        self
    }

    /// Set clock divergence warning threshold
    #[must_use]
    pub fn with_clock_drift_threshold(mut self, ticks: u64) -> Self {
        self.clock_drift_threshold = ticks;
        self
    }

    /// Set quorum size
    #[must_use]
    pub fn with_quorum_size(mut self, size: usize) -> Self {
        self.quorum_size = size;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> AgentResult<()> {
        let invalid = |field: &str, reason: &str| {
            Err(AgentError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.agent_id.is_empty() {
            return invalid("agent_id", "must not be empty");
        }
        if self.max_log_entries < 2 {
            return invalid("max_log_entries", "must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return invalid("drift_threshold", "must be within [0, 1]");
        }
        if self.latency_window == 0 {
            return invalid("latency_window", "must be positive");
        }
        if self.max_checkpoints == 0 {
            return invalid("max_checkpoints", "must be positive");
        }
        if self.quorum_size == 0 {
            return invalid("quorum_size", "must be positive");
        }
        if self.max_proposals == 0 {
            return invalid("max_proposals", "must be positive");
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity", "must be positive");
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("SYNC-CONCORD-001")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.agent_id, "SYNC-CONCORD-001");
        assert_eq!(config.max_log_entries, 10_000);
        assert_eq!(config.drift_threshold, 0.5);
        assert_eq!(config.latency_window, 100);
        assert_eq!(config.max_checkpoints, 1_000);
        assert_eq!(config.max_proposals, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = SyncConfig::new("SYNC-X")
            .with_max_log_entries(20)
            .with_drift_threshold(0.75)
            .with_quorum_size(5);
        assert_eq!(config.agent_id, "SYNC-X");
        assert_eq!(config.max_log_entries, 20);
        assert_eq!(config.drift_threshold, 0.75);
        assert_eq!(config.quorum_size, 5);
    }

    #[test]
    fn test_config_validation() {
        let err = SyncConfig::default().with_drift_threshold(1.5).validate().unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig { ref field, .. } if field == "drift_threshold"));

        assert!(SyncConfig::new("").validate().is_err());
        assert!(SyncConfig::default().with_latency_window(0).validate().is_err());
        assert!(SyncConfig::default().with_max_proposals(0).validate().is_err());
        assert!(SyncConfig::default().with_max_checkpoints(0).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"agent_id": "SYNC-J", "quorum_size": 2}"#).unwrap();
        assert_eq!(config.agent_id, "SYNC-J");
        assert_eq!(config.quorum_size, 2);
        assert_eq!(config.max_log_entries, 10_000);
    }
}
