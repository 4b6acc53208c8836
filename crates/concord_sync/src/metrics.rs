//! Sync metrics.
//!
//! Counters and gauges are written only by the agent; callers get a
//! [`MetricsReport`] copy.

use crate::status::{AgentStatus, SyncMode};
use concord_core::VectorClock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Live metrics owned by one agent
#[derive(Debug, Clone)]
pub struct SyncMetrics {
    latency_samples: VecDeque<f64>,
    latency_window: usize,
    heartbeat_frequency: u64,
    rollback_events: u64,
    cluster_drift_index: f64,
    commit_integrity_score: f64,
}

impl SyncMetrics {
    /// Create metrics keeping at most `latency_window` latency samples
    #[must_use]
    pub fn new(latency_window: usize) -> Self {
        let latency_window = latency_window.max(1);
        Self {
            latency_samples: VecDeque::with_capacity(latency_window),
            latency_window,
            heartbeat_frequency: 0,
            rollback_events: 0,
            cluster_drift_index: 0.0,
            commit_integrity_score: 1.0,
        }
    }

    /// Record one sync latency sample in milliseconds
    pub fn record_latency(&mut self, millis: f64) {
        if self.latency_samples.len() == self.latency_window {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(millis);
    }

    /// Record a generated beat
    pub fn record_heartbeat(&mut self) {
        self.heartbeat_frequency += 1;
    }

    /// Record a drift resolution that created a rollback checkpoint
    pub fn record_rollback_event(&mut self) {
        self.rollback_events += 1;
    }

    /// Publish the latest drift ratio
    pub fn set_drift_index(&mut self, ratio: f64) {
        self.cluster_drift_index = ratio;
    }

    /// Mean of the retained latency samples, zero when there are none
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.latency_samples.is_empty() {
            return 0.0;
        }
        self.latency_samples.iter().sum::<f64>() / self.latency_samples.len() as f64
    }

    /// Beats generated so far
    #[must_use]
    pub fn heartbeat_frequency(&self) -> u64 {
        self.heartbeat_frequency
    }

    /// Rollback checkpoints created so far
    #[must_use]
    pub fn rollback_events(&self) -> u64 {
        self.rollback_events
    }

    /// Latest drift ratio
    #[must_use]
    pub fn cluster_drift_index(&self) -> f64 {
        self.cluster_drift_index
    }

    /// Placeholder, always 1.0
    #[must_use]
    pub fn commit_integrity_score(&self) -> f64 {
        self.commit_integrity_score
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Point-in-time copy of an agent's metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Reporting agent
    pub agent_id: String,
    /// Agent status
    pub status: AgentStatus,
    /// Current sync mode
    pub sync_mode: SyncMode,
    /// Mean over the rolling latency window
    pub average_sync_latency_ms: f64,
    /// Beats generated so far
    pub heartbeat_frequency: u64,
    /// Drift resolutions that created a checkpoint
    pub rollback_events: u64,
    /// Latest distinct/total checksum ratio
    pub cluster_drift_index: f64,
    /// Placeholder, always 1.0
    pub commit_integrity_score: f64,
    /// Live snapshots held
    pub active_snapshots: usize,
    /// Agent's clock at report time
    pub vector_clock: VectorClock,
}
