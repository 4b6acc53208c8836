//! CONCORD Synchronizer
//!
//! The coordinator that keeps per-node state snapshots loosely consistent:
//! it ingests state reports, detects drift, resolves conflicts by majority
//! vote, checkpoints before resolving and rolls back on request. It also
//! issues signed heartbeats ("beats") and tracks sync metrics.
//!
//! All mutable state of one agent sits behind a single mutex. Nothing runs in
//! the background; every operation completes inside the caller's call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod beat;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod quorum;
pub mod status;

pub use agent::{Conflict, SyncRequest, SyncResult, SynchronizerAgent};
pub use beat::{BeatSigner, SyncBeat};
pub use config::SyncConfig;
pub use error::{AgentError, AgentResult};
pub use events::SyncEvent;
pub use metrics::{MetricsReport, SyncMetrics};
pub use quorum::{DEFAULT_MAX_PROPOSALS, QuorumChecker, QuorumOutcome};
pub use status::{AgentStatus, SyncMode};
