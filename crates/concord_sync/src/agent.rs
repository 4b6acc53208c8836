//! The synchronizer agent.
//!
//! Owns the live snapshot map, the vector clock, the commit log and the
//! checkpoint store for one coordinator instance. One mutex guards all of it,
//! so concurrent `receive_state` / `resolve_drift` / `rollback_to_checkpoint`
//! calls observe each other's effects atomically.

use crate::beat::{BeatSigner, SyncBeat};
use crate::config::SyncConfig;
use crate::error::{AgentError, AgentResult};
use crate::events::SyncEvent;
use crate::metrics::{MetricsReport, SyncMetrics};
use crate::quorum::{QuorumChecker, QuorumOutcome};
use crate::status::{AgentStatus, SyncMode};
use concord_core::{Hash, Timestamp, VectorClock};
use concord_log::{CommitEntry, Operation, RecoveryManager};
use concord_state::{StateData, StateDiffer, StateSnapshot};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tokio::sync::{Mutex, broadcast};

/// Peer-to-peer sync request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Node whose state is being offered
    pub node_id: String,
    /// Offered state
    pub state: StateData,
    /// Sender's clock, merged into ours when present
    #[serde(default)]
    pub vector_clock: Option<VectorClock>,
    /// Sender's version, defaults to 1
    #[serde(default)]
    pub version: Option<u64>,
}

/// One key on which local and remote state disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// State key
    pub key: String,
    /// Local value, absent if the key is missing locally
    pub local: Option<Value>,
    /// Remote value, absent if the key is missing remotely
    pub remote: Option<Value>,
}

/// Outcome of comparing a remote snapshot with the local one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// The comparison ran
    pub success: bool,
    /// Local and remote agree, or the remote was adopted
    pub consistent: bool,
    /// Disagreeing keys, when inconsistent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<Conflict>>,
    /// Suggested merge of local and remote; not applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_state: Option<StateSnapshot>,
}

impl SyncResult {
    fn consistent() -> Self {
        Self {
            success: true,
            consistent: true,
            conflicts: None,
            resolved_state: None,
        }
    }
}

struct PeerState {
    signer: BeatSigner,
    last_sequence: u64,
}

/// Everything behind the agent's mutex
struct AgentState {
    clock: VectorClock,
    /// Live view in first-report order; a repeat report keeps its slot
    snapshots: IndexMap<String, StateSnapshot>,
    recovery: RecoveryManager,
    mode: SyncMode,
    status: AgentStatus,
    sequence_number: u64,
    metrics: SyncMetrics,
    quorum: QuorumChecker,
    peers: BTreeMap<String, PeerState>,
}

impl AgentState {
    /// Replace the node's snapshot and record the update
    fn store_snapshot(&mut self, snapshot: StateSnapshot) {
        let entry = CommitEntry::new(
            Operation::StateUpdate {
                node_id: snapshot.node_id.clone(),
            },
            snapshot.checksum,
            self.clock.clone(),
        )
        .with_nodes([snapshot.node_id.clone()]);
        self.recovery.log_commit(entry);

        tracing::debug!(
            node_id = %snapshot.node_id,
            version = snapshot.version,
            checksum = %snapshot.checksum,
            "State received"
        );
        self.snapshots.insert(snapshot.node_id.clone(), snapshot);
    }

    /// Distinct checksums over total snapshots; `None` below two snapshots
    fn drift_ratio(&self) -> Option<f64> {
        if self.snapshots.len() < 2 {
            return None;
        }
        let distinct: BTreeSet<&Hash> = self.snapshots.values().map(|s| &s.checksum).collect();
        Some(distinct.len() as f64 / self.snapshots.len() as f64)
    }

    fn detect_drift(&mut self, threshold: f64) -> bool {
        match self.drift_ratio() {
            Some(ratio) => {
                self.metrics.set_drift_index(ratio);
                ratio > threshold
            }
            None => false,
        }
    }

    fn synchronize(&mut self, differ: &StateDiffer, remote: StateSnapshot) -> AgentResult<SyncResult> {
        if !self.snapshots.contains_key(&remote.node_id) {
            let adopted = StateSnapshot::capture(remote.node_id, remote.data, remote.version)?;
            self.store_snapshot(adopted);
            return Ok(SyncResult::consistent());
        }

        let local = &self.snapshots[&remote.node_id];
        let diff = differ.diff(local, &remote);
        if diff.is_empty() {
            return Ok(SyncResult::consistent());
        }

        let resolved = differ.resolve_conflicts(&[local.clone(), remote])?;
        let conflicts = diff
            .into_iter()
            .map(|(key, field)| Conflict {
                key,
                local: field.left,
                remote: field.right,
            })
            .collect();

        Ok(SyncResult {
            success: true,
            consistent: false,
            conflicts: Some(conflicts),
            resolved_state: Some(resolved),
        })
    }
}

/// State-synchronization coordinator for one node
pub struct SynchronizerAgent {
    config: SyncConfig,
    differ: StateDiffer,
    signer: BeatSigner,
    state: Mutex<AgentState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SynchronizerAgent {
    /// Create an agent; its beat secret is derived from the id and the current time
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let signer = BeatSigner::derive(&config.agent_id, Timestamp::now());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let state = AgentState {
            clock: VectorClock::for_node(&config.agent_id),
            snapshots: IndexMap::new(),
            recovery: RecoveryManager::new(config.max_log_entries)
                .with_max_checkpoints(config.max_checkpoints),
            mode: SyncMode::default(),
            status: AgentStatus::default(),
            sequence_number: 0,
            metrics: SyncMetrics::new(config.latency_window),
            quorum: QuorumChecker::new(config.quorum_size).with_max_proposals(config.max_proposals),
            peers: BTreeMap::new(),
        };

        Self {
            config,
            differ: StateDiffer::new(),
            signer,
            state: Mutex::new(state),
            events,
        }
    }

    /// This agent's id
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to `drift_resolved` / `rollback_completed` events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Secret peers need in order to verify this agent's beats
    #[must_use]
    pub fn beat_secret(&self) -> [u8; 32] {
        self.signer.secret()
    }

    /// Mark the agent alive
    pub async fn start(&self) {
        self.state.lock().await.status = AgentStatus::Alive;
        tracing::info!(agent_id = %self.config.agent_id, "Synchronizer agent started");
    }

    /// Mark the agent offline
    pub async fn shutdown(&self) {
        self.state.lock().await.status = AgentStatus::Offline;
        tracing::info!(agent_id = %self.config.agent_id, "Synchronizer agent stopped");
    }

    /// Current status
    pub async fn status(&self) -> AgentStatus {
        self.state.lock().await.status
    }

    /// Current sync mode
    pub async fn sync_mode(&self) -> SyncMode {
        self.state.lock().await.mode
    }

    /// Produce the next signed beat
    ///
    /// Advances the sequence number and this agent's clock entry.
    ///
    /// # Errors
    ///
    /// Returns error if the beat payload cannot be canonically encoded
    pub async fn generate_beat(&self) -> AgentResult<SyncBeat> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let state_hash = self.differ.compute_hash(&json!({
            "snapshots": state.snapshots.len(),
            "mode": state.mode,
            "status": state.status,
        }))?;

        state.sequence_number += 1;
        state.clock.tick(&self.config.agent_id);
        state.metrics.record_heartbeat();

        let mut beat = SyncBeat {
            timestamp: Timestamp::now(),
            agent_id: self.config.agent_id.clone(),
            status: state.status,
            vector_clock: state.clock.clone(),
            state_hash,
            signature: String::new(),
            sequence_number: state.sequence_number,
        };
        self.signer.sign_beat(&mut beat)?;
        Ok(beat)
    }

    /// Accept beats from `agent_id` signed with `secret`
    pub async fn trust_peer(&self, agent_id: impl Into<String>, secret: [u8; 32]) {
        let agent_id = agent_id.into();
        tracing::debug!(peer = %agent_id, "Peer trusted");
        self.state.lock().await.peers.insert(
            agent_id,
            PeerState {
                signer: BeatSigner::from_secret(secret),
                last_sequence: 0,
            },
        );
    }

    /// Ingest a peer's beat
    ///
    /// A verified beat merges the peer's clock into ours and records the
    /// beat's age as a latency sample.
    ///
    /// # Errors
    ///
    /// Returns error if the peer is not trusted, the signature is wrong, or
    /// the sequence number did not advance
    pub async fn receive_beat(&self, beat: &SyncBeat) -> AgentResult<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(peer) = state.peers.get_mut(&beat.agent_id) else {
            tracing::warn!(peer = %beat.agent_id, "Beat from untrusted peer");
            return Err(AgentError::UntrustedPeer(beat.agent_id.clone()));
        };
        if !peer.signer.verify(beat) {
            tracing::warn!(peer = %beat.agent_id, "Invalid beat signature");
            return Err(AgentError::InvalidSignature(beat.agent_id.clone()));
        }
        if beat.sequence_number <= peer.last_sequence {
            return Err(AgentError::StaleBeat {
                agent_id: beat.agent_id.clone(),
                received: beat.sequence_number,
                last_seen: peer.last_sequence,
            });
        }
        peer.last_sequence = beat.sequence_number;

        let divergence = state.clock.max_divergence(&beat.vector_clock);
        if divergence > self.config.clock_drift_threshold {
            tracing::warn!(
                peer = %beat.agent_id,
                divergence,
                threshold = self.config.clock_drift_threshold,
                "Logical clock divergence"
            );
        }

        state.clock.merge(&beat.vector_clock);
        state.clock.tick(&self.config.agent_id);

        let latency = Timestamp::now().millis_since(beat.timestamp) as f64;
        state.metrics.record_latency(latency);
        tracing::debug!(peer = %beat.agent_id, sequence = beat.sequence_number, latency, "Beat processed");
        Ok(())
    }

    /// Store a node's reported state, replacing its previous snapshot
    ///
    /// # Errors
    ///
    /// Returns error if `data` cannot be canonically encoded
    pub async fn receive_state(
        &self,
        node_id: impl Into<String>,
        data: StateData,
        version: u64,
    ) -> AgentResult<StateSnapshot> {
        let snapshot = StateSnapshot::capture(node_id, data, version)?;
        self.state.lock().await.store_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Whether the share of distinct checksums exceeds the drift threshold
    ///
    /// Publishes the ratio as `cluster_drift_index` whenever at least two
    /// snapshots are known.
    pub async fn detect_drift(&self) -> bool {
        self.state.lock().await.detect_drift(self.config.drift_threshold)
    }

    /// Resolve drift by majority vote across all snapshots
    ///
    /// Checkpoints the earliest-reported snapshot before resolving, logs a
    /// commit, opens an advisory quorum proposal and emits `drift_resolved`.
    /// The resolved state is returned, not applied. Any failure is logged and
    /// reported as `None`.
    pub async fn resolve_drift(&self) -> Option<StateSnapshot> {
        let (resolved, checkpoint_id, affected_nodes) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            if !state.detect_drift(self.config.drift_threshold) {
                return None;
            }

            let snapshots: Vec<StateSnapshot> = state.snapshots.values().cloned().collect();
            let resolved = match self.differ.resolve_conflicts(&snapshots) {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::error!(error = %err, snapshots = snapshots.len(), "Failed to resolve drift");
                    return None;
                }
            };

            let first = snapshots.first()?.clone();
            let pre_resolution = first.checksum;
            let checkpoint_id = format!(
                "pre_resolve_{}_{}",
                Timestamp::now().as_millis(),
                state.metrics.rollback_events() + 1
            );
            state.recovery.create_checkpoint(checkpoint_id.clone(), first);
            state.metrics.record_rollback_event();

            let affected_nodes: Vec<String> = snapshots.iter().map(|s| s.node_id.clone()).collect();
            let entry = CommitEntry::new(
                Operation::DriftResolved {
                    checkpoint_id: checkpoint_id.clone(),
                },
                resolved.checksum,
                state.clock.clone(),
            )
            .with_nodes(affected_nodes.iter().cloned())
            .with_rollback_data(json!({
                "checkpoint_id": checkpoint_id,
                "pre_resolution_checksum": pre_resolution,
            }));
            state.recovery.log_commit(entry);

            let proposal_id = format!("drift_resolve_{checkpoint_id}");
            state.quorum.initiate_vote(
                proposal_id.clone(),
                json!({
                    "action": "resolve_drift",
                    "checkpoint_id": checkpoint_id,
                    "resolved_checksum": resolved.checksum,
                }),
            );

            tracing::info!(
                checkpoint_id = %checkpoint_id,
                proposal_id = %proposal_id,
                conflicting_states = snapshots.len(),
                "Drift resolved"
            );
            (resolved, checkpoint_id, affected_nodes)
        };

        // No subscribers is fine.
        let _ = self.events.send(SyncEvent::DriftResolved {
            resolved_state: resolved.clone(),
            checkpoint_id,
            affected_nodes,
        });
        Some(resolved)
    }

    /// Checkpoint the current snapshot of `node_id` under `checkpoint_id`
    ///
    /// Returns `false` if the node has no snapshot.
    pub async fn checkpoint_node(&self, checkpoint_id: impl Into<String>, node_id: &str) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match state.snapshots.get(node_id) {
            Some(snapshot) => {
                state.recovery.create_checkpoint(checkpoint_id, snapshot.clone());
                true
            }
            None => false,
        }
    }

    /// Revert the live view to a single checkpointed snapshot
    ///
    /// Destructive: every other node's snapshot is discarded. Returns `false`
    /// when the checkpoint does not exist.
    pub async fn rollback_to_checkpoint(&self, checkpoint_id: &str) -> bool {
        let timestamp = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let Some(checkpoint) = state.recovery.get_checkpoint(checkpoint_id).cloned() else {
                tracing::error!(checkpoint_id, "Checkpoint not found");
                return false;
            };

            state.snapshots.clear();
            let entry = CommitEntry::new(
                Operation::Rollback {
                    checkpoint_id: checkpoint_id.to_string(),
                },
                checkpoint.checksum,
                state.clock.clone(),
            )
            .with_nodes([checkpoint.node_id.clone()]);
            state.recovery.log_commit(entry);

            let timestamp = checkpoint.timestamp;
            state.snapshots.insert(checkpoint.node_id.clone(), checkpoint);
            timestamp
        };

        let _ = self.events.send(SyncEvent::RollbackCompleted {
            checkpoint_id: checkpoint_id.to_string(),
            timestamp,
        });
        tracing::info!(checkpoint_id, "Rollback successful");
        true
    }

    /// Compare a remote snapshot with the local one for the same node
    ///
    /// An unknown node is adopted. A disagreement is reported with a
    /// suggested resolution; the stored snapshot is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if state cannot be canonically encoded
    pub async fn synchronize_state(&self, remote: StateSnapshot) -> AgentResult<SyncResult> {
        self.state.lock().await.synchronize(&self.differ, remote)
    }

    /// Handle a peer sync request
    ///
    /// Merges the sender's clock, ticks ours, then behaves like
    /// [`Self::synchronize_state`]. The elapsed time is recorded as a
    /// latency sample whether or not the request succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if state cannot be canonically encoded
    pub async fn process(&self, request: SyncRequest) -> AgentResult<SyncResult> {
        let started = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(remote_clock) = &request.vector_clock {
            state.clock.merge(remote_clock);
        }
        state.clock.tick(&self.config.agent_id);

        let result = StateSnapshot::capture(request.node_id, request.state, request.version.unwrap_or(1))
            .map_err(AgentError::from)
            .and_then(|remote| state.synchronize(&self.differ, remote));

        state.metrics.record_latency(started.elapsed().as_secs_f64() * 1000.0);
        if let Err(err) = &result {
            tracing::error!(error = %err, "Sync process failed");
        }
        result
    }

    /// Point-in-time metrics
    pub async fn metrics(&self) -> MetricsReport {
        let state = self.state.lock().await;
        MetricsReport {
            agent_id: self.config.agent_id.clone(),
            status: state.status,
            sync_mode: state.mode,
            average_sync_latency_ms: state.metrics.average_latency_ms(),
            heartbeat_frequency: state.metrics.heartbeat_frequency(),
            rollback_events: state.metrics.rollback_events(),
            cluster_drift_index: state.metrics.cluster_drift_index(),
            commit_integrity_score: state.metrics.commit_integrity_score(),
            active_snapshots: state.snapshots.len(),
            vector_clock: state.clock.clone(),
        }
    }

    /// Copies of all live snapshots, in the order nodes first reported
    pub async fn state_snapshots(&self) -> Vec<StateSnapshot> {
        self.state.lock().await.snapshots.values().cloned().collect()
    }

    /// The most recent `limit` commits (all when `None`), oldest first
    pub async fn commit_history(&self, limit: Option<usize>) -> Vec<CommitEntry> {
        self.state.lock().await.recovery.commit_log(limit)
    }

    /// Latest commit at or before `target`
    pub async fn rollback_point(&self, target: Timestamp) -> Option<CommitEntry> {
        self.state.lock().await.recovery.get_rollback_point(target).cloned()
    }

    /// Commits to replay on top of a checkpoint to reach `target`
    ///
    /// # Errors
    ///
    /// Returns error if the checkpoint does not exist
    pub async fn replay_from_checkpoint(
        &self,
        checkpoint_id: &str,
        target: Timestamp,
    ) -> AgentResult<Vec<CommitEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .recovery
            .replay_from_checkpoint(checkpoint_id, target)?)
    }

    /// Vote on an open proposal
    ///
    /// # Errors
    ///
    /// Returns error if the proposal does not exist
    pub async fn cast_vote(
        &self,
        proposal_id: &str,
        node_id: impl Into<String>,
        approve: bool,
        justification: impl Into<String>,
    ) -> AgentResult<()> {
        self.state
            .lock()
            .await
            .quorum
            .cast_vote(proposal_id, node_id, approve, justification)
    }

    /// Tally a proposal
    pub async fn check_quorum(&self, proposal_id: &str) -> QuorumOutcome {
        self.state.lock().await.quorum.check_quorum(proposal_id)
    }
}

impl Default for SynchronizerAgent {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
