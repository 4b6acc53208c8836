//! Commit log and checkpoint store.

use crate::commit::CommitEntry;
use concord_core::Timestamp;
use concord_state::StateSnapshot;
use indexmap::IndexMap;

/// Default commit log capacity
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default number of checkpoints retained
pub const DEFAULT_MAX_CHECKPOINTS: usize = 1_000;

/// Recovery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    /// No checkpoint stored under this id
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),
}

/// Owns the commit log and the checkpoint store for one coordinator
///
/// Entries are kept in non-decreasing timestamp order. A wall clock that
/// steps backwards is clamped to the previous entry's timestamp.
///
/// Checkpoints are bounded too: past `max_checkpoints` the oldest one is
/// evicted, after which rolling back to it reports not-found.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    commit_log: Vec<CommitEntry>,
    checkpoints: IndexMap<String, StateSnapshot>,
    max_entries: usize,
    max_checkpoints: usize,
    evicted: u64,
}

impl RecoveryManager {
    /// Create a manager whose log holds at most `max_entries` commits
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            commit_log: Vec::new(),
            checkpoints: IndexMap::new(),
            max_entries: max_entries.max(1),
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            evicted: 0,
        }
    }

    /// Set how many checkpoints are retained
    #[must_use]
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max.max(1);
        self
    }

    /// Append a commit
    ///
    /// Never fails. Past capacity the oldest half of the log is dropped.
    pub fn log_commit(&mut self, mut entry: CommitEntry) -> &CommitEntry {
        if let Some(last) = self.commit_log.last() {
            if entry.timestamp < last.timestamp {
                tracing::debug!(
                    entry = %entry.timestamp,
                    last = %last.timestamp,
                    "Clamping commit timestamp to preserve log order"
                );
                entry.timestamp = last.timestamp;
            }
        }
        self.commit_log.push(entry);

        if self.commit_log.len() > self.max_entries {
            let keep = (self.max_entries / 2).max(1);
            let evict = self.commit_log.len() - keep;
            self.commit_log.drain(..evict);
            self.evicted += evict as u64;
            tracing::warn!(
                evicted = evict,
                retained = keep,
                total_evicted = self.evicted,
                "Commit log over capacity, oldest entries evicted"
            );
        }

        &self.commit_log[self.commit_log.len() - 1]
    }

    /// Store `snapshot` under `id`, replacing any previous checkpoint
    ///
    /// A replaced id counts as the newest checkpoint.
    pub fn create_checkpoint(&mut self, id: impl Into<String>, snapshot: StateSnapshot) {
        let id = id.into();
        tracing::debug!(checkpoint_id = %id, node_id = %snapshot.node_id, "Checkpoint created");
        self.checkpoints.shift_remove(&id);
        self.checkpoints.insert(id, snapshot);

        while self.checkpoints.len() > self.max_checkpoints {
            if let Some((dropped, _)) = self.checkpoints.shift_remove_index(0) {
                tracing::warn!(
                    checkpoint_id = %dropped,
                    retained = self.max_checkpoints,
                    "Checkpoint store over capacity, oldest checkpoint evicted"
                );
            }
        }
    }

    /// Look up a checkpoint
    #[must_use]
    pub fn get_checkpoint(&self, id: &str) -> Option<&StateSnapshot> {
        self.checkpoints.get(id)
    }

    /// All checkpoint ids, oldest first
    #[must_use]
    pub fn checkpoint_ids(&self) -> Vec<String> {
        self.checkpoints.keys().cloned().collect()
    }

    /// Latest commit at or before `target`
    #[must_use]
    pub fn get_rollback_point(&self, target: Timestamp) -> Option<&CommitEntry> {
        let end = self.commit_log.partition_point(|e| e.timestamp <= target);
        end.checked_sub(1).map(|i| &self.commit_log[i])
    }

    /// Commits after the checkpoint's timestamp and at or before `target`
    ///
    /// These are the operations to re-apply on top of the checkpoint to
    /// reconstruct the state at `target`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::CheckpointNotFound`] for an unknown id
    pub fn replay_from_checkpoint(
        &self,
        checkpoint_id: &str,
        target: Timestamp,
    ) -> Result<Vec<CommitEntry>, RecoveryError> {
        let checkpoint = self
            .checkpoints
            .get(checkpoint_id)
            .ok_or_else(|| RecoveryError::CheckpointNotFound(checkpoint_id.to_string()))?;

        let start = self
            .commit_log
            .partition_point(|e| e.timestamp <= checkpoint.timestamp);
        let end = self.commit_log.partition_point(|e| e.timestamp <= target);

        Ok(if start < end {
            self.commit_log[start..end].to_vec()
        } else {
            Vec::new()
        })
    }

    /// The most recent `limit` commits (all when `None`), oldest first
    #[must_use]
    pub fn commit_log(&self, limit: Option<usize>) -> Vec<CommitEntry> {
        let skip = limit.map_or(0, |n| self.commit_log.len().saturating_sub(n));
        self.commit_log[skip..].to_vec()
    }

    /// Number of retained commits
    #[must_use]
    pub fn len(&self) -> usize {
        self.commit_log.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commit_log.is_empty()
    }

    /// Commits dropped by capacity eviction so far
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Configured capacity
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Configured checkpoint capacity
    #[must_use]
    pub fn max_checkpoints(&self) -> usize {
        self.max_checkpoints
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
