//! Yes/no vote tally for proposals such as drift resolutions.
//!
//! This is bookkeeping only. It does not order or replicate anything and
//! gives no guarantees against faulty voters.

use crate::error::{AgentError, AgentResult};
use concord_core::Timestamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default number of proposals tracked before the oldest is dropped
pub const DEFAULT_MAX_PROPOSALS: usize = 100;

/// A single vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Yes or no
    pub approve: bool,
    /// When the vote was cast
    pub timestamp: Timestamp,
    /// Free-form reason given by the voter
    pub justification: String,
}

/// Decision state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Not decided yet
    Pending,
    /// Reached quorum in favor
    Approved,
    /// Reached quorum against
    Rejected,
}

/// A proposal and the votes cast on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// What is being voted on
    pub payload: Value,
    /// Latest vote per node
    pub votes: BTreeMap<String, Vote>,
    /// When the proposal was opened
    pub started_at: Timestamp,
    /// Decision recorded by the last quorum check
    pub status: ProposalStatus,
}

/// Result of a quorum check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuorumOutcome {
    /// Not decided yet
    Pending {
        /// Votes cast so far
        votes: usize,
        /// Matching votes needed to decide
        required: usize,
    },
    /// Enough yes votes
    Approved,
    /// Enough no votes
    Rejected,
    /// No such proposal
    Unknown,
}

/// Tracks open proposals and their votes
///
/// At most `max_proposals` are kept. Opening one more drops the oldest,
/// decided or not.
#[derive(Debug, Clone)]
pub struct QuorumChecker {
    quorum_size: usize,
    max_proposals: usize,
    proposals: IndexMap<String, Proposal>,
}

impl QuorumChecker {
    /// Create a checker needing `quorum_size` matching votes to decide
    #[must_use]
    pub fn new(quorum_size: usize) -> Self {
        Self {
            quorum_size: quorum_size.max(1),
            max_proposals: DEFAULT_MAX_PROPOSALS,
            proposals: IndexMap::new(),
        }
    }

    /// Set how many proposals are tracked
    #[must_use]
    pub fn with_max_proposals(mut self, max: usize) -> Self {
        self.max_proposals = max.max(1);
        self
    }

    /// Open a proposal, replacing any previous one with the same id
    pub fn initiate_vote(&mut self, proposal_id: impl Into<String>, payload: Value) {
        let proposal_id = proposal_id.into();
        // A replaced id moves to the back as the newest proposal.
        self.proposals.shift_remove(&proposal_id);
        self.proposals.insert(
            proposal_id,
            Proposal {
                payload,
                votes: BTreeMap::new(),
                started_at: Timestamp::now(),
                status: ProposalStatus::Pending,
            },
        );

        while self.proposals.len() > self.max_proposals {
            if let Some((dropped, proposal)) = self.proposals.shift_remove_index(0) {
                tracing::debug!(proposal_id = %dropped, status = ?proposal.status, "Oldest proposal dropped");
            }
        }
    }

    /// Record `node_id`'s vote; a second vote from the same node replaces the first
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProposalNotFound`] for an unknown proposal
    pub fn cast_vote(
        &mut self,
        proposal_id: &str,
        node_id: impl Into<String>,
        approve: bool,
        justification: impl Into<String>,
    ) -> AgentResult<()> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| AgentError::ProposalNotFound(proposal_id.to_string()))?;

        proposal.votes.insert(
            node_id.into(),
            Vote {
                approve,
                timestamp: Timestamp::now(),
                justification: justification.into(),
            },
        );
        Ok(())
    }

    /// Tally votes and record the decision once reached
    pub fn check_quorum(&mut self, proposal_id: &str) -> QuorumOutcome {
        let Some(proposal) = self.proposals.get_mut(proposal_id) else {
            return QuorumOutcome::Unknown;
        };

        let total = proposal.votes.len();
        if total < self.quorum_size {
            return QuorumOutcome::Pending {
                votes: total,
                required: self.quorum_size,
            };
        }

        let approvals = proposal.votes.values().filter(|v| v.approve).count();
        if approvals >= self.quorum_size {
            proposal.status = ProposalStatus::Approved;
            return QuorumOutcome::Approved;
        }
        if total - approvals >= self.quorum_size {
            proposal.status = ProposalStatus::Rejected;
            return QuorumOutcome::Rejected;
        }

        QuorumOutcome::Pending {
            votes: total,
            required: self.quorum_size,
        }
    }

    /// Look up a proposal
    #[must_use]
    pub fn proposal(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Number of tracked proposals
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Whether no proposal is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_proposal() {
        let mut checker = QuorumChecker::new(2);
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Unknown);
        assert_eq!(
            checker.cast_vote("p", "a", true, ""),
            Err(AgentError::ProposalNotFound("p".to_string()))
        );
    }

    #[test]
    fn test_approval() {
        let mut checker = QuorumChecker::new(2);
        checker.initiate_vote("p", json!({"action": "resolve_drift"}));

        checker.cast_vote("p", "a", true, "looks right").unwrap();
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Pending { votes: 1, required: 2 });

        checker.cast_vote("p", "b", true, "").unwrap();
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Approved);
        assert_eq!(checker.proposal("p").unwrap().status, ProposalStatus::Approved);
    }

    #[test]
    fn test_rejection_and_split() {
        let mut checker = QuorumChecker::new(2);
        checker.initiate_vote("p", Value::Null);
        checker.cast_vote("p", "a", true, "").unwrap();
        checker.cast_vote("p", "b", false, "").unwrap();
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Pending { votes: 2, required: 2 });

        checker.cast_vote("p", "c", false, "").unwrap();
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Rejected);
    }

    #[test]
    fn test_oldest_proposal_dropped_past_cap() {
        let mut checker = QuorumChecker::new(1).with_max_proposals(3);
        for i in 0..5 {
            checker.initiate_vote(format!("p{i}"), json!(i));
        }
        assert_eq!(checker.len(), 3);
        assert_eq!(checker.check_quorum("p0"), QuorumOutcome::Unknown);
        assert_eq!(checker.check_quorum("p1"), QuorumOutcome::Unknown);
        assert!(checker.proposal("p4").is_some());

        // Reopening an id refreshes it instead of counting twice.
        checker.initiate_vote("p2", Value::Null);
        checker.initiate_vote("p5", Value::Null);
        assert_eq!(checker.len(), 3);
        assert!(checker.proposal("p2").is_some());
        assert!(checker.proposal("p3").is_none());
    }

    #[test]
    fn test_revote_replaces() {
        let mut checker = QuorumChecker::new(1);
        checker.initiate_vote("p", Value::Null);
        checker.cast_vote("p", "a", false, "").unwrap();
        checker.cast_vote("p", "a", true, "changed mind").unwrap();
        assert_eq!(checker.proposal("p").unwrap().votes.len(), 1);
        assert_eq!(checker.check_quorum("p"), QuorumOutcome::Approved);
    }
}
