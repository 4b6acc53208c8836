//! CONCORD State
//!
//! Per-node state snapshots, deterministic checksums, pairwise diffs and
//! majority-vote conflict resolution. Everything here is pure; no locks and
//! no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod differ;
pub mod snapshot;

pub use differ::{DifferError, FieldDiff, RESOLVED_NODE_ID, StateDiff, StateDiffer};
pub use snapshot::{StateData, StateSnapshot};
