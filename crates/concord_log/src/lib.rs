//! CONCORD Commit Log
//!
//! Append-only, timestamp-ordered commit entries plus named rollback
//! checkpoints. The log is bounded: once it grows past its configured
//! capacity the oldest half is evicted. That trades complete audit history
//! for bounded memory, and every eviction is logged and counted. The
//! checkpoint store makes the same trade, one checkpoint at a time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit;
pub mod recovery;

pub use commit::{CommitEntry, Operation};
pub use recovery::{DEFAULT_MAX_CHECKPOINTS, DEFAULT_MAX_ENTRIES, RecoveryError, RecoveryManager};
