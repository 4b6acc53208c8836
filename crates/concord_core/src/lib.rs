//! CONCORD Core Types
//!
//! Pure types with no I/O: logical clocks, canonical encoding, content hashes
//! and wall-clock timestamps. Everything here is shared by the state, log and
//! sync layers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod clock;
pub mod error;
pub mod hash;
pub mod time;

// Re-exports
pub use canonical::{CanonicalEncode, MAX_DEPTH};
pub use clock::{ClockOrdering, VectorClock};
pub use error::{CoreError, CoreResult};
pub use hash::{Hash, HashError};
pub use time::Timestamp;
