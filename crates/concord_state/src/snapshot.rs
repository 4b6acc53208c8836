//! Node state snapshots.

use concord_core::{CoreResult, Hash, Timestamp, canonical};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value state reported by a node
pub type StateData = BTreeMap<String, Value>;

/// Last known state reported by one node
///
/// Snapshots are replaced wholesale, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Reporting node
    pub node_id: String,
    /// When the snapshot was captured
    pub timestamp: Timestamp,
    /// Reported state
    pub data: StateData,
    /// Caller-maintained version, incremented on each change
    pub version: u64,
    /// SHA-256 of the canonical encoding of `data`
    pub checksum: Hash,
}

impl StateSnapshot {
    /// Capture a snapshot stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns error if `data` cannot be canonically encoded
    pub fn capture(node_id: impl Into<String>, data: StateData, version: u64) -> CoreResult<Self> {
        Self::capture_at(node_id, data, version, Timestamp::now())
    }

    /// Capture a snapshot with an explicit timestamp
    ///
    /// # Errors
    ///
    /// Returns error if `data` cannot be canonically encoded
    pub fn capture_at(
        node_id: impl Into<String>,
        data: StateData,
        version: u64,
        timestamp: Timestamp,
    ) -> CoreResult<Self> {
        let checksum = canonical::hash(&data)?;
        Ok(Self {
            node_id: node_id.into(),
            timestamp,
            data,
            version,
            checksum,
        })
    }

    /// Recompute the checksum and compare with the stored one
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        canonical::hash(&self.data).is_ok_and(|h| h == self.checksum)
    }

    /// Look up a single key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> StateData {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_capture_computes_checksum() {
        let snap = StateSnapshot::capture("vault1", data(json!({"balance": 100})), 1).unwrap();
        assert_eq!(snap.node_id, "vault1");
        assert_eq!(snap.version, 1);
        assert!(snap.verify_checksum());
        assert_eq!(snap.get("balance"), Some(&json!(100)));
    }

    #[test]
    fn test_equal_content_equal_checksum() {
        let a = StateSnapshot::capture_at("a", data(json!({"x": 1, "y": [1, 2]})), 1, Timestamp::from_millis(1)).unwrap();
        let b = StateSnapshot::capture_at("b", data(json!({"y": [1, 2], "x": 1})), 7, Timestamp::from_millis(9)).unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let mut snap = StateSnapshot::capture("n", data(json!({"k": "v"})), 1).unwrap();
        snap.data.insert("k".to_string(), json!("w"));
        assert!(!snap.verify_checksum());
    }
}
