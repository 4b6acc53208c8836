//! Deterministic hashing, diffing and conflict resolution over snapshots.

use crate::snapshot::{StateData, StateSnapshot};
use concord_core::{CoreError, Hash, Timestamp, canonical};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Node id given to snapshots produced by conflict resolution
pub const RESOLVED_NODE_ID: &str = "RESOLVED";

/// Differ errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DifferError {
    /// `resolve_conflicts` called with no snapshots
    #[error("No snapshots to resolve")]
    EmptyInput,

    /// A value could not be canonically encoded
    #[error("Cannot hash state: {0}")]
    Hashing(#[from] CoreError),
}

/// Values one key holds on each side of a diff; `None` means absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Value in the first snapshot
    pub left: Option<Value>,
    /// Value in the second snapshot
    pub right: Option<Value>,
}

impl FieldDiff {
    /// Same diff seen from the other side
    #[must_use]
    pub fn swapped(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
        }
    }
}

/// Differing keys, in key order
pub type StateDiff = BTreeMap<String, FieldDiff>;

/// Stateless engine for comparing and reconciling snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct StateDiffer;

impl StateDiffer {
    /// Create a new differ (unit struct)
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 over the canonical encoding of `state`
    ///
    /// # Errors
    ///
    /// Returns error if `state` cannot be canonically encoded
    pub fn compute_hash<T: Serialize + ?Sized>(&self, state: &T) -> Result<Hash, DifferError> {
        Ok(canonical::hash(state)?)
    }

    /// Per-key differences between two snapshots
    ///
    /// A key present on one side only differs from "absent". Values are
    /// compared structurally, which matches comparing canonical encodings.
    #[must_use]
    pub fn diff(&self, left: &StateSnapshot, right: &StateSnapshot) -> StateDiff {
        left.data
            .keys()
            .chain(right.data.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|key| {
                let l = left.data.get(key);
                let r = right.data.get(key);
                (l != r).then(|| {
                    (
                        key.clone(),
                        FieldDiff {
                            left: l.cloned(),
                            right: r.cloned(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Majority-vote merge of `snapshots`
    ///
    /// For every key, picks the value reported most often by the snapshots
    /// that carry the key. Ties go to the value whose canonical encoding
    /// sorts first, so every coordinator picks the same winner.
    ///
    /// A single snapshot is returned unchanged. Otherwise the result is owned
    /// by [`RESOLVED_NODE_ID`] with `version = max(versions) + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`DifferError::EmptyInput`] for an empty slice, or
    /// [`DifferError::Hashing`] if a value cannot be canonically encoded
    pub fn resolve_conflicts(&self, snapshots: &[StateSnapshot]) -> Result<StateSnapshot, DifferError> {
        match snapshots {
            [] => return Err(DifferError::EmptyInput),
            [only] => return Ok(only.clone()),
            _ => {}
        }

        let keys: BTreeSet<&String> = snapshots.iter().flat_map(|s| s.data.keys()).collect();
        let mut resolved = StateData::new();

        for key in keys {
            // canonical encoding -> (votes, value)
            let mut tally: BTreeMap<String, (usize, &Value)> = BTreeMap::new();
            for value in snapshots.iter().filter_map(|s| s.data.get(key)) {
                let encoded = canonical::encode_value(value)?;
                tally.entry(encoded).or_insert((0, value)).0 += 1;
            }

            let mut winner: Option<(usize, &Value)> = None;
            for (count, value) in tally.into_values() {
                if winner.is_none_or(|(best, _)| count > best) {
                    winner = Some((count, value));
                }
            }
            if let Some((_, value)) = winner {
                resolved.insert(key.clone(), value.clone());
            }
        }

        let version = snapshots.iter().map(|s| s.version).max().unwrap_or(0) + 1;
        Ok(StateSnapshot::capture_at(
            RESOLVED_NODE_ID,
            resolved,
            version,
            Timestamp::now(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn snap(node: &str, value: Value, version: u64) -> StateSnapshot {
        let data: StateData = serde_json::from_value(value).unwrap();
        StateSnapshot::capture_at(node, data, version, Timestamp::from_millis(1_000)).unwrap()
    }

    #[test]
    fn test_compute_hash_key_order_independent() {
        let differ = StateDiffer::new();
        let a = differ.compute_hash(&json!({"a": 1, "b": 2})).unwrap();
        let b = differ.compute_hash(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, differ.compute_hash(&json!({"a": 1, "b": 2})).unwrap());
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let differ = StateDiffer::new();
        let a = snap("a", json!({"x": 1}), 1);
        let mut b = snap("b", json!({"x": 1}), 5);
        b.timestamp = Timestamp::from_millis(99);
        assert!(differ.diff(&a, &b).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_and_one_sided_keys() {
        let differ = StateDiffer::new();
        let a = snap("a", json!({"same": 1, "changed": "x", "only_a": true}), 1);
        let b = snap("b", json!({"same": 1, "changed": "y", "only_b": null}), 1);

        let diff = differ.diff(&a, &b);
        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["changed", "only_a", "only_b"]);
        assert_eq!(diff["changed"].left, Some(json!("x")));
        assert_eq!(diff["changed"].right, Some(json!("y")));
        assert_eq!(diff["only_a"].right, None);
        // An explicit null still differs from absent.
        assert_eq!(diff["only_b"].left, None);
        assert_eq!(diff["only_b"].right, Some(Value::Null));
    }

    #[test]
    fn test_diff_int_and_float_differ() {
        let differ = StateDiffer::new();
        let a = snap("a", json!({"n": 1}), 1);
        let b = snap("b", json!({"n": 1.0}), 1);
        assert_eq!(differ.diff(&a, &b).len(), 1);
    }

    #[test]
    fn test_resolve_empty_input() {
        let differ = StateDiffer::new();
        assert_eq!(differ.resolve_conflicts(&[]), Err(DifferError::EmptyInput));
    }

    #[test]
    fn test_resolve_single_snapshot_unchanged() {
        let differ = StateDiffer::new();
        let only = snap("vault1", json!({"balance": 5}), 3);
        assert_eq!(differ.resolve_conflicts(std::slice::from_ref(&only)).unwrap(), only);
    }

    #[test]
    fn test_resolve_majority_wins() {
        let differ = StateDiffer::new();
        let snapshots = vec![
            snap("vault1", json!({"balance": 100, "owner": "dao"}), 1),
            snap("vault2", json!({"balance": 90, "owner": "dao"}), 2),
            snap("vault3", json!({"balance": 100}), 1),
        ];

        let resolved = differ.resolve_conflicts(&snapshots).unwrap();
        assert_eq!(resolved.node_id, RESOLVED_NODE_ID);
        assert_eq!(resolved.version, 3);
        assert_eq!(resolved.get("balance"), Some(&json!(100)));
        // Only snapshots carrying the key vote on it.
        assert_eq!(resolved.get("owner"), Some(&json!("dao")));
        assert!(resolved.verify_checksum());
    }

    #[test]
    fn test_resolve_tie_breaks_on_canonical_order() {
        let differ = StateDiffer::new();
        let forward = vec![
            snap("a", json!({"k": "zeta", "n": {"b": 1}}), 1),
            snap("b", json!({"k": "alpha", "n": {"a": 1}}), 1),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let r1 = differ.resolve_conflicts(&forward).unwrap();
        let r2 = differ.resolve_conflicts(&backward).unwrap();
        assert_eq!(r1.get("k"), Some(&json!("alpha")));
        assert_eq!(r1.get("n"), Some(&json!({"a": 1})));
        assert_eq!(r1.checksum, r2.checksum);
    }

    #[test]
    fn test_resolve_nested_values_vote_by_content() {
        let differ = StateDiffer::new();
        let snapshots = vec![
            snap("a", json!({"cfg": {"x": 1, "y": 2}}), 1),
            snap("b", json!({"cfg": {"y": 2, "x": 1}}), 1),
            snap("c", json!({"cfg": {"x": 0}}), 4),
        ];
        let resolved = differ.resolve_conflicts(&snapshots).unwrap();
        assert_eq!(resolved.get("cfg"), Some(&json!({"x": 1, "y": 2})));
        assert_eq!(resolved.version, 5);
    }

    fn arb_data() -> impl Strategy<Value = StateData> {
        proptest::collection::btree_map("[a-e]", (0i64..4).prop_map(|n| json!(n)), 0..5)
    }

    proptest! {
        #[test]
        fn prop_diff_symmetric(a in arb_data(), b in arb_data()) {
            let differ = StateDiffer::new();
            let left = StateSnapshot::capture_at("l", a, 1, Timestamp::EPOCH).unwrap();
            let right = StateSnapshot::capture_at("r", b, 1, Timestamp::EPOCH).unwrap();

            let forward = differ.diff(&left, &right);
            let backward: StateDiff = differ
                .diff(&right, &left)
                .into_iter()
                .map(|(k, d)| (k, d.swapped()))
                .collect();
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn prop_strict_majority_converges(
            majority in arb_data(),
            minority in arb_data(),
            copies in 2usize..5,
        ) {
            let differ = StateDiffer::new();
            let mut snapshots: Vec<StateSnapshot> = (0..copies)
                .map(|i| StateSnapshot::capture_at(format!("m{i}"), majority.clone(), i as u64, Timestamp::EPOCH).unwrap())
                .collect();
            // Minority only votes on keys the majority also carries.
            let minority: StateData = minority
                .into_iter()
                .filter(|(k, _)| majority.contains_key(k))
                .collect();
            for i in 0..copies - 1 {
                snapshots.push(StateSnapshot::capture_at(format!("x{i}"), minority.clone(), 9, Timestamp::EPOCH).unwrap());
            }

            let resolved = differ.resolve_conflicts(&snapshots).unwrap();
            prop_assert_eq!(resolved.data, majority);
            prop_assert_eq!(resolved.version, 10);
        }
    }
}
