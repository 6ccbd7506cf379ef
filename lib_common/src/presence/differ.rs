//! # Presence Differ
//!
//! Turns one observation of the chatter list into a joined / stayed / parted
//! partition against the previous observation.
//!
//! ## Algorithm
//! 1. Snapshot the store as the "possibly parted" set.
//! 2. Walk the observation in order. An identity already in the store is
//!    `stayed` and struck from the possibly-parted set; a new one is `joined`
//!    and inserted. Repeats inside the same observation (someone listed as
//!    both vip and viewer) are skipped after their first occurrence.
//! 3. Whatever is left in the possibly-parted set has `parted` and is removed.
//!
//! After a call the store equals the observation as a set.

use std::collections::HashSet;

use serde::Serialize;

use super::membership::{Identity, MembershipStore};

/// The partition produced by one cycle.
///
/// Serializes as `{"joined": [...], "stayed": [...], "parted": [...]}`, which
/// is the `chatter` object of both outbound payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Present now, absent last cycle. In first-seen order.
    pub joined: Vec<Identity>,
    /// Present now and last cycle. In first-seen order.
    pub stayed: Vec<Identity>,
    /// Present last cycle, absent now. In set iteration order.
    pub parted: Vec<Identity>,
}

impl DiffResult {
    /// Number of identities present after this cycle.
    pub fn present(&self) -> usize {
        self.joined.len() + self.stayed.len()
    }
}

/// Owns the membership store and applies observations to it.
#[derive(Debug, Default)]
pub struct PresenceDiffer {
    store: MembershipStore,
}

impl PresenceDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `observed` against the store and updates the store to match.
    ///
    /// Cannot fail. An empty observation parts everyone.
    pub fn diff<I, S>(&mut self, observed: I) -> DiffResult
    where
        I: IntoIterator<Item = S>,
        S: Into<Identity>,
    {
        let mut possibly_parted = self.store.snapshot();
        let mut seen: HashSet<Identity> = HashSet::new();
        let mut result = DiffResult::default();

        for identity in observed {
            let identity: Identity = identity.into();
            if !seen.insert(identity.clone()) {
                continue;
            }

            if self.store.contains(&identity) {
                possibly_parted.remove(&identity);
                result.stayed.push(identity);
            } else {
                self.store.insert(identity.clone());
                result.joined.push(identity);
            }
        }

        for identity in possibly_parted {
            self.store.remove(&identity);
            result.parted.push(identity);
        }

        log::debug!(
            "Presence diff: {} joined, {} stayed, {} parted ({} present)",
            result.joined.len(),
            result.stayed.len(),
            result.parted.len(),
            self.store.len()
        );

        result
    }

    /// Owned copy of the identities currently considered present.
    pub fn snapshot(&self) -> HashSet<Identity> {
        self.store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<Identity>) -> Vec<Identity> {
        v.sort();
        v
    }

    fn set(items: &[&str]) -> HashSet<Identity> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_observation_joins_everyone() {
        let mut differ = PresenceDiffer::new();
        let diff = differ.diff(["a", "b"]);

        assert_eq!(diff.joined, vec!["a", "b"]);
        assert!(diff.stayed.is_empty());
        assert!(diff.parted.is_empty());
        assert_eq!(differ.snapshot(), set(&["a", "b"]));
    }

    #[test]
    fn join_stay_part_scenario() {
        let mut differ = PresenceDiffer::new();
        differ.diff(["a", "b"]);

        let diff = differ.diff(["b", "c"]);

        assert_eq!(diff.joined, vec!["c"]);
        assert_eq!(diff.stayed, vec!["b"]);
        assert_eq!(diff.parted, vec!["a"]);
        assert_eq!(differ.snapshot(), set(&["b", "c"]));
    }

    #[test]
    fn repeating_an_observation_only_stays() {
        let mut differ = PresenceDiffer::new();
        let observed = ["x", "y", "z"];
        differ.diff(observed);

        let diff = differ.diff(observed);

        assert!(diff.joined.is_empty());
        assert_eq!(diff.stayed, vec!["x", "y", "z"]);
        assert!(diff.parted.is_empty());
    }

    #[test]
    fn empty_observation_parts_everyone() {
        let mut differ = PresenceDiffer::new();
        differ.diff(["a", "b", "c"]);

        let diff = differ.diff(Vec::<String>::new());

        assert!(diff.joined.is_empty());
        assert!(diff.stayed.is_empty());
        assert_eq!(sorted(diff.parted), vec!["a", "b", "c"]);
        assert!(differ.snapshot().is_empty());
    }

    #[test]
    fn duplicates_within_one_observation_count_once() {
        let mut differ = PresenceDiffer::new();

        // "mod1" listed both as a vip and as a viewer.
        let diff = differ.diff(["mod1", "v1", "mod1"]);
        assert_eq!(diff.joined, vec!["mod1", "v1"]);
        assert!(diff.stayed.is_empty());

        let diff = differ.diff(["mod1", "mod1"]);
        assert_eq!(diff.stayed, vec!["mod1"]);
        assert_eq!(diff.parted, vec!["v1"]);
    }

    #[test]
    fn partition_matches_set_algebra() {
        let rounds: [&[&str]; 5] = [
            &["a", "b", "c"],
            &["c", "d"],
            &["d", "e", "a", "e"],
            &[],
            &["f"],
        ];

        let mut differ = PresenceDiffer::new();
        for observed in rounds {
            let before = differ.snapshot();
            let now = set(observed);

            let diff = differ.diff(observed.iter().copied());

            let joined: HashSet<_> = diff.joined.iter().cloned().collect();
            let stayed: HashSet<_> = diff.stayed.iter().cloned().collect();
            let parted: HashSet<_> = diff.parted.iter().cloned().collect();

            assert!(joined.is_disjoint(&before));
            assert_eq!(stayed, now.intersection(&before).cloned().collect());
            assert_eq!(parted, before.difference(&now).cloned().collect());
            assert_eq!(differ.snapshot(), now);
            assert_eq!(diff.present(), now.len());
        }
    }

    #[test]
    fn serializes_as_chatter_object() {
        let diff = DiffResult {
            joined: vec!["c".into()],
            stayed: vec!["b".into()],
            parted: vec!["a".into()],
        };
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"joined": ["c"], "stayed": ["b"], "parted": ["a"]})
        );
    }
}
