use std::collections::HashSet;

/// A chat participant's login name. Equality is exact string equality.
pub type Identity = String;

/// Identities present as of the last completed observation.
///
/// Unbounded and never expires on its own: an identity stays until a diff
/// cycle removes it.
#[derive(Debug, Default, Clone)]
pub struct MembershipStore {
    members: HashSet<Identity>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Returns `false` if the identity was already present.
    pub fn insert(&mut self, identity: Identity) -> bool {
        self.members.insert(identity)
    }

    /// Returns `false` if the identity was not present.
    pub fn remove(&mut self, identity: &str) -> bool {
        self.members.remove(identity)
    }

    /// Owned copy of the current members.
    pub fn snapshot(&self) -> HashSet<Identity> {
        self.members.clone()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut store = MembershipStore::new();
        assert!(store.insert("alice".to_string()));
        assert!(!store.insert("alice".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_the_store() {
        let mut store = MembershipStore::new();
        store.insert("alice".to_string());
        let snap = store.snapshot();
        store.remove("alice");

        assert!(snap.contains("alice"));
        assert!(store.is_empty());
    }

    #[test]
    fn equality_is_exact() {
        let mut store = MembershipStore::new();
        store.insert("Alice".to_string());
        assert!(store.contains("Alice"));
        assert!(!store.contains("alice"));
        assert!(!store.remove("alice"));
    }
}
