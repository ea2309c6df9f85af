//! Key directory: the last public key each username announced.
//!
//! Whatever a peer announces is accepted, last writer wins, and entries are
//! never removed. The directory does not decide trust on its own; a replaced
//! key is reported back to the caller as a [`KeyChanged`] observation.

use std::collections::HashMap;

use ht_crypto::keys::KeyMaterial;
use tracing::debug;

/// A username re-announced with a key different from the one on record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChanged {
    pub username: String,
    pub previous: KeyMaterial,
    pub current: KeyMaterial,
}

#[derive(Debug, Default, Clone)]
pub struct KeyDirectory {
    entries: HashMap<String, KeyMaterial>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the hub's roster snapshot.
    ///
    /// Entries are set one by one in order, so a username listed twice keeps
    /// its last key. Snapshot entries never raise a key-change observation.
    pub fn bulk_load<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, KeyMaterial)>,
    {
        for (username, key) in entries {
            if let Some(old) = self.entries.insert(username.clone(), key) {
                debug!(%username, previous = %old.short_fingerprint(), "roster entry replaced");
            }
        }
    }

    /// Record `key` as the current key of `username`.
    ///
    /// Returns a [`KeyChanged`] when a different key was already on record.
    /// Re-announcing the same key is a no-op.
    pub fn upsert(&mut self, username: &str, key: KeyMaterial) -> Option<KeyChanged> {
        match self.entries.insert(username.to_string(), key.clone()) {
            Some(previous) if previous != key => Some(KeyChanged {
                username: username.to_string(),
                previous,
                current: key,
            }),
            _ => None,
        }
    }

    pub fn lookup(&self, username: &str) -> Option<&KeyMaterial> {
        self.entries.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Known usernames, sorted.
    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> KeyMaterial {
        KeyMaterial::from_pem(text)
    }

    #[test]
    fn test_upsert_new_user_is_silent() {
        let mut dir = KeyDirectory::new();
        assert!(dir.upsert("alice", key("k1")).is_none());
        assert_eq!(dir.lookup("alice"), Some(&key("k1")));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_upsert_same_key_is_silent() {
        let mut dir = KeyDirectory::new();
        dir.upsert("alice", key("k1"));
        assert!(dir.upsert("alice", key(" k1\n")).is_none());
    }

    #[test]
    fn test_upsert_different_key_reports_change() {
        let mut dir = KeyDirectory::new();
        dir.upsert("alice", key("k1"));
        let change = dir.upsert("alice", key("k2")).unwrap();
        assert_eq!(change.username, "alice");
        assert_eq!(change.previous, key("k1"));
        assert_eq!(change.current, key("k2"));
        // Last writer wins.
        assert_eq!(dir.lookup("alice"), Some(&key("k2")));
    }

    #[test]
    fn test_bulk_load_last_entry_wins() {
        let mut dir = KeyDirectory::new();
        dir.bulk_load(vec![
            ("alice".to_string(), key("k1")),
            ("bob".to_string(), key("k2")),
            ("alice".to_string(), key("k3")),
        ]);
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup("alice"), Some(&key("k3")));
        assert_eq!(dir.usernames(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_bulk_load_keeps_earlier_entries() {
        let mut dir = KeyDirectory::new();
        dir.upsert("carol", key("k9"));
        dir.bulk_load(vec![("alice".to_string(), key("k1"))]);
        assert!(dir.contains("carol"));
        assert!(dir.contains("alice"));
    }

    #[test]
    fn test_lookup_unknown() {
        let dir = KeyDirectory::new();
        assert!(dir.lookup("nobody").is_none());
        assert!(dir.is_empty());
    }
}
