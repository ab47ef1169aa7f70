//! Per-account capability cache
//!
//! Platforms report limits (character counts, attachments per post, media
//! size ceilings) that differ per instance. Adapters write them here during
//! a login-status check and read them back when validating, choosing
//! scaling limits and posting. Entries never expire; the caller decides
//! when to refresh by checking login status again.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

type AccountEntries = HashMap<String, Arc<serde_json::Value>>;

/// Thread-safe map of `(account_id, key) -> metadata`
///
/// Values are swapped in whole on write, so readers holding an `Arc` keep
/// a consistent snapshot.
#[derive(Debug, Default)]
pub struct CapabilityStore {
    entries: RwLock<HashMap<String, AccountEntries>>,
}

impl CapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) a capability entry
    pub fn put(&self, account_id: &str, key: &str, value: serde_json::Value) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        debug!("Caching capability '{}' for account {}", key, account_id);
        entries
            .entry(account_id.to_string())
            .or_default()
            .insert(key.to_string(), Arc::new(value));
    }

    pub fn get(&self, account_id: &str, key: &str) -> Option<Arc<serde_json::Value>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(account_id)?.get(key).cloned()
    }

    /// Read an entry as a typed structure
    ///
    /// Returns `None` when the entry is absent or does not match `T`; a
    /// mismatch is logged since it usually means the platform changed shape.
    pub fn get_as<T: DeserializeOwned>(&self, account_id: &str, key: &str) -> Option<T> {
        let value = self.get(account_id, key)?;
        match serde_json::from_value(value.as_ref().clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(
                    "Cached capability '{}' for account {} has an unexpected shape: {}",
                    key, account_id, e
                );
                None
            }
        }
    }

    /// Drop everything cached for an account
    pub fn remove_account(&self, account_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(account_id);
    }

    pub fn contains(&self, account_id: &str, key: &str) -> bool {
        self.get(account_id, key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Limits {
        max_characters: usize,
    }

    #[test]
    fn test_put_and_get() {
        let store = CapabilityStore::new();
        store.put("acct-1", "limits", json!({"max_characters": 500}));

        assert_eq!(
            store.get("acct-1", "limits").as_deref(),
            Some(&json!({"max_characters": 500}))
        );
        assert!(store.get("acct-1", "other").is_none());
        assert!(store.get("acct-2", "limits").is_none());
    }

    #[test]
    fn test_keys_are_scoped_per_account() {
        let store = CapabilityStore::new();
        store.put("a", "limits", json!({"max_characters": 500}));
        store.put("b", "limits", json!({"max_characters": 11000}));

        assert_eq!(
            store.get_as::<Limits>("a", "limits"),
            Some(Limits { max_characters: 500 })
        );
        assert_eq!(
            store.get_as::<Limits>("b", "limits"),
            Some(Limits { max_characters: 11000 })
        );
    }

    #[test]
    fn test_replace_keeps_old_snapshot_intact() {
        let store = CapabilityStore::new();
        store.put("a", "limits", json!({"max_characters": 500}));
        let snapshot = store.get("a", "limits").unwrap();

        store.put("a", "limits", json!({"max_characters": 1000}));

        assert_eq!(snapshot["max_characters"], 500);
        assert_eq!(store.get("a", "limits").unwrap()["max_characters"], 1000);
    }

    #[test]
    fn test_get_as_shape_mismatch() {
        let store = CapabilityStore::new();
        store.put("a", "limits", json!({"max_characters": "lots"}));
        assert!(store.get_as::<Limits>("a", "limits").is_none());
        assert!(store.contains("a", "limits"));
    }

    #[test]
    fn test_remove_account() {
        let store = CapabilityStore::new();
        store.put("a", "limits", json!({}));
        store.put("a", "other", json!({}));
        store.remove_account("a");
        assert!(!store.contains("a", "limits"));
        assert!(!store.contains("a", "other"));
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(CapabilityStore::new());
        store.put("a", "limits", json!({"max_characters": 42}));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_as::<Limits>("a", "limits"))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(Limits { max_characters: 42 }));
        }
    }
}
