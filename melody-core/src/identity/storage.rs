//! Local storage tiers
//!
//! The host exposes two key/value stores with different lifetimes: a durable
//! one that survives restarts and a session-scoped one. Both are consumed
//! through [`StorageMedium`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Key holding the serialized identity record
pub const CURRENT_USER_KEY: &str = "currentUser";

/// A key/value store provided by the host
pub trait StorageMedium: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process storage, used when the host has no storage of its own and in tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageMedium for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Which of the two tiers a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Survives restarts ("remember me")
    Durable,
    /// Cleared when the browsing session ends
    Session,
}

impl Tier {
    pub fn other(self) -> Tier {
        match self {
            Tier::Durable => Tier::Session,
            Tier::Session => Tier::Durable,
        }
    }
}

/// Two storage tiers read as one, durable first.
///
/// Merges only touch tiers that already hold an entry for the key; they never
/// create one.
#[derive(Clone)]
pub struct TieredStore {
    durable: Arc<dyn StorageMedium>,
    session: Arc<dyn StorageMedium>,
}

impl TieredStore {
    pub fn new(durable: Arc<dyn StorageMedium>, session: Arc<dyn StorageMedium>) -> Self {
        Self { durable, session }
    }

    pub fn tier(&self, tier: Tier) -> &dyn StorageMedium {
        match tier {
            Tier::Durable => self.durable.as_ref(),
            Tier::Session => self.session.as_ref(),
        }
    }

    /// Read a key, preferring the durable tier. Empty values count as absent.
    pub fn read(&self, key: &str) -> Option<(Tier, String)> {
        [Tier::Durable, Tier::Session].into_iter().find_map(|tier| {
            self.tier(tier)
                .get(key)
                .filter(|value| !value.is_empty())
                .map(|value| (tier, value))
        })
    }

    pub fn write(&self, tier: Tier, key: &str, value: &str) {
        self.tier(tier).set(key, value);
    }

    /// Remove a key from both tiers
    pub fn remove_all(&self, key: &str) {
        self.durable.remove(key);
        self.session.remove(key);
    }

    /// Merge `patch` into the JSON object stored under `key` in every tier
    /// that has one. Returns the tiers that were updated.
    pub fn merge_existing(&self, key: &str, patch: &Map<String, Value>) -> Vec<Tier> {
        let mut updated = Vec::new();

        for tier in [Tier::Durable, Tier::Session] {
            let storage = self.tier(tier);
            let Some(raw) = storage.get(key) else {
                continue;
            };

            let mut record = match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(record)) => record,
                Ok(_) => {
                    warn!("{:?} tier entry for {} is not an object, skipping merge", tier, key);
                    continue;
                }
                Err(e) => {
                    warn!("{:?} tier entry for {} is corrupt, skipping merge: {}", tier, key, e);
                    continue;
                }
            };

            for (field, value) in patch {
                record.insert(field.clone(), value.clone());
            }

            storage.set(key, &Value::Object(record).to_string());
            debug!("Merged {} field(s) into {:?} tier", patch.len(), tier);
            updated.push(tier);
        }

        updated
    }
}
