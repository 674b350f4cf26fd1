use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::id;
use super::repo_types::{Profile, ProfileInput};
use crate::storage::KeyValueStorage;

const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Default)]
struct Records {
    list: Vec<Profile>,
    index: HashMap<String, usize>,
}

impl Records {
    fn from_list(list: Vec<Profile>) -> Self {
        let mut index = HashMap::with_capacity(list.len());
        for (i, p) in list.iter().enumerate() {
            // first record wins if a hand-edited blob carries duplicates
            index.entry(p.id.clone()).or_insert(i);
        }
        Self { list, index }
    }

    fn push(&mut self, profile: Profile) {
        self.index.insert(profile.id.clone(), self.list.len());
        self.list.push(profile);
    }
}

/// Append-only collection of helper profiles, persisted as one JSON array
/// under `key` after every change.
pub struct ProfileStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    records: RwLock<Records>,
}

impl ProfileStore {
    /// Load the persisted collection; missing or unreadable data starts empty.
    pub async fn load(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let list = match storage.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Profile>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, key = %key, "persisted profiles are corrupt; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, key = %key, "failed to read persisted profiles; starting empty");
                Vec::new()
            }
        };
        info!(count = list.len(), key = %key, "profile store loaded");
        Self {
            storage,
            key,
            records: RwLock::new(Records::from_list(list)),
        }
    }

    /// Assign an id and timestamp, append, then persist the whole collection.
    ///
    /// No validation happens here. A failed write is logged and the record
    /// stays in memory.
    pub async fn create(&self, input: ProfileInput) -> Profile {
        let mut records = self.records.write().await;

        let mut new_id = id::generate();
        for _ in 1..MAX_ID_ATTEMPTS {
            if !records.index.contains_key(&new_id) {
                break;
            }
            debug!(id = %new_id, "generated id collided; regenerating");
            new_id = id::generate();
        }

        let profile = Profile::from_input(new_id, input, OffsetDateTime::now_utc());
        records.push(profile.clone());
        self.persist(&records.list).await;

        info!(id = %profile.id, profession = %profile.profession, "helper registered");
        profile
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Profile> {
        let records = self.records.read().await;
        let found = records.index.get(id).map(|&i| records.list[i].clone());
        debug!(id = %id, found = found.is_some(), "profile lookup");
        found
    }

    /// All profiles in creation order.
    pub async fn list(&self) -> Vec<Profile> {
        self.records.read().await.list.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.list.len()
    }

    async fn persist(&self, list: &[Profile]) {
        let blob = match serde_json::to_string(list) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialize profiles; not persisted");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.key, &blob).await {
            warn!(error = %e, key = %self.key, "failed to persist profiles; keeping in-memory state");
        }
    }
}
