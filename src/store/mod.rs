pub mod disk;
pub mod memory;

use crate::core::cache::KeyValueCollection;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, warn};

/// Hands out named collections, persisted in a `fjall` keyspace when one
/// could be opened and kept in memory otherwise.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens the keyspace under `data_path/cache`. Falls back to memory-only
    /// collections when no path is given or the keyspace cannot be opened.
    pub fn open(data_path: Option<&Path>) -> Self {
        let keyspace = data_path.and_then(|path| {
            let cache_dir = path.join("cache");
            match fjall::Config::new(&cache_dir).open() {
                Ok(keyspace) => {
                    debug!("Opened price cache at {}", cache_dir.display());
                    Some(keyspace)
                }
                Err(e) => {
                    warn!("Price cache at {} unavailable: {}", cache_dir.display(), e);
                    None
                }
            }
        });

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// The collection called `name`, created on first use.
    pub fn collection(&self, name: &str) -> Arc<dyn KeyValueCollection> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return existing.clone();
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(name.to_string())
            .or_insert_with(|| self.create_collection(name))
            .clone()
    }

    fn create_collection(&self, name: &str) -> Arc<dyn KeyValueCollection> {
        let partition = self.keyspace.as_ref().and_then(|keyspace| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map_err(|e| warn!("Cannot open cache partition {}: {}", name, e))
                .ok()
        });
        match partition {
            Some(partition) => Arc::new(DiskCollection::new(partition)),
            None => Arc::new(MemoryCollection::new()),
        }
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
