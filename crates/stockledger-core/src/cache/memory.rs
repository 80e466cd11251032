//! In-process cache storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Request, Response};

use super::storage::{check_cacheable, CacheResult, CacheStorage};

struct Partition {
    name: String,
    entries: HashMap<String, Response>,
}

impl Partition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// Partitions held in memory, lost when the process exits.
#[derive(Default)]
pub struct MemoryCacheStorage {
    partitions: RwLock<Vec<Partition>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a partition, 0 if it does not exist.
    pub async fn len(&self, name: &str) -> usize {
        self.partitions
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect())
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        Ok(self.partitions.read().await.iter().any(|p| p.name == name))
    }

    async fn open(&self, name: &str) -> CacheResult<()> {
        let mut partitions = self.partitions.write().await;
        if !partitions.iter().any(|p| p.name == name) {
            partitions.push(Partition::new(name));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|p| p.name != name);
        Ok(partitions.len() != before)
    }

    async fn match_in(&self, name: &str, request: &Request) -> CacheResult<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.entries.get(request.cache_key()).cloned()))
    }

    async fn match_any(&self, request: &Request) -> CacheResult<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        Ok(self
            .partitions
            .read()
            .await
            .iter()
            .find_map(|p| p.entries.get(request.cache_key()).cloned()))
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> CacheResult<()> {
        check_cacheable(request, response)?;
        let mut partitions = self.partitions.write().await;
        let index = match partitions.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                partitions.push(Partition::new(name));
                partitions.len() - 1
            }
        };
        partitions[index]
            .entries
            .insert(request.cache_key().to_string(), response.clone());
        Ok(())
    }
}
