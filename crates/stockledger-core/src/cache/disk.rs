//! Disk-backed cache storage.
//!
//! Each partition is a directory under `<cache_dir>/partitions/`:
//!
//! ```text
//! partitions/static-v1/index.json     creation time, key -> entry metadata
//! partitions/static-v1/bodies/<id>    raw response body
//! ```
//!
//! Lookups only parse the index; a body is read when its entry matches.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Request, Response};
use crate::utils::format_age;

use super::storage::{check_cacheable, CacheError, CacheResult, CacheStorage};

const PARTITION_DIR: &str = "partitions";
const INDEX_FILE: &str = "index.json";
const BODY_DIR: &str = "bodies";

/// Everything about a stored response except its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub body_id: Uuid,
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub url: String,
    pub size: usize,
    pub cached_at: DateTime<Utc>,
}

impl EntryMeta {
    fn into_response(self, body: Vec<u8>) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body,
            url: self.url,
        }
    }

    pub fn age_display(&self) -> String {
        format_age(self.cached_at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PartitionIndex {
    created_at: DateTime<Utc>,
    entries: HashMap<String, EntryMeta>,
}

impl PartitionIndex {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            entries: HashMap::new(),
        }
    }
}

/// Size and freshness of one partition, for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: usize,
    pub bytes: usize,
    /// Age of the most recently stored entry.
    pub last_updated: Option<String>,
}

pub struct DiskCacheStorage {
    cache_dir: PathBuf,
    // Serializes read-modify-write cycles on partition indexes
    lock: Mutex<()>,
}

impl DiskCacheStorage {
    pub fn new(cache_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(cache_dir.join(PARTITION_DIR))?;
        Ok(Self {
            cache_dir,
            lock: Mutex::new(()),
        })
    }

    fn partition_dir(&self, name: &str) -> CacheResult<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(CacheError::Uncacheable(format!(
                "invalid partition name {:?}",
                name
            )));
        }
        Ok(self.cache_dir.join(PARTITION_DIR).join(name))
    }

    fn body_path(&self, name: &str, id: Uuid) -> CacheResult<PathBuf> {
        Ok(self
            .partition_dir(name)?
            .join(BODY_DIR)
            .join(id.simple().to_string()))
    }

    fn io_err(name: &str) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
        move |source| CacheError::Io {
            name: name.to_string(),
            source,
        }
    }

    fn load_index(&self, name: &str) -> CacheResult<Option<PartitionIndex>> {
        let path = self.partition_dir(name)?.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(Self::io_err(name))?;
        let index = serde_json::from_str(&contents).map_err(|source| CacheError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        Ok(Some(index))
    }

    fn save_index(&self, name: &str, index: &PartitionIndex) -> CacheResult<()> {
        let dir = self.partition_dir(name)?;
        std::fs::create_dir_all(dir.join(BODY_DIR)).map_err(Self::io_err(name))?;
        let contents = serde_json::to_string(index).map_err(|source| CacheError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        // Write then rename so readers never see a half-written index
        let path = dir.join(INDEX_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(Self::io_err(name))?;
        std::fs::rename(&tmp, &path).map_err(Self::io_err(name))?;
        Ok(())
    }

    fn read_body(&self, name: &str, meta: EntryMeta) -> CacheResult<Response> {
        let body = std::fs::read(self.body_path(name, meta.body_id)?).map_err(Self::io_err(name))?;
        Ok(meta.into_response(body))
    }

    fn partition_names(&self) -> CacheResult<Vec<String>> {
        let dir = self.cache_dir.join(PARTITION_DIR);
        let entries = std::fs::read_dir(&dir).map_err(Self::io_err(PARTITION_DIR))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(Self::io_err(PARTITION_DIR))?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Every partition with its index, oldest first. Unreadable indexes sort
    /// first with `None` so activation can still delete them.
    fn indexes(&self) -> CacheResult<Vec<(String, CacheResult<PartitionIndex>)>> {
        let mut indexes = Vec::new();
        for name in self.partition_names()? {
            match self.load_index(&name) {
                Ok(Some(index)) => indexes.push((name, Ok(index))),
                Ok(None) => {}
                Err(e) => {
                    debug!(cache = %name, error = %e, "Unreadable partition");
                    indexes.push((name, Err(e)));
                }
            }
        }
        indexes.sort_by(|(a_name, a), (b_name, b)| {
            let a_created = a.as_ref().ok().map(|i| i.created_at);
            let b_created = b.as_ref().ok().map(|i| i.created_at);
            (a_created, a_name).cmp(&(b_created, b_name))
        });
        Ok(indexes)
    }

    /// Summaries of every partition. Unreadable partitions are skipped.
    pub async fn summaries(&self) -> CacheResult<Vec<PartitionSummary>> {
        let _guard = self.lock.lock().await;
        let mut summaries = Vec::new();
        for (name, index) in self.indexes()? {
            let Ok(index) = index else { continue };
            let newest = index.entries.values().max_by_key(|e| e.cached_at);
            summaries.push(PartitionSummary {
                entries: index.entries.len(),
                bytes: index.entries.values().map(|e| e.size).sum(),
                last_updated: newest.map(EntryMeta::age_display),
                name,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn keys(&self) -> CacheResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.indexes()?.into_iter().map(|(name, _)| name).collect())
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.partition_dir(name)?.join(INDEX_FILE).exists())
    }

    async fn open(&self, name: &str) -> CacheResult<()> {
        let _guard = self.lock.lock().await;
        if self.load_index(name)?.is_none() {
            self.save_index(name, &PartitionIndex::new())?;
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let _guard = self.lock.lock().await;
        let dir = self.partition_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(Self::io_err(name))?;
        Ok(true)
    }

    async fn match_in(&self, name: &str, request: &Request) -> CacheResult<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let _guard = self.lock.lock().await;
        let meta = self
            .load_index(name)?
            .and_then(|mut index| index.entries.remove(request.cache_key()));
        meta.map(|meta| self.read_body(name, meta)).transpose()
    }

    async fn match_any(&self, request: &Request) -> CacheResult<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let _guard = self.lock.lock().await;
        for (name, index) in self.indexes()? {
            let Ok(mut index) = index else {
                debug!(cache = %name, "Skipping unreadable partition");
                continue;
            };
            let Some(meta) = index.entries.remove(request.cache_key()) else {
                continue;
            };
            match self.read_body(&name, meta) {
                Ok(response) => return Ok(Some(response)),
                Err(e) => debug!(cache = %name, error = %e, "Skipping unreadable entry"),
            }
        }
        Ok(None)
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> CacheResult<()> {
        check_cacheable(request, response)?;
        let _guard = self.lock.lock().await;
        let mut index = self.load_index(name)?.unwrap_or_else(PartitionIndex::new);

        // Body first, so the index never points at a missing file
        let body_id = Uuid::now_v7();
        let body_path = self.body_path(name, body_id)?;
        if let Some(parent) = body_path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::io_err(name))?;
        }
        std::fs::write(&body_path, &response.body).map_err(Self::io_err(name))?;

        let meta = EntryMeta {
            body_id,
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            url: response.url.clone(),
            size: response.body.len(),
            cached_at: Utc::now(),
        };
        let replaced = index.entries.insert(request.cache_key().to_string(), meta);
        self.save_index(name, &index)?;

        if let Some(old) = replaced {
            if let Err(e) = std::fs::remove_file(self.body_path(name, old.body_id)?) {
                debug!(cache = %name, error = %e, "Failed to remove replaced body");
            }
        }
        Ok(())
    }
}
