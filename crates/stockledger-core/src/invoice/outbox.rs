//! Invoices queued while offline, replayed on background sync.

use std::path::PathBuf;
use std::sync::{Mutex as StdMutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::InvoicePayload;
use crate::worker::BackgroundSync;

use super::InvoiceApi;

/// Outbox file name in cache directory
const OUTBOX_FILE: &str = "outbox.json";

// Every read-modify-write of an outbox file in this process goes through here
static FILE_LOCK: StdMutex<()> = StdMutex::new(());

fn file_lock() -> MutexGuard<'static, ()> {
    match FILE_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedInvoice {
    pub id: Uuid,
    pub payload: InvoicePayload,
    pub queued_at: DateTime<Utc>,
}

/// Result of one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub saved: usize,
    pub rejected: usize,
    /// Left in the outbox afterwards: transport failures plus anything
    /// queued while the pass was running.
    pub pending: usize,
}

pub struct Outbox {
    cache_dir: PathBuf,
}

impl Outbox {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn outbox_path(&self) -> PathBuf {
        self.cache_dir.join(OUTBOX_FILE)
    }

    pub fn load(&self) -> Result<Vec<QueuedInvoice>> {
        let _guard = file_lock();
        self.read()
    }

    fn read(&self) -> Result<Vec<QueuedInvoice>> {
        let path = self.outbox_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read outbox file")?;
        serde_json::from_str(&contents).context("Failed to parse outbox file")
    }

    fn write(&self, queue: &[QueuedInvoice]) -> Result<()> {
        let path = self.outbox_path();
        if queue.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.cache_dir)?;
        let contents = serde_json::to_string_pretty(queue)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    /// Queue a payload. Returns the new queue length.
    pub fn push(&self, payload: InvoicePayload) -> Result<usize> {
        let _guard = file_lock();
        let mut queue = self.read()?;
        queue.push(QueuedInvoice {
            id: Uuid::now_v7(),
            payload,
            queued_at: Utc::now(),
        });
        self.write(&queue)?;
        Ok(queue.len())
    }

    /// Drop the given entries, keeping everything else currently on disk.
    /// Returns how many remain.
    pub fn remove(&self, ids: &[Uuid]) -> Result<usize> {
        let _guard = file_lock();
        let mut queue = self.read()?;
        queue.retain(|queued| !ids.contains(&queued.id));
        self.write(&queue)?;
        Ok(queue.len())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Replays the outbox through the invoice API.
pub struct OutboxSync<A> {
    outbox: Outbox,
    api: A,
    // One replay at a time, so an invoice is never sent twice concurrently
    running: Mutex<()>,
}

impl<A: InvoiceApi> OutboxSync<A> {
    pub fn new(outbox: Outbox, api: A) -> Self {
        Self {
            outbox,
            api,
            running: Mutex::new(()),
        }
    }

    /// Send every queued invoice. Saved and rejected invoices leave the
    /// queue; transport failures stay for the next pass.
    pub async fn replay(&self) -> Result<SyncReport> {
        let _guard = self.running.lock().await;
        let queue = self.outbox.load()?;
        let mut report = SyncReport::default();
        let mut done = Vec::new();

        for queued in &queue {
            let payload = &queued.payload;
            let result = match &payload.id {
                Some(id) => self.api.edit(id, payload).await,
                None => self.api.create(payload).await,
            };
            match result {
                Ok(resp) if resp.success => {
                    report.saved += 1;
                    done.push(queued.id);
                }
                Ok(resp) => {
                    warn!(
                        id = payload.id.as_deref().unwrap_or("new"),
                        error = resp.error.as_deref().unwrap_or_default(),
                        "Queued invoice rejected, dropping"
                    );
                    report.rejected += 1;
                    done.push(queued.id);
                }
                Err(e) => {
                    warn!(error = %e, "Queued invoice not sent, keeping");
                }
            }
        }

        // Re-read on write-back so invoices queued during the pass survive
        report.pending = self.outbox.remove(&done)?;
        info!(
            saved = report.saved,
            rejected = report.rejected,
            pending = report.pending,
            "Invoice sync finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl<A: InvoiceApi> BackgroundSync for OutboxSync<A> {
    async fn sync(&self) -> Result<()> {
        self.replay().await.map(|_| ())
    }
}
