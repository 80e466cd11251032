use async_trait::async_trait;

use crate::models::{Notification, Request, Response};
use crate::net::FetchError;

/// Tag of the background sync event that replays queued invoices.
pub const SYNC_INVOICES_TAG: &str = "sync-invoices";

/// Capabilities the hosting platform lends to the worker.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Activate the newly installed worker without waiting for old pages to close.
    async fn skip_waiting(&self);

    /// Take control of pages that are already open.
    async fn claim_clients(&self);

    async fn show_notification(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Routine run when the host fires the invoice sync event.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    async fn sync(&self) -> anyhow::Result<()>;
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePage,
    /// The empty 408 produced when nothing else is available.
    Synthetic,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Cache => write!(f, "cache"),
            Self::OfflinePage => write!(f, "offline page"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker answers the request itself.
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Not ours; the host applies its default handling.
    Passthrough,
}

/// The worker's event handlers, one per platform event.
#[async_trait]
pub trait ServiceWorker: Send + Sync {
    async fn install(&self) -> anyhow::Result<()>;

    async fn activate(&self) -> anyhow::Result<()>;

    async fn fetch(&self, request: &Request) -> Result<FetchOutcome, FetchError>;

    async fn sync(&self, tag: &str) -> anyhow::Result<()>;

    /// `payload` is the push message text, if the message had a body.
    async fn push(&self, payload: Option<&str>) -> anyhow::Result<()>;
}
