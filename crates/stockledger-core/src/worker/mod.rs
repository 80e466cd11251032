//! The offline cache manager and its platform seams.
//!
//! `OfflineCacheManager` implements `ServiceWorker`: install, activate,
//! fetch, sync and push handlers invoked by a `WorkerHost`. Requests are
//! routed by `Strategy`: network-first for dynamic routes, API calls and
//! query strings, cache-first for everything else on the same origin.

pub mod host;
pub mod manager;
pub mod strategy;

pub use host::{
    BackgroundSync, FetchOutcome, ResponseSource, ServiceWorker, WorkerHost, SYNC_INVOICES_TAG,
};
pub use manager::OfflineCacheManager;
pub use strategy::Strategy;
