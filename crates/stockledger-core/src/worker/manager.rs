//! The offline cache manager.
//!
//! Implements the worker's event handlers over a `CacheStorage` and a
//! `Fetcher`. Writes that follow a served response (storing a fresh copy,
//! refreshing a cached one) run as spawned tasks so the response is never
//! held up by the cache; `settle` waits for them.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::config::CacheConfig;
use crate::models::{Notification, NotificationOptions, Request, Response};
use crate::net::{FetchError, Fetcher};

use super::host::{
    BackgroundSync, FetchOutcome, ResponseSource, ServiceWorker, WorkerHost, SYNC_INVOICES_TAG,
};
use super::strategy::Strategy;

pub struct OfflineCacheManager<S, F> {
    config: Arc<CacheConfig>,
    storage: Arc<S>,
    fetcher: Arc<F>,
    host: Arc<dyn WorkerHost>,
    sync: Option<Arc<dyn BackgroundSync>>,
    background: Mutex<JoinSet<()>>,
}

impl<S, F> OfflineCacheManager<S, F>
where
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
{
    pub fn new(
        config: CacheConfig,
        storage: Arc<S>,
        fetcher: Arc<F>,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            fetcher,
            host,
            sync: None,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Routine to run for the `sync-invoices` event.
    pub fn with_sync(mut self, sync: Arc<dyn BackgroundSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Wait for every background cache write spawned so far.
    pub async fn settle(&self) {
        let mut tasks = match self.background.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background cache task failed");
            }
        }
    }

    fn spawn_background<Fut>(&self, task: Fut)
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = match self.background.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Reap finished tasks so a host that never settles does not accumulate them
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Store a copy of `response` in the dynamic partition, off the response path.
    fn store_in_background(&self, request: Request, response: Response) {
        let storage = Arc::clone(&self.storage);
        let partition = self.config.dynamic_cache.clone();
        self.spawn_background(async move {
            if let Err(e) = storage.put(&partition, &request, &response).await {
                debug!(url = %request.url, error = %e, "Failed to store response");
            }
        });
    }

    /// Re-fetch `request` and overwrite the dynamic copy. Failures are ignored.
    fn refresh_in_background(&self, request: Request) {
        let storage = Arc::clone(&self.storage);
        let fetcher = Arc::clone(&self.fetcher);
        let partition = self.config.dynamic_cache.clone();
        self.spawn_background(async move {
            let response = match fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background refresh failed");
                    return;
                }
            };
            if let Err(e) = storage.put(&partition, &request, &response).await {
                debug!(url = %request.url, error = %e, "Failed to store refreshed response");
            }
        });
    }

    /// Cache lookup that treats storage errors as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_any(request).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn network_first(&self, request: &Request) -> (Response, ResponseSource) {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_in_background(request.clone(), response.clone());
                (response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, falling back to cache");
                self.offline_fallback(request).await
            }
        }
    }

    async fn offline_fallback(&self, request: &Request) -> (Response, ResponseSource) {
        if let Some(cached) = self.lookup(request).await {
            return (cached, ResponseSource::Cache);
        }

        if request.is_navigation() {
            match self.config.offline_key() {
                Ok(key) => {
                    if let Some(page) = self.lookup(&Request::get(key)).await {
                        return (page, ResponseSource::OfflinePage);
                    }
                    warn!(url = %request.url, "Offline page is not cached");
                }
                Err(e) => warn!(error = %e, "Offline page URL is invalid"),
            }
        }

        (Response::request_timeout(), ResponseSource::Synthetic)
    }

    async fn cache_first(&self, request: &Request) -> Result<(Response, ResponseSource), FetchError> {
        if let Some(cached) = self.lookup(request).await {
            self.refresh_in_background(request.clone());
            return Ok((cached, ResponseSource::Cache));
        }

        let response = self.fetcher.fetch(request).await?;
        self.store_in_background(request.clone(), response.clone());
        Ok((response, ResponseSource::Network))
    }

    /// Fetch every core asset and store them all, or store nothing.
    async fn precache_core(&self) -> Result<usize> {
        let requests = self
            .config
            .core_assets
            .iter()
            .map(|path| self.config.resolve(path).map(Request::get))
            .collect::<Result<Vec<_>>>()?;

        let responses = try_join_all(requests.iter().map(|req| self.fetcher.fetch(req)))
            .await
            .context("Failed to fetch core assets")?;

        for (request, response) in requests.iter().zip(&responses) {
            if !response.ok() {
                bail!(
                    "Core asset {} returned status {}",
                    request.url,
                    response.status
                );
            }
        }

        let partition = &self.config.static_cache;
        self.storage.open(partition).await?;
        for (request, response) in requests.iter().zip(&responses) {
            self.storage
                .put(partition, request, response)
                .await
                .with_context(|| format!("Failed to cache core asset {}", request.url))?;
        }
        Ok(requests.len())
    }

    /// Fetch and store whatever secondary assets are reachable.
    async fn precache_secondary(&self) -> usize {
        let partition = &self.config.dynamic_cache;
        if let Err(e) = self.storage.open(partition).await {
            warn!(cache = %partition, error = %e, "Failed to open partition for secondary assets");
            return 0;
        }

        let mut requests = Vec::new();
        for path in &self.config.secondary_assets {
            match self.config.resolve(path) {
                Ok(url) => requests.push(Request::get(url)),
                Err(e) => warn!(asset = %path, error = %e, "Skipping secondary asset"),
            }
        }

        let results = join_all(requests.iter().map(|req| self.fetcher.fetch(req))).await;

        let mut stored = 0;
        for (request, result) in requests.iter().zip(results) {
            let response = match result {
                Ok(response) if response.ok() => response,
                Ok(response) => {
                    warn!(url = %request.url, status = response.status, "Secondary asset not cached");
                    continue;
                }
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Secondary asset not cached");
                    continue;
                }
            };
            match self.storage.put(partition, request, &response).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(url = %request.url, error = %e, "Secondary asset not cached"),
            }
        }
        stored
    }

    /// Delete every partition whose name is not current. Returns the deleted names.
    pub async fn purge_obsolete(&self) -> Result<Vec<String>> {
        let current = self.config.current_names();
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if current.contains(&name.as_str()) {
                continue;
            }
            info!(cache = %name, "Deleting old cache");
            self.storage
                .delete(&name)
                .await
                .with_context(|| format!("Failed to delete cache {}", name))?;
            deleted.push(name);
        }
        Ok(deleted)
    }

    fn notification(&self, body: &str) -> Notification {
        let config = &self.config.notification;
        Notification {
            title: config.title.clone(),
            options: NotificationOptions {
                body: body.to_string(),
                icon: config.icon.clone(),
                badge: config.badge.clone(),
                vibrate: config.vibrate.clone(),
            },
        }
    }
}

#[async_trait]
impl<S, F> ServiceWorker for OfflineCacheManager<S, F>
where
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
{
    async fn install(&self) -> Result<()> {
        info!("Caching core and secondary assets");
        let (core, secondary) = tokio::join!(self.precache_core(), self.precache_secondary());
        let core = core.context("Install failed")?;
        info!(core, secondary, "Install complete");

        self.host.skip_waiting().await;
        Ok(())
    }

    async fn activate(&self) -> Result<()> {
        let deleted = self.purge_obsolete().await?;
        debug!(deleted = deleted.len(), "Old caches removed");
        self.host.claim_clients().await;
        Ok(())
    }

    async fn fetch(&self, request: &Request) -> Result<FetchOutcome, FetchError> {
        if !self.config.is_same_origin(&request.url) {
            return Ok(FetchOutcome::Passthrough);
        }

        let strategy = Strategy::select(&self.config, &request.url);
        let (response, source) = match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await?,
        };
        debug!(url = %request.url, %strategy, %source, status = response.status, "Served");
        Ok(FetchOutcome::Respond { response, source })
    }

    async fn sync(&self, tag: &str) -> Result<()> {
        if tag != SYNC_INVOICES_TAG {
            debug!(tag, "Ignoring unknown sync tag");
            return Ok(());
        }
        match &self.sync {
            Some(routine) => routine.sync().await,
            None => {
                warn!(tag, "No sync routine configured");
                Ok(())
            }
        }
    }

    async fn push(&self, payload: Option<&str>) -> Result<()> {
        let notification = self.notification(payload.unwrap_or_default());
        self.host.show_notification(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use reqwest::Url;

    use crate::cache::MemoryCacheStorage;
    use crate::models::RequestMode;

    const ORIGIN: &str = "https://shop.test";

    fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeFetcher {
        bodies: Mutex<HashMap<String, (u16, String)>>,
        offline: AtomicBool,
        calls: AtomicUsize,
        sent_bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeFetcher {
        fn serve(&self, url: &str, status: u16, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, body.to_string()));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent_bodies.lock().unwrap().push(request.body.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Unreachable(request.url.clone()));
            }
            let bodies = self.bodies.lock().unwrap();
            match bodies.get(&request.url) {
                Some((status, body)) => {
                    Ok(Response::new(*status, "", body.as_bytes()).with_url(request.url.clone()))
                }
                None => Ok(Response::new(404, "Not Found", Vec::new())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        events: Mutex<Vec<String>>,
        notifications: Mutex<Vec<Notification>>,
    }

    impl RecordingHost {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkerHost for RecordingHost {
        async fn skip_waiting(&self) {
            self.events.lock().unwrap().push("skip_waiting".to_string());
        }

        async fn claim_clients(&self) {
            self.events.lock().unwrap().push("claim_clients".to_string());
        }

        async fn show_notification(&self, notification: Notification) -> Result<()> {
            self.notifications.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSync {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl BackgroundSync for CountingSync {
        async fn sync(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        manager: OfflineCacheManager<MemoryCacheStorage, FakeFetcher>,
        storage: Arc<MemoryCacheStorage>,
        fetcher: Arc<FakeFetcher>,
        host: Arc<RecordingHost>,
    }

    fn fixture() -> Fixture {
        let mut config = CacheConfig::new(Url::parse(ORIGIN).unwrap());
        config.secondary_assets = vec![
            "https://cdn.example.com/bootstrap.css".to_string(),
            "/static/icons/icon-72x72.png".to_string(),
        ];
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(FakeFetcher::default());
        let host = Arc::new(RecordingHost::default());
        let manager = OfflineCacheManager::new(
            config,
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            host.clone(),
        );
        Fixture {
            manager,
            storage,
            fetcher,
            host,
        }
    }

    fn serve_core_assets(fetcher: &FakeFetcher) {
        for path in [
            "/",
            "/offline.html",
            "/static/manifest.json",
            "/static/sw.js",
            "/static/icons/icon-512x512.png",
        ] {
            fetcher.serve(&url(path), 200, path);
        }
    }

    fn respond(outcome: FetchOutcome) -> (Response, ResponseSource) {
        match outcome {
            FetchOutcome::Respond { response, source } => (response, source),
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    // -------------------------------------------------------------------------
    // Install / activate
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_install_caches_core_and_secondary_assets() {
        let fx = fixture();
        serve_core_assets(&fx.fetcher);
        fx.fetcher.serve("https://cdn.example.com/bootstrap.css", 200, "css");

        fx.manager.install().await.unwrap();

        assert_eq!(fx.storage.len("static-v1").await, 5);
        // Icon returns 404 from the fake, so only the CDN asset is stored
        assert_eq!(fx.storage.len("dynamic-v1").await, 1);
        assert_eq!(fx.host.events(), vec!["skip_waiting"]);
    }

    #[tokio::test]
    async fn test_install_fails_when_a_core_asset_is_missing() {
        let fx = fixture();
        serve_core_assets(&fx.fetcher);
        fx.fetcher.serve(&url("/static/sw.js"), 500, "");

        assert!(fx.manager.install().await.is_err());
        assert_eq!(fx.storage.len("static-v1").await, 0);
        assert!(fx.host.events().is_empty());
    }

    #[tokio::test]
    async fn test_install_fails_offline() {
        let fx = fixture();
        fx.fetcher.set_offline(true);
        assert!(fx.manager.install().await.is_err());
    }

    #[tokio::test]
    async fn test_activate_removes_obsolete_partitions() {
        let fx = fixture();
        for name in ["static-v0", "dynamic-v0", "static-v1", "dynamic-v1", "inventory-system-v1"] {
            fx.storage.open(name).await.unwrap();
        }

        fx.manager.activate().await.unwrap();

        assert_eq!(
            fx.storage.keys().await.unwrap(),
            vec!["static-v1", "dynamic-v1"]
        );
        assert_eq!(fx.host.events(), vec!["claim_clients"]);
    }

    // -------------------------------------------------------------------------
    // Fetch
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cross_origin_requests_pass_through() {
        let fx = fixture();
        let outcome = fx
            .manager
            .fetch(&Request::get("https://cdn.example.com/bootstrap.css"))
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert_eq!(fx.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_first_stores_copy_in_dynamic_partition() {
        let fx = fixture();
        fx.fetcher.serve(&url("/products"), 200, "products");
        let req = Request::get(url("/products"));

        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.text(), "products");
        assert_eq!(source, ResponseSource::Network);

        fx.manager.settle().await;
        let stored = fx.storage.match_in("dynamic-v1", &req).await.unwrap();
        assert_eq!(stored.map(|r| r.text()), Some("products".to_string()));
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let fx = fixture();
        let req = Request::get(url("/invoices"));
        fx.storage
            .put("dynamic-v1", &req, &Response::new(200, "OK", "cached invoices"))
            .await
            .unwrap();
        fx.fetcher.set_offline(true);

        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.text(), "cached invoices");
        assert_eq!(source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_network_first_navigation_gets_offline_page() {
        let fx = fixture();
        fx.storage
            .put(
                "static-v1",
                &Request::get(url("/offline.html")),
                &Response::new(200, "OK", "you are offline"),
            )
            .await
            .unwrap();
        fx.fetcher.set_offline(true);

        let req = Request::navigate(url("/reports"));
        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.text(), "you are offline");
        assert_eq!(source, ResponseSource::OfflinePage);
    }

    #[tokio::test]
    async fn test_network_first_non_navigation_gets_synthetic_timeout() {
        let fx = fixture();
        fx.storage
            .put(
                "static-v1",
                &Request::get(url("/offline.html")),
                &Response::new(200, "OK", "you are offline"),
            )
            .await
            .unwrap();
        fx.fetcher.set_offline(true);

        let req = Request::get(url("/api/stock"));
        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.status, 408);
        assert_eq!(response.status_text, "Request timed out.");
        assert_eq!(source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_network_first_navigation_without_offline_page() {
        let fx = fixture();
        fx.fetcher.set_offline(true);

        let req = Request {
            mode: RequestMode::Navigate,
            ..Request::get(url("/customers"))
        };
        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.status, 408);
        assert_eq!(source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_cache_first_serves_stored_response() {
        let fx = fixture();
        let req = Request::get(url("/static/app.css"));
        fx.fetcher.serve(&req.url, 200, "v1");

        // First request misses and stores the network copy
        let (_, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(source, ResponseSource::Network);
        fx.manager.settle().await;

        // Later requests are answered from the cache even with the network gone
        fx.fetcher.set_offline(true);
        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.text(), "v1");
        assert_eq!(source, ResponseSource::Cache);
        fx.manager.settle().await;
    }

    #[tokio::test]
    async fn test_cache_first_refreshes_in_background() {
        let fx = fixture();
        let req = Request::get(url("/static/app.js"));
        fx.storage
            .put("static-v1", &req, &Response::new(200, "OK", "old"))
            .await
            .unwrap();
        fx.fetcher.serve(&req.url, 200, "new");

        let (response, _) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(response.text(), "old");

        fx.manager.settle().await;
        let refreshed = fx.storage.match_in("dynamic-v1", &req).await.unwrap().unwrap();
        assert_eq!(refreshed.text(), "new");
        assert_eq!(fx.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_is_an_error() {
        let fx = fixture();
        fx.fetcher.set_offline(true);
        let result = fx.manager.fetch(&Request::get(url("/static/missing.css"))).await;
        assert!(matches!(result, Err(FetchError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_post_is_forwarded_with_body_but_never_cached() {
        let fx = fixture();
        fx.fetcher.serve(&url("/invoices/42/edit"), 200, "{\"success\":true}");
        let req = Request::get(url("/invoices/42/edit"))
            .with_method("POST")
            .with_header("Content-Type", "application/json")
            .with_body("{\"customer_id\":\"7\"}");

        let (response, source) = respond(fx.manager.fetch(&req).await.unwrap());
        assert_eq!(source, ResponseSource::Network);
        assert!(response.ok());
        assert_eq!(
            *fx.fetcher.sent_bodies.lock().unwrap(),
            vec![b"{\"customer_id\":\"7\"}".to_vec()]
        );

        fx.manager.settle().await;
        assert_eq!(fx.storage.len("dynamic-v1").await, 0);
    }

    // -------------------------------------------------------------------------
    // Sync / push
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sync_runs_routine_only_for_invoice_tag() {
        let routine = Arc::new(CountingSync::default());
        let fx = fixture();
        let manager = fx.manager.with_sync(routine.clone());

        manager.sync("other-tag").await.unwrap();
        assert_eq!(routine.runs.load(Ordering::SeqCst), 0);

        manager.sync(SYNC_INVOICES_TAG).await.unwrap();
        assert_eq!(routine.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_without_routine_is_a_no_op() {
        let fx = fixture();
        fx.manager.sync(SYNC_INVOICES_TAG).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_shows_fixed_notification() {
        let fx = fixture();
        fx.manager.push(Some("Invoice #12 paid")).await.unwrap();

        let notifications = fx.host.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        let n = &notifications[0];
        assert_eq!(n.title, "Inventory System");
        assert_eq!(n.options.body, "Invoice #12 paid");
        assert_eq!(n.options.icon, "/static/icons/icon-192x192.png");
        assert_eq!(n.options.badge, "/static/icons/icon-72x72.png");
        assert_eq!(n.options.vibrate, vec![100, 50, 100]);
    }
}
