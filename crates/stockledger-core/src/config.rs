//! Application and cache configuration.
//!
//! `Config` is the persisted application configuration (backend location,
//! cache version, HTTP timeout), stored at
//! `~/.config/stockledger/config.json`.
//!
//! `CacheConfig` is everything the offline cache manager needs to know:
//! partition names, precache lists and the network-first route table. It is
//! built from `Config` and handed to the manager explicitly.

use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "stockledger";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend base URL
pub const BASE_URL_ENV: &str = "STOCKLEDGER_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:5000";

const DEFAULT_CACHE_VERSION: &str = "v1";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const OFFLINE_URL: &str = "/offline.html";

/// Assets that must be cached for install to succeed.
const CORE_ASSETS: &[&str] = &[
    "/",
    "/offline.html",
    "/static/manifest.json",
    "/static/sw.js",
    "/static/icons/icon-512x512.png",
];

/// Assets cached at install time when bandwidth allows.
const SECONDARY_ASSETS: &[&str] = &[
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/css/bootstrap.min.css",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.1/css/all.min.css",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/js/bootstrap.bundle.min.js",
    "/static/icons/icon-72x72.png",
    "/static/icons/icon-96x96.png",
    "/static/icons/icon-128x128.png",
    "/static/icons/icon-144x144.png",
    "/static/icons/icon-152x152.png",
    "/static/icons/icon-192x192.png",
    "/static/icons/icon-384x384.png",
    "/static/icons/splash-640x1136.png",
    "/static/icons/splash-750x1334.png",
    "/static/icons/splash-828x1792.png",
    "/static/icons/splash-1125x2436.png",
    "/static/icons/splash-1170x2532.png",
    "/static/icons/splash-1179x2556.png",
    "/static/icons/splash-1284x2778.png",
    "/static/icons/splash-1290x2796.png",
];

/// Routes served network-first.
const NETWORK_FIRST_ROUTES: &[&str] = &["/products", "/invoices", "/customers", "/reports"];

const NOTIFICATION_TITLE: &str = "Inventory System";
const NOTIFICATION_ICON: &str = "/static/icons/icon-192x192.png";
const NOTIFICATION_BADGE: &str = "/static/icons/icon-72x72.png";
const NOTIFICATION_VIBRATE: &[u32] = &[100, 50, 100];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub cache_version: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Invalid base URL: {}", self.base_url))
    }

    /// Per-backend cache directory, so two shops never share partitions.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(host) = self.base_url()?.host_str() {
            path = path.join(host);
        }
        Ok(path)
    }

    pub fn cache_config(&self) -> Result<CacheConfig> {
        Ok(CacheConfig::with_version(self.base_url()?, &self.cache_version))
    }
}

/// Title, icon and vibration pattern for push notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub title: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibrate: NOTIFICATION_VIBRATE.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Origin of the application; requests elsewhere are not handled.
    pub origin: Url,
    pub static_cache: String,
    pub dynamic_cache: String,
    /// Page served for failed navigations.
    pub offline_url: String,
    pub core_assets: Vec<String>,
    pub secondary_assets: Vec<String>,
    /// URL substrings that select the network-first strategy.
    pub network_first_routes: Vec<String>,
    pub notification: NotificationConfig,
}

impl CacheConfig {
    pub fn new(origin: Url) -> Self {
        Self::with_version(origin, DEFAULT_CACHE_VERSION)
    }

    /// Partition names are `static-<version>` and `dynamic-<version>`;
    /// bumping the version retires the previous partitions on activation.
    pub fn with_version(origin: Url, version: &str) -> Self {
        Self {
            origin,
            static_cache: format!("static-{}", version),
            dynamic_cache: format!("dynamic-{}", version),
            offline_url: OFFLINE_URL.to_string(),
            core_assets: CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
            secondary_assets: SECONDARY_ASSETS.iter().map(|s| s.to_string()).collect(),
            network_first_routes: NETWORK_FIRST_ROUTES.iter().map(|s| s.to_string()).collect(),
            notification: NotificationConfig::default(),
        }
    }

    /// Names of the partitions that survive activation.
    pub fn current_names(&self) -> [&str; 2] {
        [&self.static_cache, &self.dynamic_cache]
    }

    /// Resolve an asset path against the origin. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<String> {
        let url = self
            .origin
            .join(path)
            .with_context(|| format!("Invalid asset path: {}", path))?;
        Ok(url.to_string())
    }

    pub fn offline_key(&self) -> Result<String> {
        self.resolve(&self.offline_url)
    }

    /// Unparseable URLs are treated as foreign.
    pub fn is_same_origin(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.origin() == self.origin.origin(),
            Err(_) => false,
        }
    }
}
