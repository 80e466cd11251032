use crate::config::CacheConfig;

/// URL fragment that always marks an API call.
const API_MARKER: &str = "/api/";

/// How a same-origin request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live response preferred, cache and offline page as fallback.
    NetworkFirst,
    /// Stored response preferred, refreshed in the background.
    CacheFirst,
}

impl Strategy {
    /// Dynamic routes, API calls and anything with a query string go to the
    /// network first; everything else is treated as a static asset.
    pub fn select(config: &CacheConfig, url: &str) -> Self {
        let dynamic = config
            .network_first_routes
            .iter()
            .any(|route| url.contains(route.as_str()));

        if dynamic || url.contains(API_MARKER) || url.contains('?') {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkFirst => write!(f, "network-first"),
            Self::CacheFirst => write!(f, "cache-first"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn config() -> CacheConfig {
        CacheConfig::new(Url::parse("https://shop.test").unwrap())
    }

    #[test]
    fn test_dynamic_routes_are_network_first() {
        let config = config();
        for url in [
            "https://shop.test/products",
            "https://shop.test/invoices/12/edit",
            "https://shop.test/customers/new",
            "https://shop.test/reports",
        ] {
            assert_eq!(Strategy::select(&config, url), Strategy::NetworkFirst, "{}", url);
        }
    }

    #[test]
    fn test_api_and_query_urls_are_network_first() {
        let config = config();
        assert_eq!(
            Strategy::select(&config, "https://shop.test/api/stock"),
            Strategy::NetworkFirst
        );
        assert_eq!(
            Strategy::select(&config, "https://shop.test/static/app.css?v=3"),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_other_urls_are_cache_first() {
        let config = config();
        for url in [
            "https://shop.test/",
            "https://shop.test/offline.html",
            "https://shop.test/static/manifest.json",
            "https://shop.test/static/icons/icon-192x192.png",
            "https://shop.test/new_invoice",
        ] {
            assert_eq!(Strategy::select(&config, url), Strategy::CacheFirst, "{}", url);
        }
    }

    #[test]
    fn test_route_match_is_substring() {
        // Substring match, so this static path counts as a dynamic route
        let config = config();
        assert_eq!(
            Strategy::select(&config, "https://shop.test/static/products.css"),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_custom_route_table() {
        let mut config = config();
        config.network_first_routes = vec!["/stock".to_string()];
        assert_eq!(
            Strategy::select(&config, "https://shop.test/products"),
            Strategy::CacheFirst
        );
        assert_eq!(
            Strategy::select(&config, "https://shop.test/stock/levels"),
            Strategy::NetworkFirst
        );
    }
}
