use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Request, Response};

/// Partial content can never be stored, matching platform cache rules.
const PARTIAL_CONTENT_STATUS: u16 = 206;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache partition {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request cannot be cached: {0}")]
    Uncacheable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Named partitions of request/response pairs.
///
/// Every method is a single atomic operation; callers never hold a partition
/// open across awaits. Only GET requests are ever matched or stored.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all existing partitions, in creation order.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    async fn has(&self, name: &str) -> CacheResult<bool>;

    /// Create the partition if it does not exist yet.
    async fn open(&self, name: &str) -> CacheResult<()>;

    /// Remove a partition and all its entries. Returns false if it was absent.
    async fn delete(&self, name: &str) -> CacheResult<bool>;

    async fn match_in(&self, name: &str, request: &Request) -> CacheResult<Option<Response>>;

    /// Look the request up in every partition, oldest partition first.
    async fn match_any(&self, request: &Request) -> CacheResult<Option<Response>>;

    /// Store a response, creating the partition if needed. Replaces any
    /// existing entry for the same request.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> CacheResult<()>;
}

/// Reject pairs the cache refuses to store.
pub(crate) fn check_cacheable(request: &Request, response: &Response) -> CacheResult<()> {
    if !request.is_get() {
        return Err(CacheError::Uncacheable(format!(
            "{} {}",
            request.method, request.url
        )));
    }
    if response.status == PARTIAL_CONTENT_STATUS {
        return Err(CacheError::Uncacheable(format!(
            "partial response for {}",
            request.url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cacheable() {
        let ok = Response::new(200, "OK", "x");
        assert!(check_cacheable(&Request::get("https://shop.test/"), &ok).is_ok());

        let post = Request::get("https://shop.test/new_invoice").with_method("POST");
        assert!(matches!(
            check_cacheable(&post, &ok),
            Err(CacheError::Uncacheable(_))
        ));

        let partial = Response::new(206, "Partial Content", "x");
        assert!(check_cacheable(&Request::get("https://shop.test/a.png"), &partial).is_err());

        // Error statuses are still cacheable
        let not_found = Response::new(404, "Not Found", "");
        assert!(check_cacheable(&Request::get("https://shop.test/missing"), &not_found).is_ok());
    }
}
