//! Network access for the offline cache manager.
//!
//! The `Fetcher` trait is the worker's view of the network. `HttpFetcher`
//! implements it with reqwest; HTTP error statuses come back as ordinary
//! responses and only transport failures are errors.

pub mod error;
pub mod fetcher;

pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher};
