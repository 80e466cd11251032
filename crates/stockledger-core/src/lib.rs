//! Stockledger core library.
//!
//! The client layer of the Stockledger inventory and invoicing app:
//!
//! - [`worker`]: the offline cache manager. Precaches assets into a static
//!   and a dynamic partition, serves same-origin requests network-first or
//!   cache-first, purges retired partitions, dispatches sync and push.
//! - [`invoice`]: collects the invoice form into a payload and submits it to
//!   the create or edit endpoint.
//!
//! The two share nothing but the [`models`] and [`config`] modules.

pub mod cache;
pub mod config;
pub mod invoice;
pub mod models;
pub mod net;
pub mod utils;
pub mod worker;

pub use config::{CacheConfig, Config};
