//! Cache partitions for offline access.
//!
//! `CacheStorage` is the worker's view of the platform cache: a set of named
//! partitions mapping request URLs to stored responses. Two backends are
//! provided:
//! - `MemoryCacheStorage`, for tests and short-lived hosts
//! - `DiskCacheStorage`, an index file plus raw body files per
//!   partition, survives restarts

pub mod disk;
pub mod memory;
pub mod storage;

pub use disk::{DiskCacheStorage, EntryMeta, PartitionSummary};
pub use memory::MemoryCacheStorage;
pub use storage::{CacheError, CacheResult, CacheStorage};
