//! Refresh Cache - An async key/value cache with background refresh
//!
//! Entries expire after a configurable lifetime. Entries past their refresh
//! deadline are still served while a worker pool runs a user callback to
//! reload them. Storage is either process memory or a shared Redis database.

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
mod tasks;

pub use cache::{Cache, Expiration, Value, WeakCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use storage::{MemoryStorage, RedisStorage, Storage, StorageKind};
