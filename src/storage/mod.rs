//! Storage Module
//!
//! Pluggable backends behind a single locking and access contract.
//!
//! A backend hands out two kinds of guards. A shared guard allows lookups
//! and may be held by many callers at once. An exclusive guard allows
//! lookups and writes and excludes every other guard. Callers release a
//! guard explicitly with `shared_unlock` / `unlock` so the release can
//! reach a remote store.
//!
//! The remote backend's shared guard does not lock anything. Only its
//! exclusive guard gives mutual exclusion, across every process using the
//! same store.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::cache::Entry;
use crate::error::{CacheError, Result};

mod memory;
mod remote;

pub use self::memory::MemoryStorage;
pub use self::remote::{RedisStorage, RedisStorageOptions};

// == Storage Kind ==
/// Which backend a storage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Redis,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Redis => "redis",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "redis" => Ok(StorageKind::Redis),
            other => Err(CacheError::UnknownStorage(other.to_string())),
        }
    }
}

// == Storage Trait ==
/// A key/value backend usable by the cache engine.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Which backend this is.
    fn kind(&self) -> StorageKind;

    /// Acquires the exclusive lock.
    async fn lock<'a>(&'a self) -> Result<Box<dyn ExclusiveGuard + 'a>>;

    /// Acquires the shared lock.
    async fn shared_lock<'a>(&'a self) -> Result<Box<dyn SharedGuard + 'a>>;

    /// Removes every entry. Handles its own locking.
    async fn flush(&self) -> Result<()>;

    /// Removes expired entries and returns how many were removed.
    ///
    /// Backends that expire keys natively keep the default no-op.
    async fn delete_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Lookup available under either lock.
#[async_trait]
pub trait EntryRead: Send + Sync {
    /// Returns the stored entry, expired or not.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;
}

/// Held while the shared lock is taken.
#[async_trait]
pub trait SharedGuard: EntryRead {
    async fn shared_unlock(self: Box<Self>) -> Result<()>;
}

/// Held while the exclusive lock is taken.
#[async_trait]
pub trait ExclusiveGuard: EntryRead {
    /// Unconditionally overwrites the entry for `key`.
    async fn set(&mut self, key: &str, entry: Entry) -> Result<()>;

    /// Removes `key`. No-op if absent.
    async fn delete(&mut self, key: &str) -> Result<()>;

    async fn unlock(self: Box<Self>) -> Result<()>;
}
