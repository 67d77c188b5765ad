//! In-Memory Storage
//!
//! HashMap storage guarded by a tokio reader/writer lock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::{current_timestamp_ns, Entry};
use crate::error::Result;
use crate::storage::{EntryRead, ExclusiveGuard, SharedGuard, Storage, StorageKind};

// == Memory Storage ==
/// Process-local storage. Shared guards run concurrently; an exclusive guard
/// waits for all of them.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    async fn lock<'a>(&'a self) -> Result<Box<dyn ExclusiveGuard + 'a>> {
        let entries = self.entries.write().await;
        Ok(Box::new(MemoryExclusive { entries }))
    }

    async fn shared_lock<'a>(&'a self) -> Result<Box<dyn SharedGuard + 'a>> {
        let entries = self.entries.read().await;
        Ok(Box::new(MemoryShared { entries }))
    }

    async fn flush(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn delete_expired(&self) -> Result<usize> {
        let now = current_timestamp_ns();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired_at(now));
        Ok(before - entries.len())
    }
}

// == Guards ==
struct MemoryShared<'a> {
    entries: RwLockReadGuard<'a, HashMap<String, Entry>>,
}

#[async_trait]
impl EntryRead for MemoryShared<'_> {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.entries.get(key).cloned())
    }
}

#[async_trait]
impl SharedGuard for MemoryShared<'_> {
    async fn shared_unlock(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct MemoryExclusive<'a> {
    entries: RwLockWriteGuard<'a, HashMap<String, Entry>>,
}

#[async_trait]
impl EntryRead for MemoryExclusive<'_> {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.entries.get(key).cloned())
    }
}

#[async_trait]
impl ExclusiveGuard for MemoryExclusive<'_> {
    async fn set(&mut self, key: &str, entry: Entry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn unlock(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
