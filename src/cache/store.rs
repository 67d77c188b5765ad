//! Cache Store Module
//!
//! Main cache engine combining a pluggable storage with expiration checks,
//! refresh dispatch and the janitor.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::refresh::{boxed_callback, RefreshDispatcher};
use crate::cache::{Entry, Expiration, Value};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::storage::{
    ExclusiveGuard, MemoryStorage, RedisStorage, RedisStorageOptions, Storage, StorageKind,
};
use crate::tasks::Janitor;

struct CacheInner {
    /// None = entries written with `Expiration::Default` never expire
    default_expiration: Option<Duration>,
    storage: Arc<dyn Storage>,
    refresh: RefreshDispatcher,
    janitor: Option<Janitor>,
}

// == Cache ==
/// Handle to a cache. Clones share the same storage and background tasks.
///
/// Background tasks stop on `shutdown` or when the last handle is dropped.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

/// Non-owning handle, for refresh callbacks that write back into the cache.
#[derive(Clone)]
pub struct WeakCache {
    inner: Weak<CacheInner>,
}

impl WeakCache {
    /// Returns the cache if it is still alive.
    pub fn upgrade(&self) -> Option<Cache> {
        self.inner.upgrade().map(|inner| Cache { inner })
    }
}

impl Cache {
    // == Constructor ==
    /// Creates a cache over `storage`.
    ///
    /// # Arguments
    /// * `default_expiration` - Lifetime for writes using `Expiration::Default`;
    ///   None or zero means never expire
    /// * `cleanup_interval` - Janitor sweep interval; None or zero disables the
    ///   janitor. Ignored for storage that expires keys natively
    /// * `refresh_workers` - Size of the refresh worker pool; 0 disables refresh
    /// * `storage` - The backend, owned by the cache from here on
    ///
    /// Fails with `CacheError::Runtime` if background tasks are requested
    /// outside a tokio runtime.
    pub fn new(
        default_expiration: Option<Duration>,
        cleanup_interval: Option<Duration>,
        refresh_workers: usize,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let default_expiration = default_expiration.filter(|d| !d.is_zero());
        let cleanup_interval = cleanup_interval.filter(|d| !d.is_zero());

        let janitor = match (storage.kind(), cleanup_interval) {
            (StorageKind::Memory, Some(interval)) => {
                Some(Janitor::spawn(storage.clone(), interval)?)
            }
            (StorageKind::Redis, Some(_)) => {
                debug!("Redis expires keys natively, janitor not started");
                None
            }
            (_, None) => None,
        };
        let refresh = RefreshDispatcher::spawn(refresh_workers)?;

        info!(
            "Cache created: storage={}, default_expiration={:?}, refresh_workers={}",
            storage.kind(),
            default_expiration,
            refresh_workers
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                default_expiration,
                storage,
                refresh,
                janitor,
            }),
        })
    }

    /// Builds the configured storage and a cache over it.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn Storage> = match config.storage {
            StorageKind::Memory => Arc::new(MemoryStorage::new()),
            StorageKind::Redis => {
                let options = RedisStorageOptions {
                    lock_key: config.redis_lock_key.clone(),
                    ..RedisStorageOptions::default()
                };
                Arc::new(RedisStorage::connect_with(&config.redis_url, options).await?)
            }
        };
        Self::new(
            config.default_expiration(),
            config.cleanup_interval(),
            config.refresh_workers,
            storage,
        )
    }

    pub fn downgrade(&self) -> WeakCache {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.inner.storage.kind()
    }

    pub fn default_expiration(&self) -> Option<Duration> {
        self.inner.default_expiration
    }

    // == Get ==
    /// Returns the value for `key`, or None if it is absent or expired.
    ///
    /// A live entry past its refresh deadline is queued for refresh; the
    /// current value is still returned right away.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let guard = self.inner.storage.shared_lock().await?;
        let lookup = guard.get(key).await;
        guard.shared_unlock().await?;

        let entry = match lookup? {
            Some(entry) if !entry.expired() => entry,
            _ => return Ok(None),
        };
        if entry.deadline_reached() {
            self.inner.refresh.dispatch(key).await;
        }
        Ok(Some(entry.value))
    }

    /// Returns the value for `key` deserialized into `T`.
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        let json = value
            .to_json()
            .ok_or_else(|| CacheError::type_mismatch(key, "serializable"))?;
        Ok(Some(serde_json::from_value(json)?))
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// # Arguments
    /// * `expiration` - When the entry expires
    /// * `refresh` - Time until the entry becomes stale and is refreshed on
    ///   the next read; None or zero disables refresh for this entry
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiration: Expiration,
        refresh: Option<Duration>,
    ) -> Result<()> {
        let entry = self.new_entry(value.into(), expiration, refresh);
        let mut guard = self.inner.storage.lock().await?;
        let outcome = guard.set(key, entry).await;
        guard.unlock().await?;
        outcome
    }

    /// Stores `object` as JSON.
    pub async fn set_object<T: Serialize + ?Sized>(
        &self,
        key: &str,
        object: &T,
        expiration: Expiration,
        refresh: Option<Duration>,
    ) -> Result<()> {
        let value = Value::Json(serde_json::to_value(object)?);
        self.set(key, value, expiration, refresh).await
    }

    // == Add ==
    /// Stores `value` only if `key` holds no live entry.
    ///
    /// Fails with `CacheError::AlreadyExists` otherwise.
    pub async fn add(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiration: Expiration,
        refresh: Option<Duration>,
    ) -> Result<()> {
        let value = value.into();
        let mut guard = self.inner.storage.lock().await?;
        let existing = Self::live_entry(&mut *guard, key).await;
        let outcome = match existing {
            Ok(Some(_)) => Err(CacheError::AlreadyExists(key.to_string())),
            Ok(None) => {
                let entry = self.new_entry(value, expiration, refresh);
                guard.set(key, entry).await
            }
            Err(err) => Err(err),
        };
        guard.unlock().await?;
        outcome
    }

    // == Replace ==
    /// Stores `value` only if `key` already holds a live entry.
    ///
    /// Fails with `CacheError::NotFound` otherwise.
    pub async fn replace(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiration: Expiration,
        refresh: Option<Duration>,
    ) -> Result<()> {
        let value = value.into();
        let mut guard = self.inner.storage.lock().await?;
        let existing = Self::live_entry(&mut *guard, key).await;
        let outcome = match existing {
            Ok(Some(_)) => {
                let entry = self.new_entry(value, expiration, refresh);
                guard.set(key, entry).await
            }
            Ok(None) => Err(CacheError::NotFound(key.to_string())),
            Err(err) => Err(err),
        };
        guard.unlock().await?;
        outcome
    }

    // == Delete ==
    /// Removes `key`. Does nothing if it is absent.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.storage.lock().await?;
        let outcome = guard.delete(key).await;
        guard.unlock().await?;
        outcome
    }

    // == Flush ==
    /// Removes every entry.
    pub async fn flush(&self) -> Result<()> {
        self.inner.storage.flush().await
    }

    /// Sweeps expired entries now and returns how many were removed.
    pub async fn delete_expired(&self) -> Result<usize> {
        self.inner.storage.delete_expired().await
    }

    // == Refresh ==
    /// Sets the callback run for keys whose refresh deadline has passed.
    ///
    /// The callback is expected to write a fresh value with `set`. Errors
    /// and panics are logged and otherwise ignored; the stale entry will be
    /// queued again on a later read.
    pub async fn on_refresh_needed<F, Fut>(&self, callback: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .refresh
            .set_callback(Some(boxed_callback(callback)))
            .await;
    }

    pub async fn clear_refresh_callback(&self) {
        self.inner.refresh.set_callback(None).await;
    }

    /// Number of keys queued for refresh or being refreshed.
    pub async fn refresh_pending(&self) -> usize {
        self.inner.refresh.pending().await
    }

    // == Shutdown ==
    /// Stops the janitor and the refresh workers. Reads and writes keep
    /// working; stale keys are no longer refreshed.
    pub fn shutdown(&self) {
        if let Some(janitor) = &self.inner.janitor {
            janitor.stop();
        }
        self.inner.refresh.stop();
        info!("Cache background tasks stopped");
    }

    // == Internals ==
    /// Runs `update` on the live value for `key` and writes the result back
    /// with the entry's timestamps unchanged, all under one exclusive lock.
    pub(super) async fn update_live<T, F>(&self, key: &str, update: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&Value) -> Result<(Value, T)> + Send,
    {
        let mut guard = self.inner.storage.lock().await?;
        let outcome = Self::update_locked(&mut *guard, key, update).await;
        guard.unlock().await?;
        outcome
    }

    async fn update_locked<T, F>(
        guard: &mut (dyn ExclusiveGuard + '_),
        key: &str,
        update: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnOnce(&Value) -> Result<(Value, T)> + Send,
    {
        let Some(entry) = Self::live_entry(guard, key).await? else {
            return Err(CacheError::NotFound(key.to_string()));
        };
        let (value, output) = update(&entry.value)?;
        guard.set(key, entry.with_value(value)).await?;
        Ok(output)
    }

    async fn live_entry(guard: &mut (dyn ExclusiveGuard + '_), key: &str) -> Result<Option<Entry>> {
        Ok(guard.get(key).await?.filter(|entry| !entry.expired()))
    }

    fn new_entry(&self, value: Value, expiration: Expiration, refresh: Option<Duration>) -> Entry {
        let expires_in = match expiration {
            Expiration::Never => None,
            Expiration::After(duration) if !duration.is_zero() => Some(duration),
            Expiration::Default | Expiration::After(_) => self.inner.default_expiration,
        };
        Entry::new(value, expires_in, refresh)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("storage", &self.inner.storage.kind())
            .field("default_expiration", &self.inner.default_expiration)
            .field("janitor", &self.inner.janitor.is_some())
            .finish()
    }
}
