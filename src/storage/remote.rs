//! Redis Storage
//!
//! Entries are stored as JSON strings and expire through Redis' own
//! per-key TTL. Writers serialize through a lock key shared by every cache
//! pointed at the same database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, trace, warn};

use crate::cache::{current_timestamp_ns, Entry};
use crate::error::{CacheError, Result};
use crate::storage::{EntryRead, ExclusiveGuard, SharedGuard, Storage, StorageKind};

/// Deletes the lock key only if it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

static LOCK_TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

// == Options ==
/// Tuning for the distributed lock.
#[derive(Debug, Clone)]
pub struct RedisStorageOptions {
    /// Key used for the distributed lock
    pub lock_key: String,
    /// Server-side lifetime of a held lock
    pub lock_ttl: Duration,
    /// Wait between acquisition attempts
    pub retry_delay: Duration,
}

impl Default for RedisStorageOptions {
    fn default() -> Self {
        Self {
            lock_key: "refresh_cache:lock".to_string(),
            lock_ttl: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
        }
    }
}

// == Redis Storage ==
pub struct RedisStorage {
    conn: MultiplexedConnection,
    options: RedisStorageOptions,
}

impl RedisStorage {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`) with default options.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, RedisStorageOptions::default()).await
    }

    /// Connects to `url` with custom lock options.
    ///
    /// Fails with `CacheError::InvalidConfig` if the lock key is empty or the
    /// lock lifetime is zero.
    pub async fn connect_with(url: &str, options: RedisStorageOptions) -> Result<Self> {
        if options.lock_key.is_empty() {
            return Err(CacheError::InvalidConfig("redis lock key is empty".to_string()));
        }
        if options.lock_ttl.is_zero() {
            return Err(CacheError::InvalidConfig("redis lock ttl is zero".to_string()));
        }
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Connected to redis at {}", url);
        Ok(Self { conn, options })
    }

    pub fn options(&self) -> &RedisStorageOptions {
        &self.options
    }

    fn next_token() -> String {
        let seq = LOCK_TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}:{}", std::process::id(), current_timestamp_ns(), seq)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Redis
    }

    async fn lock<'a>(&'a self) -> Result<Box<dyn ExclusiveGuard + 'a>> {
        let mut conn = self.conn.clone();
        let token = Self::next_token();
        let ttl_ms = self.options.lock_ttl.as_millis().max(1) as u64;
        let mut attempts: u64 = 0;

        loop {
            let reply: redis::Value = redis::cmd("SET")
                .arg(&self.options.lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;
            if !matches!(reply, redis::Value::Nil) {
                break;
            }
            attempts += 1;
            if attempts % 100 == 0 {
                warn!(
                    "Still waiting for redis lock {} after {} attempts",
                    self.options.lock_key, attempts
                );
            }
            tokio::time::sleep(self.options.retry_delay).await;
        }
        trace!("Acquired redis lock {}", self.options.lock_key);

        Ok(Box::new(RedisExclusive {
            conn,
            lock_key: self.options.lock_key.clone(),
            token,
            released: false,
        }))
    }

    async fn shared_lock<'a>(&'a self) -> Result<Box<dyn SharedGuard + 'a>> {
        Ok(Box::new(RedisShared {
            conn: self.conn.clone(),
        }))
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

async fn fetch(conn: &MultiplexedConnection, key: &str) -> Result<Option<Entry>> {
    let mut conn = conn.clone();
    let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

async fn release(mut conn: MultiplexedConnection, lock_key: &str, token: &str) -> Result<()> {
    let released: i64 = redis::Script::new(RELEASE_SCRIPT)
        .key(lock_key)
        .arg(token)
        .invoke_async(&mut conn)
        .await?;
    if released == 0 {
        warn!("Redis lock {} expired before it was released", lock_key);
    }
    Ok(())
}

// == Guards ==
struct RedisShared {
    conn: MultiplexedConnection,
}

#[async_trait]
impl EntryRead for RedisShared {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        fetch(&self.conn, key).await
    }
}

#[async_trait]
impl SharedGuard for RedisShared {
    async fn shared_unlock(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct RedisExclusive {
    conn: MultiplexedConnection,
    lock_key: String,
    token: String,
    released: bool,
}

#[async_trait]
impl EntryRead for RedisExclusive {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        fetch(&self.conn, key).await
    }
}

#[async_trait]
impl ExclusiveGuard for RedisExclusive {
    async fn set(&mut self, key: &str, entry: Entry) -> Result<()> {
        let payload = serde_json::to_string(&entry)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        if entry.expiration != 0 {
            let remaining_ns = entry.expiration.saturating_sub(current_timestamp_ns());
            if remaining_ns <= 0 {
                // Already expired; storing it would only hide the old value.
                return self.delete(key).await;
            }
            let remaining_ms = ((remaining_ns + 999_999) / 1_000_000) as u64;
            cmd.arg("PX").arg(remaining_ms);
        }
        let _: () = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn unlock(self: Box<Self>) -> Result<()> {
        let mut guard = self;
        guard.released = true;
        release(guard.conn.clone(), &guard.lock_key, &guard.token).await
    }
}

impl Drop for RedisExclusive {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let conn = self.conn.clone();
        let lock_key = std::mem::take(&mut self.lock_key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = release(conn, &lock_key, &token).await {
                        warn!("Failed to release redis lock {}: {}", lock_key, err);
                    }
                });
            }
            Err(_) => warn!(
                "Redis lock {} dropped outside a runtime; it expires on its own",
                lock_key
            ),
        }
    }
}
