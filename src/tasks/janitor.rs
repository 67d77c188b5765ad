//! Janitor Task
//!
//! Background task that periodically removes expired entries from storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::storage::Storage;

/// Owns the sweep task. Dropping the janitor stops it.
pub(crate) struct Janitor {
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Spawns a task that sweeps `storage` every `interval`.
    ///
    /// The first sweep runs one full interval after spawning.
    ///
    /// # Arguments
    /// * `storage` - Storage to sweep; only backends that override
    ///   `delete_expired` are affected
    /// * `interval` - Time between sweeps
    pub(crate) fn spawn(storage: Arc<dyn Storage>, interval: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| CacheError::Runtime(format!("janitor needs a runtime: {}", err)))?;

        let handle = runtime.spawn(async move {
            info!("Starting janitor with interval of {:?}", interval);

            loop {
                tokio::time::sleep(interval).await;

                match storage.delete_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!("Janitor: removed {} expired entries", removed);
                    }
                    Ok(_) => debug!("Janitor: no expired entries found"),
                    Err(err) => warn!("Janitor sweep failed: {}", err),
                }
            }
        });

        Ok(Self { handle })
    }

    pub(crate) fn stop(&self) {
        self.handle.abort();
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
