//! Refresh Dispatch
//!
//! Stale keys are queued for a fixed pool of workers that run the user's
//! refresh callback. A key stays in the in-flight set from the moment it is
//! queued until its callback has finished, so a key is never queued twice.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{CacheError, Result};

/// Capacity of the refresh queue.
pub const REFRESH_QUEUE_CAPACITY: usize = 100;

pub(crate) type RefreshFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub(crate) type RefreshCallback = Arc<dyn Fn(String) -> RefreshFuture + Send + Sync>;

/// Boxes a user callback into the dispatcher's callback type.
pub(crate) fn boxed_callback<F, Fut>(callback: F) -> RefreshCallback
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |key: String| Box::pin(callback(key)) as RefreshFuture)
}

#[derive(Default)]
struct RefreshState {
    callback: RwLock<Option<RefreshCallback>>,
    in_flight: Mutex<HashSet<String>>,
}

impl RefreshState {
    async fn release(&self, key: &str) {
        self.in_flight.lock().await.remove(key);
    }
}

// == Refresh Dispatcher ==
pub(crate) struct RefreshDispatcher {
    state: Arc<RefreshState>,
    /// None when the pool is empty and refresh is disabled
    sender: Option<mpsc::Sender<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl RefreshDispatcher {
    /// Starts `worker_count` workers. Zero disables dispatch entirely.
    pub(crate) fn spawn(worker_count: usize) -> Result<Self> {
        let state = Arc::new(RefreshState::default());
        if worker_count == 0 {
            return Ok(Self {
                state,
                sender: None,
                workers: Vec::new(),
            });
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| CacheError::Runtime(format!("refresh workers need a runtime: {}", err)))?;
        let (sender, receiver) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (1..=worker_count)
            .map(|id| handle.spawn(run_worker(id, receiver.clone(), state.clone())))
            .collect();
        info!("Started {} refresh workers", worker_count);

        Ok(Self {
            state,
            sender: Some(sender),
            workers,
        })
    }

    pub(crate) async fn set_callback(&self, callback: Option<RefreshCallback>) {
        *self.state.callback.write().await = callback;
    }

    /// Queues `key` unless it is already queued or being refreshed.
    ///
    /// Never waits on the queue: a full queue hands the send to a
    /// background task.
    pub(crate) async fn dispatch(&self, key: &str) {
        let Some(sender) = &self.sender else {
            return;
        };
        {
            let mut in_flight = self.state.in_flight.lock().await;
            if !in_flight.insert(key.to_string()) {
                trace!("Refresh for {} already in flight", key);
                return;
            }
        }

        match sender.try_send(key.to_string()) {
            Ok(()) => debug!("Queued refresh for {}", key),
            Err(TrySendError::Full(key)) => {
                debug!("Refresh queue full, deferring {}", key);
                let sender = sender.clone();
                let state = self.state.clone();
                tokio::spawn(async move {
                    if let Err(err) = sender.send(key).await {
                        state.release(&err.0).await;
                    }
                });
            }
            Err(TrySendError::Closed(key)) => {
                debug!("Refresh workers stopped, dropping {}", key);
                self.state.release(&key).await;
            }
        }
    }

    /// Number of keys queued or being refreshed.
    pub(crate) async fn pending(&self) -> usize {
        self.state.in_flight.lock().await.len()
    }

    pub(crate) fn stop(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl Drop for RefreshDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    state: Arc<RefreshState>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(key) = next else {
            break;
        };

        let callback = state.callback.read().await.clone();
        match callback {
            Some(callback) => {
                // Run on its own task so a panicking callback cannot take the
                // worker down with it.
                match tokio::spawn(callback(key.clone())).await {
                    Ok(Ok(())) => debug!("Worker {} refreshed {}", id, key),
                    Ok(Err(err)) => warn!("Worker {} failed to refresh {}: {:#}", id, key, err),
                    Err(err) => error!("Refresh callback for {} panicked: {}", key, err),
                }
            }
            None => debug!("No refresh callback registered, skipping {}", key),
        }

        state.release(&key).await;
    }
    debug!("Refresh worker {} exiting", id);
}
