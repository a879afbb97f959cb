//! Read-through cache facade with a bounded background writer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lineage_core::{Error, FamilyTree, IndividualId, Result};
use lineage_storage::{CacheBackend, CacheKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Epoch observed before a storage read; a write carrying a stale ticket
/// never outlives an invalidation issued after the read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

struct CacheWrite {
    kind: CacheKind,
    id: i64,
    value: String,
    ticket: CacheTicket,
}

enum Command {
    Write(CacheWrite),
    Flush(oneshot::Sender<()>),
}

/// Cache facade over a [`CacheBackend`].
///
/// Reads are awaited. Population is queued on a bounded channel drained by a
/// single background task; when the queue is full the write is dropped.
/// Invalidation is awaited by the mutation that triggers it.
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    epoch: Arc<AtomicU64>,
    writes: mpsc::Sender<Command>,
}

impl CacheLayer {
    /// Start the facade and its writer task on the current Tokio runtime
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, capacity: usize) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Storage(format!("cache writer needs a Tokio runtime: {}", e)))?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let epoch = Arc::new(AtomicU64::new(0));
        runtime.spawn(run_writer(backend.clone(), epoch.clone(), ttl, rx));
        tracing::debug!(
            "Cache writer started (ttl {:?}, queue {})",
            ttl,
            capacity.max(1)
        );

        Ok(Self {
            backend,
            epoch,
            writes: tx,
        })
    }

    /// Take a ticket before reading the value that will be cached
    pub fn ticket(&self) -> CacheTicket {
        CacheTicket(self.epoch.load(Ordering::Acquire))
    }

    /// Look up and decode a cached value. Backend and decode failures are
    /// logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, id: i64) -> Option<T> {
        let raw = match self.backend.get(kind, id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("Cache miss {}:{}", kind, id);
                return None;
            }
            Err(e) => {
                tracing::warn!("Cache read {}:{} failed: {}", kind, id, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!("Cache hit {}:{}", kind, id);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}:{}: {}", kind, id, e);
                if let Err(e) = self.backend.delete(kind, id).await {
                    tracing::warn!("Cache delete {}:{} failed: {}", kind, id, e);
                }
                None
            }
        }
    }

    /// A cached tree, only if it was built for the same generation count
    pub async fn get_tree(&self, root: IndividualId, generations: u32) -> Option<FamilyTree> {
        let tree: FamilyTree = self.get(CacheKind::Tree, root.get()).await?;
        if tree.generations != generations {
            tracing::debug!(
                "Cached tree {} has {} generation(s), wanted {}",
                root,
                tree.generations,
                generations
            );
            return None;
        }
        Some(tree)
    }

    /// Queue a value for caching without waiting for it to be stored
    pub fn put<T: Serialize>(&self, kind: CacheKind, id: i64, value: &T, ticket: CacheTicket) {
        let value = match serde_json::to_string(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Not caching {}:{}: {}", kind, id, e);
                return;
            }
        };

        let write = CacheWrite {
            kind,
            id,
            value,
            ticket,
        };
        match self.writes.try_send(Command::Write(write)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Cache queue full, dropping write {}:{}", kind, id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Cache writer stopped, dropping write {}:{}", kind, id);
            }
        }
    }

    /// Remove entries; any write queued before this call is discarded
    pub async fn invalidate(&self, keys: &[(CacheKind, i64)]) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for &(kind, id) in keys {
            if let Err(e) = self.backend.delete(kind, id).await {
                tracing::warn!("Cache invalidation {}:{} failed: {}", kind, id, e);
            }
        }
        tracing::debug!("Invalidated {} cache key(s)", keys.len());
    }

    /// Wait until every write queued so far has been handled
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writes.send(Command::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_writer(
    backend: Arc<dyn CacheBackend>,
    epoch: Arc<AtomicU64>,
    ttl: Duration,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        let write = match command {
            Command::Write(write) => write,
            Command::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let current = || CacheTicket(epoch.load(Ordering::Acquire));
        if current() != write.ticket {
            tracing::debug!("Skipping stale cache write {}:{}", write.kind, write.id);
            continue;
        }
        if let Err(e) = backend
            .set(write.kind, write.id, write.value, ttl)
            .await
        {
            tracing::warn!("Cache write {}:{} failed: {}", write.kind, write.id, e);
            continue;
        }
        // An invalidation landed while the value was being stored
        if current() != write.ticket {
            if let Err(e) = backend.delete(write.kind, write.id).await {
                tracing::warn!("Cache delete {}:{} failed: {}", write.kind, write.id, e);
            }
        }
    }
    tracing::debug!("Cache writer stopped");
}
