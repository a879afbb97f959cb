//! Cache collaborator trait and an in-process LRU implementation

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Kind of record a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Individual,
    Union,
    Tree,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Union => "union",
            Self::Tree => "tree",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value cache addressed by record kind and integer id.
///
/// Values are opaque serialized payloads. Implementations are best-effort:
/// a failed `set` or `delete` only costs a later cache miss or a stale read.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, kind: CacheKind, id: i64) -> StorageResult<Option<String>>;

    async fn set(&self, kind: CacheKind, id: i64, value: String, ttl: Duration)
        -> StorageResult<()>;

    async fn delete(&self, kind: CacheKind, id: i64) -> StorageResult<()>;
}

/// Longest lifetime an entry is given; longer TTLs are capped
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Thread-safe LRU cache with per-entry expiry
///
/// Expired entries are dropped lazily when they are next read.
pub struct MemoryCache {
    entries: Mutex<LruCache<(CacheKind, i64), CacheEntry>>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, kind: CacheKind, id: i64) -> StorageResult<Option<String>> {
        let mut entries = self.entries.lock().map_err(StorageError::lock)?;
        let key = (kind, id);

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(&key);
                tracing::debug!("Cache entry {}:{} expired", kind, id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        kind: CacheKind,
        id: i64,
        value: String,
        ttl: Duration,
    ) -> StorageResult<()> {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl.min(MAX_TTL)) else {
            tracing::warn!("Cache TTL {:?} out of range, not caching {}:{}", ttl, kind, id);
            return Ok(());
        };
        let mut entries = self.entries.lock().map_err(StorageError::lock)?;
        entries.put((kind, id), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, kind: CacheKind, id: i64) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(StorageError::lock)?;
        entries.pop(&(kind, id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_cache_set_get_delete() {
        let cache = MemoryCache::new(10);

        cache
            .set(CacheKind::Individual, 1, "{\"id\":1}".into(), HOUR)
            .await
            .unwrap();
        assert_eq!(
            cache.get(CacheKind::Individual, 1).await.unwrap().as_deref(),
            Some("{\"id\":1}")
        );
        // Same id under another kind is a different entry
        assert!(cache.get(CacheKind::Tree, 1).await.unwrap().is_none());

        cache.delete(CacheKind::Individual, 1).await.unwrap();
        assert!(cache.get(CacheKind::Individual, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new(10);
        cache
            .set(CacheKind::Union, 7, "u".into(), Duration::ZERO)
            .await
            .unwrap();

        assert!(cache.get(CacheKind::Union, 7).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_huge_ttl_is_capped() {
        let cache = MemoryCache::new(10);
        cache
            .set(CacheKind::Tree, 3, "t".into(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        cache
            .set(CacheKind::Tree, 4, "u".into(), Duration::MAX)
            .await
            .unwrap();

        assert_eq!(cache.get(CacheKind::Tree, 3).await.unwrap().as_deref(), Some("t"));
        assert_eq!(cache.get(CacheKind::Tree, 4).await.unwrap().as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = MemoryCache::new(2);

        cache.set(CacheKind::Individual, 1, "a".into(), HOUR).await.unwrap();
        cache.set(CacheKind::Individual, 2, "b".into(), HOUR).await.unwrap();
        cache.set(CacheKind::Individual, 3, "c".into(), HOUR).await.unwrap();

        assert!(cache.get(CacheKind::Individual, 1).await.unwrap().is_none());
        assert!(cache.get(CacheKind::Individual, 3).await.unwrap().is_some());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
