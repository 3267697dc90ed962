//! In-memory cache implementation using moka
//!
//! Every entry carries its own TTL, enforced through a moka [`Expiry`].

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// JSON-serialized value plus the TTL it was stored with
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // Overwriting a key restarts its clock with the new entry's TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a cache holding at most `max_capacity` entries.
    ///
    /// `default_ttl` is what callers without an opinion of their own should
    /// pass to [`CacheLayer::set`].
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of live entries, after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache
            .set("key1", &"value1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
        assert!(cache.get::<String>("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_on_their_own_ttl() {
        let cache = MemoryCache::new();
        cache.set("short", &1, Duration::from_millis(50)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get::<i32>("short").await.unwrap().is_none());
        assert_eq!(cache.get::<i32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_overwrite_uses_new_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", &"old", Duration::from_secs(60)).await.unwrap();
        cache.set("k", &"new", Duration::from_millis(50)).await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("new"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get::<String>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCache::new();
        for key in ["a", "b", "c"] {
            cache.set(key, &key, Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.entry_count().await, 3);

        cache.delete("a").await.unwrap();
        assert!(cache.get::<String>("a").await.unwrap().is_none());

        cache.clear().await.unwrap();
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_structured_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Page {
            title: String,
            modules: Vec<String>,
        }

        let cache = MemoryCache::new();
        let page = Page {
            title: "Rust".into(),
            modules: vec!["Ownership".into(), "Traits".into()],
        };
        cache.set("page", &page, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<Page>("page").await.unwrap(), Some(page));

        // A value stored under one shape cannot be read back as another.
        assert!(cache.get::<u64>("page").await.is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            #[test]
            fn stored_values_are_returned_until_expiry(
                key in "[a-z:]{1,20}",
                value in any::<i64>(),
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let cache = MemoryCache::new();
                    cache.set(&key, &value, Duration::from_secs(60)).await.unwrap();
                    prop_assert_eq!(cache.get::<i64>(&key).await.unwrap(), Some(value));
                    Ok(())
                })?;
            }
        }
    }
}
