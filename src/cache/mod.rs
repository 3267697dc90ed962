//! Cache layer
//!
//! Process-local cache for rendered pages and other hot data, backed by moka.
//!
//! ```rust,ignore
//! use educa::cache::{create_cache, CacheLayer};
//! use educa::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("page:course:rust", &page, Duration::from_secs(900)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// Values go through JSON, so any serde type can be cached. The generic
/// methods keep this trait out of `dyn`; share a concrete cache in an `Arc`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value; `None` when missing or expired
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value that expires after `ttl`
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration)
        -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Shared cache handle
pub type SharedCache = Arc<MemoryCache>;

/// Build the cache from configuration
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

/// Key under which the public page of a course is cached
pub fn course_page_key(slug: &str) -> String {
    format!("page:course:{}", slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 60,
            page_ttl_seconds: 30,
            max_capacity: 100,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(60));

        cache.set("k", &1u32, cache.default_ttl()).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(1));
    }

    #[test]
    fn test_course_page_key() {
        assert_eq!(course_page_key("rust-basics"), "page:course:rust-basics");
    }
}
