use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// TTL cache seam used by the cached sources. Swappable for a shared cache.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V, ttl: Duration);
    async fn invalidate(&self, key: &str);
    async fn invalidate_prefix(&self, prefix: &str);
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct InMemoryCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V> InMemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Cache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        None
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }
}
