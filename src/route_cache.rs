//! Route Cache (C5) — short-lived memoization of attribution results keyed
//! by the `(call_from, call_to)` pair, so repeated calls between the same
//! two parties within `route_cache_ttl` skip a full attribution resolve.
//! Grounded on `number_pool.py`'s `get_cached_route_context`/
//! `set_cached_route_context` pair.

use std::sync::Arc;

use serde_json::Value;

use crate::config::Duration;
use crate::kv::KvStore;
use crate::pool::errors::PoolError;
use crate::pool::keys;

pub struct RouteCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl RouteCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        RouteCache { store, ttl }
    }

    pub async fn get(&self, call_from: &str, call_to: &str) -> Result<Option<Value>, PoolError> {
        let key = keys::route(call_from, call_to);
        match self.store.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    pub async fn set(&self, call_from: &str, call_to: &str, context: &Value) -> Result<(), PoolError> {
        let key = keys::route(call_from, call_to);
        let raw = serde_json::to_string(context).unwrap_or_else(|_| "null".to_string());
        self.store.set(&key, &raw, Some(self.ttl.as_std())).await?;
        Ok(())
    }
}

#[cfg(test)]
impl RouteCache {
    /// Simulates TTL expiry of a route-cache entry.
    pub(crate) async fn test_delete(&self, call_from: &str, call_to: &str) {
        self.store.del(&keys::route(call_from, call_to)).await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_through_ttl() {
        let store = Arc::new(MemoryStore::new());
        let cache = RouteCache::new(store, Duration::from_mins(30 * 24 * 60));
        assert_eq!(cache.get("+15551234567", "+15557654321").await.unwrap(), None);
        cache
            .set("+15551234567", "+15557654321", &json!({"pool_id": 1}))
            .await
            .unwrap();
        let got = cache.get("+15551234567", "+15557654321").await.unwrap();
        assert_eq!(got, Some(json!({"pool_id": 1})));
    }
}
