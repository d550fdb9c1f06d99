//! Static Number Map (C7) — numbers that are permanently assigned to a
//! single context rather than leased/returned through the pool lifecycle
//! (e.g. a business's published tracking line). Grounded on
//! `number_pool.py`'s `get_static_number_context`/`set_static_number_context`.

use std::sync::Arc;

use serde_json::Value;

use crate::kv::KvStore;
use crate::pool::errors::PoolError;
use crate::pool::keys;

pub struct StaticNumberMap {
    store: Arc<dyn KvStore>,
}

impl StaticNumberMap {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        StaticNumberMap { store }
    }

    pub async fn get(&self, number: &str) -> Result<Option<Value>, PoolError> {
        let key = keys::static_number(number);
        match self.store.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// Static assignments have no TTL — they live until explicitly
    /// overwritten, matching the original's unconditional `redis.set`.
    pub async fn set(&self, number: &str, context: &Value) -> Result<(), PoolError> {
        let key = keys::static_number(number);
        let raw = serde_json::to_string(context).unwrap_or_else(|_| "null".to_string());
        self.store.set(&key, &raw, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips() {
        let map = StaticNumberMap::new(Arc::new(MemoryStore::new()));
        assert_eq!(map.get("5551112222").await.unwrap(), None);
        map.set("5551112222", &json!({"business": "acme"})).await.unwrap();
        assert_eq!(
            map.get("5551112222").await.unwrap(),
            Some(json!({"business": "acme"}))
        );
    }
}
