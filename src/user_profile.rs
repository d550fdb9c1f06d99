//! User Profile Store (C6) — a cache keyed by `(id_type, user_id)` for
//! caller-level context that outlives any one call (consent flags, known
//! geography, prior attribution hints). Grounded on `number_pool.py`'s
//! `get_user_context`/`set_user_context`/`update_user_context`/
//! `remove_user_context`, including the caller-id ignore-list applied only
//! to phone-keyed entries.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::Duration;
use crate::kv::KvStore;
use crate::pool::errors::PoolError;
use crate::pool::keys;
use crate::pool::types::merge_request_context;

/// Identifier types a user context can be keyed by (spec §4.6/the original
/// `schemas/zar.py::USER_ID_TYPES`). `Sid` uses the literal wire value
/// `"session_id"`, not `"sid"` — see DESIGN.md's Open Question decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdType {
    Phone,
    Email,
    SessionId,
}

impl UserIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIdType::Phone => "phone",
            UserIdType::Email => "email",
            UserIdType::SessionId => "session_id",
        }
    }
}

pub struct UserProfileStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    ignored_caller_ids: Vec<String>,
}

impl UserProfileStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration, ignored_caller_ids: Vec<String>) -> Self {
        UserProfileStore {
            store,
            ttl,
            ignored_caller_ids,
        }
    }

    fn is_ignored(&self, id_type: UserIdType, user_id: &str) -> bool {
        id_type == UserIdType::Phone && self.ignored_caller_ids.iter().any(|id| id == user_id)
    }

    pub async fn get(&self, id_type: UserIdType, user_id: &str) -> Result<Option<Map<String, Value>>, PoolError> {
        if self.is_ignored(id_type, user_id) {
            return Ok(None);
        }
        let key = keys::user_context(id_type.as_str(), user_id);
        match self.store.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    pub async fn set(
        &self,
        id_type: UserIdType,
        user_id: &str,
        context: Map<String, Value>,
    ) -> Result<(), PoolError> {
        if self.is_ignored(id_type, user_id) {
            return Ok(());
        }
        let key = keys::user_context(id_type.as_str(), user_id);
        let raw = serde_json::to_string(&context).unwrap_or_else(|_| "{}".to_string());
        self.store.set(&key, &raw, Some(self.ttl.as_std())).await?;
        Ok(())
    }

    /// Merge `context` into the existing profile (overwrite-on-conflict for
    /// every key, matching `dictmerge(overwrite=True)` in the original).
    pub async fn update(
        &self,
        id_type: UserIdType,
        user_id: &str,
        context: &Map<String, Value>,
    ) -> Result<Map<String, Value>, PoolError> {
        if self.is_ignored(id_type, user_id) {
            return Ok(context.clone());
        }
        let mut current = self.get(id_type, user_id).await?.unwrap_or_default();
        merge_request_context(&mut current, context);
        self.set(id_type, user_id, current.clone()).await?;
        Ok(current)
    }

    pub async fn remove(&self, id_type: UserIdType, user_id: &str) -> Result<(), PoolError> {
        let key = keys::user_context(id_type.as_str(), user_id);
        self.store.del(&key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use serde_json::json;

    fn store() -> UserProfileStore {
        UserProfileStore::new(
            Arc::new(MemoryStore::new()),
            Duration::from_hours(24 * 14),
            vec!["anonymous".to_string(), "266696687".to_string()],
        )
    }

    #[tokio::test]
    async fn ignored_caller_ids_never_persist() {
        let profile = store();
        profile
            .set(UserIdType::Phone, "anonymous", Map::new())
            .await
            .unwrap();
        assert_eq!(profile.get(UserIdType::Phone, "anonymous").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ignore_list_only_applies_to_phone() {
        let profile = store();
        let mut ctx = Map::new();
        ctx.insert("note".to_string(), json!("vip"));
        profile
            .set(UserIdType::Email, "anonymous", ctx.clone())
            .await
            .unwrap();
        assert_eq!(profile.get(UserIdType::Email, "anonymous").await.unwrap(), Some(ctx));
    }

    #[tokio::test]
    async fn update_merges_and_overwrites() {
        let profile = store();
        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        profile.set(UserIdType::SessionId, "s1", first).await.unwrap();
        let mut second = Map::new();
        second.insert("a".to_string(), json!(2));
        second.insert("b".to_string(), json!(3));
        let merged = profile.update(UserIdType::SessionId, "s1", &second).await.unwrap();
        assert_eq!(merged.get("a"), Some(&json!(2)));
        assert_eq!(merged.get("b"), Some(&json!(3)));
    }
}
