//! Pool Init & Admin (C9) — init/reset/refresh/stats operations over the
//! pool state engine, wired up to the HTTP admin routes in spec §6.
//! Grounded on `number_pool.py`'s admin methods; the command-routing shape
//! (one function per admin verb, returning a serializable report) follows
//! the teacher's original `admin/mod.rs` dispatch idiom.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::catalog::CatalogReader;
use crate::config::Store as StoreConfig;
use crate::kv::redis_store::RedisStore;
use crate::pool::engine::{PoolEngine, PoolStats};
use crate::pool::errors::PoolError;

#[derive(Debug, Serialize)]
pub struct InitReport {
    pub pools_initialized: HashMap<i64, usize>,
}

#[derive(Debug, Serialize)]
pub struct ResetReport {
    pub removed: usize,
    pub added: usize,
}

pub struct AdminService {
    engine: Arc<PoolEngine>,
    /// Concrete handle to the Redis connection backing `engine`'s store, when
    /// running against Redis. `RedisStore` clones share the same swappable
    /// pool internally, so calling `reconnect` here also refreshes the
    /// connection the engine uses, without the engine's `Arc<dyn KvStore>`
    /// field ever needing to change. `None` when running against a backend
    /// with no live connection to refresh (e.g. the in-memory test double).
    redis_store: Option<RedisStore>,
}

impl AdminService {
    pub fn new(engine: Arc<PoolEngine>, redis_store: Option<RedisStore>) -> Self {
        AdminService { engine, redis_store }
    }

    pub async fn init_pools(
        &self,
        catalog: &dyn CatalogReader,
        pool_ids: Option<&[i64]>,
    ) -> Result<InitReport, PoolError> {
        info!("admin: init_pools");
        let counts = self.engine.init_pools(catalog, pool_ids).await?;
        Ok(InitReport {
            pools_initialized: counts,
        })
    }

    pub async fn reset_pool(
        &self,
        catalog: &dyn CatalogReader,
        pool_id: i64,
        preserve: bool,
    ) -> Result<ResetReport, PoolError> {
        info!("admin: reset_pool {pool_id} preserve={preserve}");
        let numbers = catalog
            .pool_numbers(pool_id)
            .await
            .map_err(|_| PoolError::PoolUnavailable { pool_id })?;
        let (removed, added) = self.engine.reset_pool(pool_id, numbers, preserve).await?;
        Ok(ResetReport { removed, added })
    }

    pub async fn stats(
        &self,
        catalog: &dyn CatalogReader,
        with_contexts: bool,
    ) -> Result<HashMap<String, PoolStats>, PoolError> {
        self.engine.get_all_pool_stats(catalog, with_contexts).await
    }

    /// Reconnect to Redis from scratch (spec §4.5 `refresh_conn`). A no-op
    /// when the engine isn't backed by Redis.
    pub async fn refresh_conn(&self, store_config: &StoreConfig) -> Result<(), PoolError> {
        info!("admin: refresh_conn");
        match &self.redis_store {
            Some(store) => Ok(store.reconnect(store_config).await?),
            None => Ok(()),
        }
    }
}
