//! Redis-backed [`super::KvStore`] implementation.
//!
//! Grounded in the Redis session-store pattern from the retrieved example
//! pack: a `deadpool_redis` connection pool, plain `redis` commands for the
//! string/set/zset/hash operations, and a cached-SHA Lua script for the one
//! operation that needs atomicity beyond a single command — lock release,
//! which must only delete the key if it still holds our own token.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};
use futures::StreamExt;
use log::info;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KvStore, LockGuard, ScoredMember};
use crate::config::Store as StoreConfig;
use crate::errors::KvError;

// Only deletes the lock key if it still matches our token, so a lock whose
// hold_timeout already expired and was re-acquired by someone else is never
// stolen back by a late release.
const RELEASE_LUA_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    else
        return 0
    end
"#;

/// Redis-backed store adapter. Cheap to clone; wraps a `deadpool_redis::Pool`
/// behind an `ArcSwap` so `reconnect()` can replace it under a shared
/// `Arc<dyn KvStore>` without needing `&mut self` anywhere up the call chain.
#[derive(Clone)]
pub struct RedisStore {
    pool: Arc<ArcSwap<Pool>>,
    release_script_sha: Arc<Mutex<Option<String>>>,
}

impl RedisStore {
    /// Connect, retrying per `config.connect_retries` with
    /// `config.connect_retry_pause` between attempts (spec.md §4.1: "retries
    /// up to 5 times with a 1-second pause; after that, reports unavailable").
    pub async fn connect(config: &StoreConfig) -> Result<Self, KvError> {
        let pool = build_pool(config).await?;
        Ok(RedisStore {
            pool: Arc::new(ArcSwap::new(Arc::new(pool))),
            release_script_sha: Arc::new(Mutex::new(None)),
        })
    }

    /// Build a fresh pool from `config` and swap it in, replacing whatever
    /// connection this store was using. Existing clones of `RedisStore`
    /// observe the new pool on their next call (spec §4.5 `refresh_conn`).
    pub async fn reconnect(&self, config: &StoreConfig) -> Result<(), KvError> {
        let pool = build_pool(config).await?;
        self.pool.store(Arc::new(pool));
        info!("redis store: connection refreshed");
        Ok(())
    }

    async fn conn(&self) -> Result<Connection, KvError> {
        let pool = Pool::clone(&self.pool.load());
        Ok(pool.get().await?)
    }
}

async fn build_pool(config: &StoreConfig) -> Result<Pool, KvError> {
    let cfg = DeadpoolConfig::from_url(&config.url);
    let mut last_err = None;
    for _attempt in 0..config.connect_retries {
        match cfg.create_pool(Some(Runtime::Tokio1)) {
            Ok(pool) => match pool.get().await {
                Ok(_) => return Ok(pool),
                Err(err) => last_err = Some(err.to_string()),
            },
            Err(err) => last_err = Some(err.to_string()),
        }
        tokio::time::sleep(config.connect_retry_pause.as_std()).await;
    }
    let _ = last_err;
    Err(KvError::ConnectionUnavailable {
        attempts: config.connect_retries,
    })
}

struct RedisLockGuard {
    store: RedisStore,
    name: String,
    token: String,
    released: bool,
}

#[async_trait]
impl LockGuard for RedisLockGuard {
    async fn release(mut self: Box<Self>) {
        self.released = true;
        if let Ok(mut conn) = self.store.conn().await {
            let sha = {
                let mut guard = self.store.release_script_sha.lock().await;
                if guard.is_none() {
                    if let Ok(sha) = redis::cmd("SCRIPT")
                        .arg("LOAD")
                        .arg(RELEASE_LUA_SCRIPT)
                        .query_async::<String>(&mut conn)
                        .await
                    {
                        *guard = Some(sha);
                    }
                }
                guard.clone()
            };
            if let Some(sha) = sha {
                let _: Result<i64, _> = redis::cmd("EVALSHA")
                    .arg(&sha)
                    .arg(1)
                    .arg(&self.name)
                    .arg(&self.token)
                    .query_async(&mut conn)
                    .await;
            }
        }
    }
}

impl Drop for RedisLockGuard {
    fn drop(&mut self) {
        // Best-effort: the real release happens via `release()`. If the
        // guard is simply dropped, the lock's hold_timeout (already set as
        // the key's TTL at acquisition) is the backstop.
        if !self.released {
            log::trace!("lock {:?} dropped without explicit release, relying on hold_timeout", self.name);
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.conn().await?.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let n: i64 = self.conn().await?.del(key).await?;
        Ok(n > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.conn().await?.exists(key).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let n: i64 = self.conn().await?.sadd(key, member).await?;
        Ok(n > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let n: i64 = self.conn().await?.srem(key, member).await?;
        Ok(n > 0)
    }

    async fn spop(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.conn().await?.spop(key).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        Ok(self.conn().await?.smembers(key).await?)
    }

    async fn sscan(&self, key: &str, pattern: &str, batch: usize) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn().await?;
        let mut iter: redis::AsyncIter<String> = conn
            .sscan_match(key, pattern)
            .await?;
        let mut out = Vec::new();
        while let Some(member) = iter.next().await {
            out.push(member);
            if out.len() >= batch.max(1) {
                break;
            }
        }
        Ok(out)
    }

    async fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
        xx: bool,
        ch: bool,
    ) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        if xx {
            cmd.arg("XX");
        }
        if ch {
            cmd.arg("CH");
        }
        cmd.arg(score).arg(member);
        let changed: i64 = cmd.query_async(&mut conn).await?;
        Ok(changed > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let n: i64 = self.conn().await?.zrem(key, member).await?;
        Ok(n > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KvError> {
        Ok(self.conn().await?.zscore(key, member).await?)
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<ScoredMember>, KvError> {
        let pairs: Vec<(String, f64)> = self
            .conn()
            .await?
            .zrange_withscores(key, start as isize, stop as isize)
            .await?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMember>, KvError> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key).arg(min).arg(max).arg("WITHSCORES");
        if let Some(limit) = limit {
            cmd.arg("LIMIT").arg(0).arg(limit as i64);
        }
        let flat: Vec<String> = cmd.query_async(&mut conn).await?;
        Ok(flat
            .chunks(2)
            .filter_map(|pair| {
                let member = pair.first()?.clone();
                let score: f64 = pair.get(1)?.parse().ok()?;
                Some(ScoredMember { member, score })
            })
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize, KvError> {
        Ok(self.conn().await?.zcard(key).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let _: () = self.conn().await?.hset(key, field, value).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        Ok(self.conn().await?.hget(key, field).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        let n: i64 = self.conn().await?.hdel(key, field).await?;
        Ok(n > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        Ok(self.conn().await?.hgetall(key).await?)
    }

    async fn lock(
        &self,
        name: &str,
        wait_timeout: Duration,
        hold_timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, KvError> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait_timeout;
        loop {
            let mut conn = self.conn().await?;
            let acquired: Option<String> = redis::cmd("SET")
                .arg(name)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(hold_timeout.as_millis() as i64)
                .query_async(&mut conn)
                .await?;
            if acquired.is_some() {
                return Ok(Box::new(RedisLockGuard {
                    store: self.clone(),
                    name: name.to_string(),
                    token,
                    released: false,
                }));
            }
            if Instant::now() >= deadline {
                return Err(KvError::LockUnavailable {
                    name: name.to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
