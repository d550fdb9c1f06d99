//! Key-Value Store Adapter (C1).
//!
//! Abstracts the networked store the rest of the engine runs on top of:
//! string get/set/del with TTL, set operations, sorted-set operations, hash
//! operations, and named blocking locks with separate hold/wait timeouts.
//! Concrete backends (`redis_store`, `memory` for tests) implement
//! [`KvStore`]; the engine only ever depends on the trait.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::KvError;

/// A held named lock. Dropping it releases the lock early; otherwise it
/// auto-expires after `hold_timeout` even if the process holding it dies.
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Release the lock. Idempotent; lock release is best-effort and the
    /// hold_timeout is the backstop if this is never called (e.g. panic).
    async fn release(self: Box<Self>);
}

/// A single element returned from a sorted-set range query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// Abstraction over the networked KV store C3/C5/C6/C7 all sit on top of.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;
    async fn del(&self, key: &str) -> Result<bool, KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError>;
    async fn spop(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;
    /// Scan the set for members matching `pattern` (glob-style), in batches
    /// of `batch` at a time, cursoring until exhausted. Returns the first
    /// matches found, unordered.
    async fn sscan(&self, key: &str, pattern: &str, batch: usize) -> Result<Vec<String>, KvError>;

    /// `xx`: only update an existing member's score, never add.
    /// `ch`: return value reports whether the score actually changed.
    async fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
        xx: bool,
        ch: bool,
    ) -> Result<bool, KvError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, KvError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KvError>;
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<ScoredMember>, KvError>;
    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMember>, KvError>;
    async fn zcard(&self, key: &str) -> Result<usize, KvError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError>;

    /// Acquire a named lock. Blocks (internally retrying) up to
    /// `wait_timeout` before giving up with `KvError::LockUnavailable`; once
    /// held, the lock is considered lost after `hold_timeout` regardless of
    /// whether `release` was called.
    async fn lock(
        &self,
        name: &str,
        wait_timeout: Duration,
        hold_timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, KvError>;
}
