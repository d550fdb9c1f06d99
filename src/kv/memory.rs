//! In-process fake of [`super::KvStore`], used by unit and integration
//! tests in place of a real store (mirrors the teacher's hand-rolled mock
//! style in `auth::mocks`, compiled unconditionally so integration tests
//! outside this crate's own test modules can use it too).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{KvStore, LockGuard, ScoredMember};
use crate::errors::KvError;

struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn fresh(value: T) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Entry<String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    hashes: HashMap<String, HashMap<String, String>>,
    locks: HashSet<String>,
}

/// An in-memory stand-in for a networked store. Single process only; used
/// exclusively in tests. `inner`/`lock_notify` are independently `Arc`'d so
/// the lock auto-expiry task can hold onto them without needing an `Arc` of
/// the whole store.
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    lock_notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(Mutex::new(Inner::default())),
            lock_notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryLockGuard {
    inner: Arc<Mutex<Inner>>,
    lock_notify: Arc<Notify>,
    name: String,
    released: bool,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn release(mut self: Box<Self>) {
        self.released = true;
        self.inner.lock().locks.remove(&self.name);
        self.lock_notify.notify_waiters();
    }
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.inner.lock().locks.remove(&self.name);
            self.lock_notify.notify_waiters();
        }
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.strings.get(key) {
            if entry.is_expired() {
                inner.strings.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut entry = Entry::fresh(value.to_string());
        entry.expires_at = ttl.map(|d| Instant::now() + d);
        self.inner.lock().strings.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut inner = self.inner.lock();
        let mut removed = inner.strings.remove(key).is_some();
        removed |= inner.sets.remove(key).is_some();
        removed |= inner.zsets.remove(key).is_some();
        removed |= inner.hashes.remove(key).is_some();
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some()
            || self.inner.lock().sets.contains_key(key)
            || self.inner.lock().zsets.contains_key(key)
            || self.inner.lock().hashes.contains_key(key))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        Ok(self
            .inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get_mut(key)
            .map(|s| s.remove(member))
            .unwrap_or(false))
    }

    async fn spop(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(None);
        };
        let member = set.iter().next().cloned();
        if let Some(ref m) = member {
            set.remove(m);
        }
        Ok(member)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sscan(&self, key: &str, pattern: &str, batch: usize) -> Result<Vec<String>, KvError> {
        let inner = self.inner.lock();
        let Some(set) = inner.sets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .filter(|m| glob_match(pattern, m))
            .take(batch.max(1))
            .cloned()
            .collect())
    }

    async fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
        xx: bool,
        _ch: bool,
    ) -> Result<bool, KvError> {
        let mut inner = self.inner.lock();
        let zset = inner.zsets.entry(key.to_string()).or_default();
        let exists = zset.contains_key(member);
        if xx && !exists {
            return Ok(false);
        }
        let changed = zset.get(member) != Some(&score);
        zset.insert(member.to_string(), score);
        Ok(changed)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        Ok(self
            .inner
            .lock()
            .zsets
            .get_mut(key)
            .map(|z| z.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KvError> {
        Ok(self
            .inner
            .lock()
            .zsets
            .get(key)
            .and_then(|z| z.get(member).copied()))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<ScoredMember>, KvError> {
        let inner = self.inner.lock();
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<ScoredMember> = zset
            .iter()
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect();
        members.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());
        Ok(slice_range(&members, start, stop))
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMember>, KvError> {
        let inner = self.inner.lock();
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<ScoredMember> = zset
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect();
        members.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());
        if let Some(limit) = limit {
            members.truncate(limit);
        }
        Ok(members)
    }

    async fn zcard(&self, key: &str) -> Result<usize, KvError> {
        Ok(self.inner.lock().zsets.get(key).map(|z| z.len()).unwrap_or(0))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get_mut(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn lock(
        &self,
        name: &str,
        wait_timeout: Duration,
        hold_timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, KvError> {
        let deadline = Instant::now() + wait_timeout;
        loop {
            {
                let mut inner = self.inner.lock();
                if !inner.locks.contains(name) {
                    inner.locks.insert(name.to_string());
                    let task_inner = Arc::clone(&self.inner);
                    let task_notify = Arc::clone(&self.lock_notify);
                    let task_name = name.to_string();
                    let guard = MemoryLockGuard {
                        inner: Arc::clone(&self.inner),
                        lock_notify: Arc::clone(&self.lock_notify),
                        name: name.to_string(),
                        released: false,
                    };
                    tokio::spawn(async move {
                        tokio::time::sleep(hold_timeout).await;
                        task_inner.lock().locks.remove(&task_name);
                        task_notify.notify_waiters();
                    });
                    return Ok(Box::new(guard));
                }
            }
            if Instant::now() >= deadline {
                return Err(KvError::LockUnavailable {
                    name: name.to_string(),
                });
            }
            let wait = tokio::time::timeout(Duration::from_millis(20), self.lock_notify.notified());
            let _ = wait.await;
        }
    }
}

fn slice_range(members: &[ScoredMember], start: isize, stop: isize) -> Vec<ScoredMember> {
    let len = members.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len - 1).max(0)
        }
    };
    let start = norm(start) as usize;
    let stop = norm(stop) as usize;
    if start > stop || start >= members.len() {
        return Vec::new();
    }
    members[start..=stop.min(members.len() - 1)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn zadd_xx_does_not_create() {
        let store = MemoryStore::new();
        assert!(!store.zadd("z", "m", 1.0, true, true).await.unwrap());
        assert_eq!(store.zscore("z", "m").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lock_excludes_concurrent_holder() {
        let store = MemoryStore::new();
        let guard = store
            .lock("l", Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();
        let err = store
            .lock("l", Duration::from_millis(50), Duration::from_secs(5))
            .await;
        assert!(err.is_err());
        guard.release().await;
        store
            .lock("l", Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();
    }
}
