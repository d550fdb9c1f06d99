//! Pool State Engine (C3) — owns all per-pool KV structures and implements
//! lease, renew, update-number, reset, and stats. Grounded on
//! `number_pool.py::NumberPoolAPI` for the algorithm and on the teacher's
//! `pool/mod.rs` (`ArcSwap`-backed global state plus a per-identifier map)
//! for the in-process write-through properties cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use log::{info, warn};

use crate::catalog::CatalogReader;
use crate::config::{Geo, PoolDefaults};
use crate::geo::{self, CriteriaTable};
use crate::kv::KvStore;

use super::errors::PoolError;
use super::keys;
use super::types::{self, merge_request_context, NumberContext, NumberStatus, PoolProperties, RequestContext};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

/// Per-pool free/taken/total counts, optionally with every taken context
/// (C9's `get_all_pool_stats`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub free: usize,
    pub taken: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<HashMap<String, NumberContextWithAge>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NumberContextWithAge {
    #[serde(flatten)]
    pub context: NumberContext,
    pub age: f64,
    pub expired: bool,
}

enum RenewOutcome {
    Renewed,
    SessionKeyMismatch,
    MaxRenewalExceeded,
}

pub struct PoolEngine {
    store: Arc<dyn KvStore>,
    defaults: PoolDefaults,
    geo_config: Arc<Geo>,
    criteria: Arc<CriteriaTable>,
    properties_cache: DashMap<i64, PoolProperties>,
}

impl PoolEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        defaults: PoolDefaults,
        geo_config: Arc<Geo>,
        criteria: Arc<CriteriaTable>,
    ) -> Self {
        PoolEngine {
            store,
            defaults,
            geo_config,
            criteria,
            properties_cache: DashMap::new(),
        }
    }

    // ---- pool properties (write-through cache) ----------------------

    pub async fn get_pool_properties(&self, pool_id: i64) -> Result<PoolProperties, PoolError> {
        if let Some(cached) = self.properties_cache.get(&pool_id) {
            return Ok(cached.clone());
        }
        let key = keys::pool_properties(pool_id);
        match self.store.get(&key).await? {
            Some(raw) => {
                let props: PoolProperties = serde_json::from_str(&raw).unwrap_or_default();
                self.properties_cache.insert(pool_id, props.clone());
                Ok(props)
            }
            None => {
                warn!("pool properties not found for pool {pool_id}");
                Ok(PoolProperties::default())
            }
        }
    }

    pub async fn set_pool_properties(
        &self,
        pool_id: i64,
        properties: PoolProperties,
    ) -> Result<(), PoolError> {
        let key = keys::pool_properties(pool_id);
        let raw = serde_json::to_string(&properties).unwrap_or_else(|_| "{}".to_string());
        self.store.set(&key, &raw, None).await?;
        self.properties_cache.insert(pool_id, properties);
        Ok(())
    }

    fn invalidate_properties_cache(&self) {
        self.properties_cache.clear();
    }

    // ---- number contexts ----------------------------------------------

    pub async fn get_pool_number_context(
        &self,
        number: &str,
    ) -> Result<Option<NumberContext>, PoolError> {
        match self.store.get(&keys::number_context(number)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    async fn set_number_context(&self, number: &str, ctx: &NumberContext) -> Result<(), PoolError> {
        let raw = serde_json::to_string(ctx).expect("NumberContext always serializes");
        self.store.set(&keys::number_context(number), &raw, None).await?;
        Ok(())
    }

    fn context_expired(&self, ctx: &NumberContext) -> bool {
        ctx.age_secs(now_secs()) >= self.defaults.pool_cache_expiration.as_std().as_secs_f64()
    }

    pub async fn get_number_status(
        &self,
        number: &str,
    ) -> Result<(NumberStatus, Option<NumberContext>), PoolError> {
        match self.get_pool_number_context(number).await? {
            None => Ok((NumberStatus::Free, None)),
            Some(ctx) if self.context_expired(&ctx) => Ok((NumberStatus::Expired, Some(ctx))),
            Some(ctx) => Ok((NumberStatus::Taken, Some(ctx))),
        }
    }

    // ---- session <-> number mapping ------------------------------------

    async fn session_number(
        &self,
        pool_id: i64,
        ctx: &RequestContext,
    ) -> Result<Option<String>, PoolError> {
        let Some(sid) = types::sid(ctx) else {
            return Ok(None);
        };
        Ok(self.store.hget(&keys::sid_number_hash(pool_id), sid).await?)
    }

    async fn add_session_number(
        &self,
        pool_id: i64,
        sid: &str,
        number: &str,
    ) -> Result<(), PoolError> {
        self.store
            .hset(&keys::sid_number_hash(pool_id), sid, number)
            .await?;
        Ok(())
    }

    // ---- membership -----------------------------------------------------

    async fn free_numbers(&self, pool_id: i64) -> Result<HashSet<String>, PoolError> {
        Ok(self.store.smembers(&keys::free_set(pool_id)).await?.into_iter().collect())
    }

    async fn taken_numbers(&self, pool_id: i64) -> Result<HashSet<String>, PoolError> {
        Ok(self
            .store
            .zrange(&keys::taken_zset(pool_id), 0, -1)
            .await?
            .into_iter()
            .map(|m| m.member)
            .collect())
    }

    async fn pool_numbers(&self, pool_id: i64) -> Result<HashSet<String>, PoolError> {
        let mut all = self.free_numbers(pool_id).await?;
        all.extend(self.taken_numbers(pool_id).await?);
        Ok(all)
    }

    async fn add_numbers(&self, pool_id: i64, numbers: &HashSet<String>) -> Result<(), PoolError> {
        let key = keys::free_set(pool_id);
        for number in numbers {
            self.store.sadd(&key, number).await?;
        }
        Ok(())
    }

    /// Completely remove numbers from the pool: evicts contexts, the taken
    /// entry, the free entry, and the session -> number reverse mapping.
    async fn remove_numbers(&self, pool_id: i64, numbers: &HashSet<String>) -> Result<(), PoolError> {
        info!("removing {} numbers from pool {pool_id}", numbers.len());
        let taken_key = keys::taken_zset(pool_id);
        let free_key = keys::free_set(pool_id);
        let mut sids = Vec::new();
        for number in numbers {
            self.store.zrem(&taken_key, number).await?;
            if let Some(ctx) = self.get_pool_number_context(number).await? {
                if let Some(sid) = ctx.sid() {
                    sids.push(sid.to_string());
                }
            }
            self.store.del(&keys::number_context(number)).await?;
            self.store.srem(&free_key, number).await?;
        }
        let sid_hash = keys::sid_number_hash(pool_id);
        for sid in sids {
            self.store.hdel(&sid_hash, &sid).await?;
        }
        Ok(())
    }

    // ---- take / renew ----------------------------------------------------

    async fn take_number(
        &self,
        pool_id: i64,
        number: &str,
        request_context: RequestContext,
        update: bool,
    ) -> Result<NumberContext, PoolError> {
        let ctx = NumberContext::new(pool_id, request_context, now_secs());
        let taken_key = keys::taken_zset(pool_id);
        if update {
            self.store.zadd(&taken_key, number, ctx.renewed_at, true, true).await?;
        } else {
            self.store.zadd(&taken_key, number, ctx.renewed_at, false, false).await?;
            self.store.srem(&keys::free_set(pool_id), number).await?;
        }
        self.set_number_context(number, &ctx).await?;
        if let Some(sid) = ctx.sid() {
            self.add_session_number(pool_id, sid, number).await?;
        }
        Ok(ctx)
    }

    /// Renew `number`'s lease in place. `context` is the pre-merged context
    /// to persist (caller merges `visits`/`latest_context` before calling,
    /// matching the original's inline merge ahead of `_renew_number`).
    async fn renew_number(
        &self,
        pool_id: i64,
        number: &str,
        mut context: NumberContext,
        from_sid: bool,
    ) -> Result<RenewOutcome, PoolError> {
        let Some(curr_context) = self.get_pool_number_context(number).await? else {
            return Ok(RenewOutcome::SessionKeyMismatch);
        };

        let sid = context.sid().map(str::to_string);
        let curr_sid = curr_context.sid().map(str::to_string);
        if sid != curr_sid {
            warn!(
                "session key mismatch for {pool_id}/{number} {sid:?}/{curr_sid:?}, can not renew"
            );
            return Ok(RenewOutcome::SessionKeyMismatch);
        }

        context.renewed_at = now_secs();
        if (context.renewed_at - context.leased_at) > self.defaults.max_renewal_age.as_std().as_secs_f64() {
            warn!("not renewing number {pool_id}/{number} due to max renewal time");
            return Ok(RenewOutcome::MaxRenewalExceeded);
        }

        self.store
            .zadd(&keys::taken_zset(pool_id), number, context.renewed_at, true, true)
            .await?;
        self.set_number_context(number, &context).await?;
        if let Some(sid) = sid.as_deref() {
            if !from_sid {
                self.add_session_number(pool_id, sid, number).await?;
            }
        }
        Ok(RenewOutcome::Renewed)
    }

    async fn lease_free_number(
        &self,
        pool_id: i64,
        number: &str,
        request_context: RequestContext,
    ) -> Result<String, PoolError> {
        self.take_number(pool_id, number, request_context, false).await?;
        info!("leased free number {pool_id}/{number}");
        Ok(number.to_string())
    }

    async fn lease_expired_number(
        &self,
        pool_id: i64,
        number: &str,
        request_context: RequestContext,
    ) -> Result<String, PoolError> {
        info!("leasing expired number {pool_id}/{number}");
        self.take_number(pool_id, number, request_context, true).await?;
        Ok(number.to_string())
    }

    async fn lease_random_number(
        &self,
        pool_id: i64,
        request_context: RequestContext,
    ) -> Result<Option<String>, PoolError> {
        if let Some(number) = self.store.spop(&keys::free_set(pool_id)).await? {
            info!("leasing random number {pool_id}/{number}");
            self.take_number(pool_id, &number, request_context, false).await?;
            return Ok(Some(number));
        }
        let Some(candidate) = self
            .store
            .zrangebyscore(&keys::taken_zset(pool_id), f64::NEG_INFINITY, f64::INFINITY, Some(1))
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let (status, _) = self.get_number_status(&candidate.member).await?;
        if status == NumberStatus::Expired {
            Ok(Some(self.lease_expired_number(pool_id, &candidate.member, request_context).await?))
        } else {
            Ok(None)
        }
    }

    async fn lease_area_code_number(
        &self,
        pool_id: i64,
        request_context: RequestContext,
        area_codes: Option<Vec<String>>,
    ) -> Result<Option<String>, PoolError> {
        let fallback = self
            .get_pool_properties(pool_id)
            .await?
            .fallback_area_code
            .ok_or(PoolError::MissingFallbackAreaCode { pool_id })?;

        let area_codes = geo::resolve_area_codes(&request_context, area_codes, &self.geo_config, &self.criteria)
            .unwrap_or_else(|| {
                warn!("area code not specified for pool {pool_id}, using fallback {fallback}");
                vec![fallback.clone()]
            });

        for area_code in &area_codes {
            if area_code.len() != 3 || !area_code.chars().all(|c| c.is_ascii_digit()) {
                return Err(PoolError::InvalidAreaCode {
                    area_code: area_code.clone(),
                });
            }

            let pattern = format!("{area_code}*");
            // The sscan result is guaranteed Free: callers hold the per-pool
            // lock for the whole lease, so nothing else can have taken it
            // between the scan and this lease.
            if let Some(number) = self.store.sscan(&keys::free_set(pool_id), &pattern, 10).await?.into_iter().next() {
                return Ok(Some(self.lease_free_number(pool_id, &number, request_context.clone()).await?));
            }

            let mut tries_left = 3;
            for member in self.store.zrange(&keys::taken_zset(pool_id), 0, -1).await? {
                if !member.member.starts_with(area_code.as_str()) {
                    continue;
                }
                if tries_left == 0 {
                    warn!("max tries checking expired numbers for area code {area_code} in {pool_id}");
                    break;
                }
                tries_left -= 1;
                let (status, _) = self.get_number_status(&member.member).await?;
                if status == NumberStatus::Expired {
                    let leased = self
                        .lease_expired_number(pool_id, &member.member, request_context.clone())
                        .await?;
                    return Ok(Some(leased));
                }
            }
        }

        if !area_codes.iter().any(|a| a == &fallback) {
            warn!("trying fallback area code {fallback}. target was {area_codes:?}");
            return Box::pin(self.lease_area_code_number(pool_id, request_context, Some(vec![fallback])))
                .await;
        }

        Ok(None)
    }

    /// Lease operation (spec §4.2 "Lease operation"), run under the
    /// per-pool lock.
    pub async fn lease_number(
        &self,
        pool_id: i64,
        mut request_context: RequestContext,
        mut target_number: Option<String>,
        target_area_codes: Option<Vec<String>>,
        mut renew: bool,
    ) -> Result<String, PoolError> {
        let lock_name = keys::pool_lock(pool_id);
        let lock = self
            .store
            .lock(&lock_name, self.defaults.lock_wait.as_std(), self.defaults.lock_hold.as_std())
            .await
            .map_err(|_| PoolError::PoolUnavailable { pool_id })?;

        let area_code_pool = self.get_pool_properties(pool_id).await?.is_area_code_pool();

        // Session pin (step 1): the session number, if any, always wins
        // over a caller-supplied target.
        let mut from_sid = false;
        if let Some(sid_number) = self.session_number(pool_id, &request_context).await? {
            if let Some(target) = &target_number {
                if target != &sid_number {
                    warn!(
                        "session/target number mismatch: {sid_number} / {target} for pool {pool_id}"
                    );
                }
            }
            from_sid = true;
            renew = true;
            target_number = Some(sid_number);
        }

        let mut number = None;
        let mut key_mismatch = false;

        if let Some(target) = target_number.clone() {
            if !self.pool_numbers(pool_id).await?.contains(&target) {
                lock.release().await;
                return Err(PoolError::NumberNotFound { pool_id, number: target });
            }
            let (status, ctx) = self.get_number_status(&target).await?;
            match status {
                NumberStatus::Free => {
                    number = Some(self.lease_free_number(pool_id, &target, request_context.clone()).await?);
                }
                NumberStatus::Expired => {
                    number = Some(self.lease_expired_number(pool_id, &target, request_context.clone()).await?);
                }
                NumberStatus::Taken if renew => {
                    let mut ctx = ctx.expect("Taken status always carries a context");
                    merge_request_context(&mut ctx.request_context, &request_context);
                    match self.renew_number(pool_id, &target, ctx, from_sid).await? {
                        RenewOutcome::Renewed => number = Some(target),
                        RenewOutcome::SessionKeyMismatch => key_mismatch = true,
                        RenewOutcome::MaxRenewalExceeded => {
                            lock.release().await;
                            return Err(PoolError::MaxRenewalExceeded { pool_id, number: target });
                        }
                    }
                }
                NumberStatus::Taken => {}
            }
        }

        if number.is_none() && (!from_sid || (key_mismatch && target_number.is_none())) {
            number = if area_code_pool {
                self.lease_area_code_number(pool_id, std::mem::take(&mut request_context), target_area_codes)
                    .await?
            } else {
                self.lease_random_number(pool_id, std::mem::take(&mut request_context)).await?
            };
        }

        lock.release().await;

        number.ok_or_else(|| {
            if from_sid {
                PoolError::SessionNumberUnavailable { pool_id }
            } else {
                PoolError::PoolEmpty { pool_id }
            }
        })
    }

    /// Out-of-band context update (spec §4.2 "Update-number"). Returns
    /// `Ok(None)` when the number has no context at all; returns the
    /// unchanged context when session ids mismatch (never errors on
    /// mismatch, matching the original's `return ctx`).
    pub async fn update_number(
        &self,
        pool_id: i64,
        number: &str,
        request_context: RequestContext,
        merge: bool,
    ) -> Result<Option<NumberContext>, PoolError> {
        let lock_name = keys::pool_lock(pool_id);
        let lock = self
            .store
            .lock(&lock_name, self.defaults.lock_wait.as_std(), self.defaults.lock_hold.as_std())
            .await
            .map_err(|_| PoolError::PoolUnavailable { pool_id })?;

        let result = async {
            let Some(mut ctx) = self.get_pool_number_context(number).await? else {
                warn!("number {pool_id}/{number} has no context, can not update");
                return Ok(None);
            };
            let request_sid = types::sid(&request_context);
            if request_sid != ctx.sid() {
                warn!("session key mismatch for {pool_id}/{number}, can not update");
                return Ok(Some(ctx));
            }
            if merge {
                merge_request_context(&mut ctx.request_context, &request_context);
            } else {
                ctx.request_context = request_context;
            }
            self.set_number_context(number, &ctx).await?;
            Ok(Some(ctx))
        }
        .await;

        lock.release().await;
        result
    }

    // ---- admin / init (C9) ------------------------------------------------

    async fn pool_exists(&self, pool_id: i64) -> Result<bool, PoolError> {
        if self.store.exists(&keys::free_set(pool_id)).await? {
            return Ok(true);
        }
        if self.store.exists(&keys::taken_zset(pool_id)).await? {
            warn!("taken pool exists without free pool for pool {pool_id}");
            return Ok(true);
        }
        Ok(false)
    }

    /// `reset_pool(preserve)`: `preserve=true` computes the symmetric
    /// difference against the catalog and only touches the delta;
    /// `preserve=false` removes and re-adds everything. Runs under the
    /// per-pool lock so a concurrent lease/renew/update can't interleave
    /// with a reset (spec §5: lease/update/reset are strictly serialized
    /// per pool).
    pub async fn reset_pool(
        &self,
        pool_id: i64,
        target_numbers: HashSet<String>,
        preserve: bool,
    ) -> Result<(usize, usize), PoolError> {
        let lock_name = keys::pool_lock(pool_id);
        let lock = self
            .store
            .lock(&lock_name, self.defaults.lock_wait.as_std(), self.defaults.lock_hold.as_std())
            .await
            .map_err(|_| PoolError::PoolUnavailable { pool_id })?;
        let result = self.reset_pool_locked(pool_id, target_numbers, preserve).await;
        lock.release().await;
        result
    }

    /// Body of `reset_pool`, callable by `init_pools` which already holds
    /// the per-pool lock for the pool it's resetting.
    async fn reset_pool_locked(
        &self,
        pool_id: i64,
        target_numbers: HashSet<String>,
        preserve: bool,
    ) -> Result<(usize, usize), PoolError> {
        let current = self.pool_numbers(pool_id).await?;
        let (removes, adds): (HashSet<String>, HashSet<String>) = if preserve {
            (
                current.difference(&target_numbers).cloned().collect(),
                target_numbers.difference(&current).cloned().collect(),
            )
        } else {
            (target_numbers.clone(), target_numbers.clone())
        };
        if !removes.is_empty() {
            self.remove_numbers(pool_id, &removes).await?;
        }
        if !adds.is_empty() {
            self.add_numbers(pool_id, &adds).await?;
        }
        info!(
            "pool {pool_id}: {} total, {} removes, {} adds",
            target_numbers.len(),
            removes.len(),
            adds.len()
        );
        Ok((removes.len(), adds.len()))
    }

    /// `init_pools(pool_ids?)`: acquires the global init lock (non-blocking
    /// beyond `init_lock_wait`), then for each active catalog pool writes
    /// properties and resets/seeds its structures under the per-pool lock.
    pub async fn init_pools(
        &self,
        catalog: &dyn CatalogReader,
        pool_ids: Option<&[i64]>,
    ) -> Result<HashMap<i64, usize>, PoolError> {
        let lock = self
            .store
            .lock(keys::INIT_LOCK, self.defaults.init_lock_wait.as_std(), self.defaults.lock_hold.as_std())
            .await
            .map_err(|_| PoolError::PoolUnavailable { pool_id: -1 })?;

        info!("initializing number pools...");
        self.invalidate_properties_cache();
        let mut counts = HashMap::new();
        let mut errors = Vec::new();

        let pools = catalog.active_pools().await.map_err(|_| PoolError::PoolUnavailable { pool_id: -1 })?;
        for pool in &pools {
            if let Some(ids) = pool_ids {
                if !ids.contains(&pool.id) {
                    info!("skipping pool {}/{}", pool.id, pool.name);
                    continue;
                }
            }

            self.set_pool_properties(pool.id, pool.properties.clone()).await?;

            let pool_lock_name = keys::pool_lock(pool.id);
            match self
                .store
                .lock(&pool_lock_name, self.defaults.lock_wait.as_std(), self.defaults.lock_hold.as_std())
                .await
            {
                Ok(pool_lock) => {
                    let numbers = catalog
                        .pool_numbers(pool.id)
                        .await
                        .map_err(|_| PoolError::PoolUnavailable { pool_id: pool.id })?;
                    if self.pool_exists(pool.id).await? {
                        info!("resetting pool {}, preserve=true", pool.id);
                        self.reset_pool_locked(pool.id, numbers.clone(), true).await?;
                    } else if !numbers.is_empty() {
                        info!("adding {} numbers for pool {}", numbers.len(), pool.id);
                        self.add_numbers(pool.id, &numbers).await?;
                    }
                    counts.insert(pool.id, numbers.len());
                    pool_lock.release().await;
                }
                Err(_) => {
                    errors.push(pool.id);
                }
            }
        }

        lock.release().await;

        if !errors.is_empty() {
            warn!("unable to init {}/{} pools: {errors:?}", errors.len(), pools.len());
        }
        Ok(counts)
    }

    pub async fn get_all_pool_stats(
        &self,
        catalog: &dyn CatalogReader,
        with_contexts: bool,
    ) -> Result<HashMap<String, PoolStats>, PoolError> {
        let pools = catalog.active_pools().await.map_err(|_| PoolError::PoolUnavailable { pool_id: -1 })?;
        let mut stats = HashMap::new();
        for pool in pools {
            let lock_name = keys::pool_lock(pool.id);
            let lock = self
                .store
                .lock(&lock_name, self.defaults.lock_wait.as_std(), self.defaults.lock_hold.as_std())
                .await
                .map_err(|_| PoolError::PoolUnavailable { pool_id: pool.id })?;

            let result = async {
                let free = self.free_numbers(pool.id).await?;
                let taken = self.taken_numbers(pool.id).await?;
                let contexts = if with_contexts {
                    let mut map = HashMap::new();
                    for number in &taken {
                        if let Some(ctx) = self.get_pool_number_context(number).await? {
                            let age = ctx.age_secs(now_secs());
                            let expired = self.context_expired(&ctx);
                            map.insert(number.clone(), NumberContextWithAge { context: ctx, age, expired });
                        }
                    }
                    Some(map)
                } else {
                    None
                };
                Ok::<_, PoolError>((free, taken, contexts))
            }
            .await;

            lock.release().await;
            let (free, taken, contexts) = result?;

            stats.insert(
                format!("{}/{}", pool.id, pool.name),
                PoolStats {
                    free: free.len(),
                    taken: taken.len(),
                    total: free.len() + taken.len(),
                    contexts,
                },
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
impl PoolEngine {
    /// Simulates the passage of time on a leased number's context; the
    /// engine has no injectable clock, so scenario tests that need an
    /// expired or stale lease poke the stored context directly.
    pub(crate) async fn test_force_renewed_at(&self, number: &str, renewed_at: f64) {
        let mut ctx = self.get_pool_number_context(number).await.unwrap().unwrap();
        ctx.renewed_at = renewed_at;
        self.set_number_context(number, &ctx).await.unwrap();
    }

    pub(crate) async fn test_force_leased_at(&self, number: &str, leased_at: f64) {
        let mut ctx = self.get_pool_number_context(number).await.unwrap().unwrap();
        ctx.leased_at = leased_at;
        self.set_number_context(number, &ctx).await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::kv::memory::MemoryStore;
    use serde_json::{json, Map, Value};

    fn engine() -> PoolEngine {
        PoolEngine::new(
            Arc::new(MemoryStore::new()),
            PoolDefaults::default(),
            Arc::new(Geo::default()),
            Arc::new(CriteriaTable::embedded()),
        )
    }

    async fn seed(engine: &PoolEngine, pool_id: i64, numbers: &[&str]) {
        engine
            .add_numbers(pool_id, &numbers.iter().map(|s| s.to_string()).collect())
            .await
            .unwrap();
    }

    async fn seed_area_code_pool(engine: &PoolEngine, pool_id: i64, numbers: &[&str], fallback: &str) {
        let props = PoolProperties {
            area_code: Some("all".to_string()),
            fallback_area_code: Some(fallback.to_string()),
            extra: Map::new(),
        };
        engine.set_pool_properties(pool_id, props).await.unwrap();
        seed(engine, pool_id, numbers).await;
    }

    fn ctx(pairs: &[(&str, Value)]) -> RequestContext {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        map
    }

    // ---- invariants (spec.md §8) ---------------------------------------

    #[tokio::test]
    async fn invariant_1_disjointness() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        let free = e.free_numbers(1).await.unwrap();
        let taken = e.taken_numbers(1).await.unwrap();
        assert!(free.is_disjoint(&taken));
        let all: HashSet<String> = free.union(&taken).cloned().collect();
        assert_eq!(all, HashSet::from(["N1".to_string(), "N2".to_string(), "N3".to_string(), "N4".to_string()]));
        assert!(taken.contains(&x));
    }

    #[tokio::test]
    async fn invariant_2_score_equals_renewed_at() {
        let e = engine();
        seed(&e, 1, &["N1"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        let stored = e.get_pool_number_context(&x).await.unwrap().unwrap();
        let score = e.store.zscore(&keys::taken_zset(1), &x).await.unwrap().unwrap();
        assert_eq!(score, stored.renewed_at);
    }

    #[tokio::test]
    async fn invariant_3_session_pinning() {
        let e = engine();
        seed(&e, 1, &["N1", "N2"]).await;
        let request = ctx(&[("sid", json!("1234"))]);
        let x = e.lease_number(1, request, None, None, false).await.unwrap();
        let stored = e.get_pool_number_context(&x).await.unwrap().unwrap();
        assert_eq!(stored.sid(), Some("1234"));
        assert_eq!(e.store.hget(&keys::sid_number_hash(1), "1234").await.unwrap(), Some(x));
    }

    #[tokio::test]
    async fn invariant_4_at_most_one_active_number_per_session() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3"]).await;
        let request = ctx(&[("sid", json!("1234"))]);
        let x1 = e.lease_number(1, request.clone(), None, None, false).await.unwrap();
        let x2 = e.lease_number(1, request, None, None, false).await.unwrap();
        assert_eq!(x1, x2);
    }

    #[tokio::test]
    async fn invariant_5_renewal_liveness() {
        let e = engine();
        seed(&e, 1, &["N1"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        let max_age = PoolDefaults::default().max_renewal_age.as_std().as_secs_f64();
        e.test_force_leased_at(&x, now_secs() - max_age - 10.0).await;
        let err = e
            .lease_number(1, Map::new(), Some(x.clone()), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::MaxRenewalExceeded { .. }));
        let (status, _) = e.get_number_status(&x).await.unwrap();
        assert_eq!(status, NumberStatus::Taken);
    }

    #[tokio::test]
    async fn invariant_6_expiry_eviction() {
        let e = engine();
        seed(&e, 1, &["N1"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        let expiration = PoolDefaults::default().pool_cache_expiration.as_std().as_secs_f64();
        e.test_force_renewed_at(&x, now_secs() - expiration - 10.0).await;
        let request = ctx(&[("foo", json!("bar"))]);
        let y = e.lease_number(1, request, None, None, false).await.unwrap();
        assert_eq!(x, y);
        let stored = e.get_pool_number_context(&y).await.unwrap().unwrap();
        assert_eq!(stored.request_context.get("foo"), Some(&json!("bar")));
    }

    #[tokio::test]
    async fn invariant_9_area_code_preference() {
        let e = engine();
        seed_area_code_pool(&e, 1, &["3391111", "7811111", "5551234"], "555").await;
        let target = Some(vec!["339".to_string(), "781".to_string()]);

        let a = e.lease_number(1, ctx(&[("sid", json!("a"))]), None, target.clone(), false).await.unwrap();
        assert!(a.starts_with("339"));

        let b = e.lease_number(1, ctx(&[("sid", json!("b"))]), None, target.clone(), false).await.unwrap();
        assert!(b.starts_with("781"));

        let c = e.lease_number(1, ctx(&[("sid", json!("c"))]), None, target, false).await.unwrap();
        assert!(c.starts_with("555"));
    }

    #[tokio::test]
    async fn invariant_10_init_pools_idempotent() {
        let e = engine();
        let mut catalog = MemoryCatalog::new();
        catalog.add_pool(
            5,
            "demo",
            PoolProperties::default(),
            HashSet::from(["A1".to_string(), "A2".to_string(), "A3".to_string()]),
        );

        let counts_first = e.init_pools(&catalog, None).await.unwrap();
        assert_eq!(counts_first.get(&5), Some(&3));
        let x = e.lease_number(5, Map::new(), None, None, false).await.unwrap();

        let counts_second = e.init_pools(&catalog, None).await.unwrap();
        assert_eq!(counts_second.get(&5), Some(&3));

        let (status, _) = e.get_number_status(&x).await.unwrap();
        assert_eq!(status, NumberStatus::Taken);
        let free = e.free_numbers(5).await.unwrap();
        let taken = e.taken_numbers(5).await.unwrap();
        assert!(free.is_disjoint(&taken));
        assert_eq!(free.len() + taken.len(), 3);
    }

    // ---- scenarios (spec.md §8, pool 1 with N1..N4 unless noted) -------

    #[tokio::test]
    async fn s1_simple_lease_and_renew() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();

        let y = e.lease_number(1, Map::new(), Some(x.clone()), None, false).await.unwrap();
        assert_ne!(x, y);

        let renewed = e.lease_number(1, Map::new(), Some(x.clone()), None, true).await.unwrap();
        assert_eq!(renewed, x);
        let taken = e.taken_numbers(1).await.unwrap();
        assert_eq!(taken, HashSet::from([x, y]));
    }

    #[tokio::test]
    async fn s2_invalid_target() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;
        let err = e
            .lease_number(1, Map::new(), Some("1234".to_string()), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::NumberNotFound { .. }));
    }

    #[tokio::test]
    async fn s3_expired_takeover() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        e.test_force_renewed_at(&x, now_secs() - 2_000_000.0).await;

        for _ in 0..3 {
            e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        }

        let request = ctx(&[("foo", json!("bar"))]);
        let got = e.lease_number(1, request, None, None, false).await.unwrap();
        assert_eq!(got, x);
        let stored = e.get_pool_number_context(&got).await.unwrap().unwrap();
        assert_eq!(stored.request_context.get("foo"), Some(&json!("bar")));
    }

    #[tokio::test]
    async fn s4_max_renewal() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;
        let x = e.lease_number(1, Map::new(), None, None, false).await.unwrap();
        e.test_force_leased_at(&x, now_secs() - 1_000_000.0).await;
        let err = e
            .lease_number(1, Map::new(), Some(x), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::MaxRenewalExceeded { .. }));
    }

    #[tokio::test]
    async fn s5_session_pinning_with_sid() {
        let e = engine();
        seed(&e, 1, &["N1", "N2", "N3", "N4"]).await;

        let first = ctx(&[("sid", json!("1234")), ("visits", json!({"1": {"foo": "bar"}}))]);
        let x = e.lease_number(1, first, None, None, false).await.unwrap();

        let second = ctx(&[("sid", json!("1234")), ("visits", json!({"2": {"baz": "bar"}}))]);
        let got = e.lease_number(1, second, None, None, false).await.unwrap();
        assert_eq!(got, x);
        let stored = e.get_pool_number_context(&got).await.unwrap().unwrap();
        let visits = stored.request_context.get("visits").and_then(Value::as_object).unwrap();
        assert_eq!(visits.len(), 2);

        let mismatched = ctx(&[("sid", json!("5678"))]);
        let y = e.lease_number(1, mismatched, Some(x.clone()), None, true).await.unwrap();
        assert_ne!(y, x);
    }

    #[tokio::test]
    async fn s6_area_code_pool_with_geo() {
        let e = engine();
        seed_area_code_pool(&e, 7, &["4011111", "5551234"], "555").await;

        let physical_ri = ctx(&[(
            "latest_context",
            json!({ "url": "https://example.com/?loc_physical_ms=9002212" }),
        )]);
        let leased = e.lease_number(7, physical_ri, None, None, false).await.unwrap();
        assert!(leased.starts_with("401"));

        e.reset_pool(
            7,
            HashSet::from(["3391111".to_string(), "7811111".to_string(), "5551234".to_string()]),
            false,
        )
        .await
        .unwrap();

        let physical_ma = |sid: &str| {
            ctx(&[
                ("sid", json!(sid)),
                (
                    "latest_context",
                    json!({ "url": "https://example.com/?loc_physical_ms=1018455" }),
                ),
            ])
        };

        let first = e.lease_number(7, physical_ma("b1"), None, None, false).await.unwrap();
        assert!(first.starts_with("339"));

        let second = e.lease_number(7, physical_ma("b2"), None, None, false).await.unwrap();
        assert!(second.starts_with("781"));

        let third = e.lease_number(7, physical_ma("b3"), None, None, false).await.unwrap();
        assert!(third.starts_with("555"));
    }
}
