//! Call Attribution Resolver (C8) — answers "for this inbound call, what
//! visit context owns it?" by combining the pool engine (C3), route cache
//! (C5), user profile store (C6), and static number map (C7). Grounded on
//! `number_pool.py`/`zar.py`'s `track_call` handler.

use serde_json::{json, Map, Value};

use crate::config::Geo;
use crate::geo::{self, CriteriaTable};
use crate::pool::errors::PoolError;
use crate::pool::engine::PoolEngine;
use crate::pool::types::{self, NumberContext, NumberStatus};
use crate::route_cache::RouteCache;
use crate::static_numbers::StaticNumberMap;
use crate::user_profile::{UserIdType, UserProfileStore};

/// Result of resolving a single inbound call.
#[derive(Debug, Clone)]
pub struct Attribution {
    pub context: Value,
    pub user_context: Option<Map<String, Value>>,
    pub has_cached_route: bool,
}

pub struct AttributionResolver<'a> {
    pub pool_engine: &'a PoolEngine,
    pub route_cache: &'a RouteCache,
    pub user_profile: &'a UserProfileStore,
    pub static_numbers: &'a StaticNumberMap,
    pub geo_config: &'a Geo,
    pub criteria: &'a CriteriaTable,
}

/// Strip a leading `+1` (spec §4.4's normalization of `call_from`/`call_to`).
fn normalize(number: &str) -> &str {
    number.strip_prefix("+1").unwrap_or(number)
}

fn number_context_to_value(ctx: &NumberContext) -> Value {
    serde_json::to_value(ctx).unwrap_or(Value::Null)
}

impl<'a> AttributionResolver<'a> {
    pub async fn resolve(&self, call_from: &str, call_to: &str) -> Result<Option<Attribution>, PoolError> {
        let call_from = normalize(call_from);
        let call_to = normalize(call_to);

        // 1-3. An Expired pool context is treated as absent here: it still
        // exists in the store, but attribution should prefer a cached route
        // over a stale lease (spec.md §8 invariant 7).
        let (pool_status, pool_ctx) = self.pool_engine.get_number_status(call_to).await?;
        let pool_ctx = if pool_status == NumberStatus::Taken { pool_ctx } else { None };
        let route_ctx = self.route_cache.get(call_from, call_to).await?;
        let mut user_ctx = self.user_profile.get(UserIdType::Phone, call_from).await?;

        // 4. Attach zip -> area-code distance to the caller's profile, keyed
        // off the caller's own area code (first 3 digits of call_from).
        if let Some(ctx) = user_ctx.as_mut() {
            attach_distance(ctx, call_from, self.geo_config, self.criteria);
        }

        // 5. Neither a live lease nor a cached route: fall back to a static
        // assignment.
        if pool_ctx.is_none() && route_ctx.is_none() {
            if let Some(static_ctx) = self.static_numbers.get(call_to).await? {
                return Ok(Some(Attribution {
                    context: json!({ "static_context": static_ctx }),
                    user_context: user_ctx,
                    has_cached_route: false,
                }));
            }
        }

        // 6. Choose among pool_ctx and route_ctx.
        let (mut chosen, has_cached_route) = match (&pool_ctx, &route_ctx) {
            (None, Some(route)) => (Some(route.clone()), true),
            (Some(pool), None) => (Some(number_context_to_value(pool)), false),
            (Some(pool), Some(route)) => {
                let pool_value = number_context_to_value(pool);
                if route_matches_pool(pool, route) {
                    (Some(pool_value), false)
                } else {
                    (Some(route.clone()), true)
                }
            }
            (None, None) => (None, false),
        };

        // 7. Nothing selected: user-only, or not-found.
        if chosen.is_none() {
            return Ok(user_ctx.map(|ctx| Attribution {
                context: json!({ "user_context": ctx }),
                user_context: None,
                has_cached_route: false,
            }));
        }

        // 8. Attach zip -> area-code distance to the selected context's
        // `latest_context`, keyed off the callee's area code.
        if let Some(Value::Object(ref mut obj)) = chosen {
            attach_distance_to_latest_context(obj, call_to, self.geo_config, self.criteria);
        }
        let chosen = chosen.expect("checked is_none above");

        // 9. Refresh the route cache regardless of where the context came
        // from.
        self.route_cache.set(call_from, call_to, &chosen).await?;

        // 10.
        Ok(Some(Attribution {
            context: chosen,
            user_context: user_ctx,
            has_cached_route,
        }))
    }
}

/// Same session -> pool wins. Different session but same IP+UA -> pool
/// still wins (spec §4.4 step 6). Anything else -> route.
fn route_matches_pool(pool: &NumberContext, route: &Value) -> bool {
    let Some(route_ctx) = route.as_object() else {
        return false;
    };
    let pool_sid = pool.sid();
    let route_sid = route_ctx.get(types::SESSION_KEY).and_then(Value::as_str);
    if pool_sid == route_sid {
        return true;
    }
    is_same_ip_user_agent(&pool.request_context, route_ctx)
}

fn is_same_ip_user_agent(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    let ip_matches = types::ip(a).is_some() && types::ip(a) == types::ip(b);
    let ua_matches = types::user_agent(a).is_some() && types::user_agent(a) == types::user_agent(b);
    ip_matches && ua_matches
}

fn attach_distance(ctx: &mut Map<String, Value>, reference_number: &str, geo_config: &Geo, criteria: &CriteriaTable) {
    let Some(zip) = ctx.get(&geo_config.zip_field).and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    let Some(area_code) = reference_number.get(0..3) else {
        return;
    };
    if let Some(distance) = geo::zip_area_code_distance_miles(&zip, area_code, criteria) {
        ctx.insert("area_code_distance_miles".to_string(), json!(distance));
    }
}

fn attach_distance_to_latest_context(
    ctx: &mut Map<String, Value>,
    reference_number: &str,
    geo_config: &Geo,
    criteria: &CriteriaTable,
) {
    let Some(Value::Object(latest)) = ctx.get_mut(types::LATEST_CONTEXT_KEY) else {
        return;
    };
    attach_distance(latest, reference_number, geo_config, criteria);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Map};

    use crate::catalog::MemoryCatalog;
    use crate::config::{Duration, PoolDefaults};
    use crate::kv::memory::MemoryStore;
    use crate::pool::types::PoolProperties;

    #[test]
    fn strips_leading_plus_one() {
        assert_eq!(normalize("+15551234567"), "5551234567");
        assert_eq!(normalize("5551234567"), "5551234567");
    }

    struct Harness {
        pool_engine: PoolEngine,
        route_cache: RouteCache,
        user_profile: UserProfileStore,
        static_numbers: StaticNumberMap,
        geo_config: Geo,
        criteria: CriteriaTable,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Harness {
                pool_engine: PoolEngine::new(
                    store.clone(),
                    PoolDefaults::default(),
                    Arc::new(Geo::default()),
                    Arc::new(CriteriaTable::embedded()),
                ),
                route_cache: RouteCache::new(store.clone(), Duration::from_hours(24 * 30)),
                user_profile: UserProfileStore::new(store.clone(), Duration::from_hours(24 * 14), Vec::new()),
                static_numbers: StaticNumberMap::new(store),
                geo_config: Geo::default(),
                criteria: CriteriaTable::embedded(),
            }
        }

        fn resolver(&self) -> AttributionResolver<'_> {
            AttributionResolver {
                pool_engine: &self.pool_engine,
                route_cache: &self.route_cache,
                user_profile: &self.user_profile,
                static_numbers: &self.static_numbers,
                geo_config: &self.geo_config,
                criteria: &self.criteria,
            }
        }

        async fn seed_pool(&self, pool_id: i64, numbers: &[&str]) {
            let mut catalog = MemoryCatalog::new();
            catalog.add_pool(
                pool_id,
                "test",
                PoolProperties::default(),
                numbers.iter().map(|n| n.to_string()).collect(),
            );
            self.pool_engine.init_pools(&catalog, None).await.unwrap();
        }
    }

    /// S7: lease `x` for sid `S`, then exercise each attribution fallback
    /// leg in order as `x`'s live context degrades.
    #[tokio::test]
    async fn s7_attribution_fallbacks() {
        let h = Harness::new();
        h.seed_pool(1, &["5551112222"]).await;

        let mut request = Map::new();
        request.insert("sid".to_string(), json!("S"));
        let x = h
            .pool_engine
            .lease_number(1, request, None, None, false)
            .await
            .unwrap();

        // Leg 1: live pool context.
        let resolved = h.resolver().resolve("+15550001111", &x).await.unwrap().unwrap();
        assert!(resolved.context.get("pool_id").is_some());
        assert!(!resolved.has_cached_route);

        // Leg 2: expire x's context; the route cache entry set by the call
        // above takes over.
        h.pool_engine.test_force_renewed_at(&x, 0.0).await;
        let resolved = h.resolver().resolve("+15550001111", &x).await.unwrap().unwrap();
        assert!(resolved.has_cached_route);

        // Leg 3: evict the route entry (TTL) and fall to a static assignment.
        h.route_cache.test_delete("+15550001111", &x).await;
        h.static_numbers.set(&x, &json!({ "foo": 1 })).await.unwrap();
        let resolved = h.resolver().resolve("+15550001111", &x).await.unwrap().unwrap();
        assert_eq!(resolved.context, json!({ "static_context": { "foo": 1 } }));
        assert!(!resolved.has_cached_route);

        // Leg 4: a fresh pair with only a cached user profile for the
        // caller and no other state for the callee at all.
        let mut profile = Map::new();
        profile.insert("name".to_string(), json!("caller"));
        h.user_profile
            .set(crate::user_profile::UserIdType::Phone, "+15550001111", profile)
            .await
            .unwrap();
        let resolved = h.resolver().resolve("+15550001111", "5559990000").await.unwrap().unwrap();
        assert!(resolved.context.get("user_context").is_some());
        assert!(!resolved.has_cached_route);
    }

    /// Invariant 7: after a live-pool `track_call` succeeds, a subsequent
    /// call for the same pair after expiry resolves via the route cache.
    #[tokio::test]
    async fn invariant_7_route_cache_fallback() {
        let h = Harness::new();
        h.seed_pool(2, &["5553334444"]).await;
        let x = h
            .pool_engine
            .lease_number(2, Map::new(), None, None, false)
            .await
            .unwrap();
        h.resolver().resolve("+15559998888", &x).await.unwrap();

        h.pool_engine.test_force_renewed_at(&x, 0.0).await;
        let resolved = h.resolver().resolve("+15559998888", &x).await.unwrap().unwrap();
        assert!(resolved.has_cached_route);
    }

    /// Invariant 8: when pool and route contexts both exist and share a
    /// session id, the pool context wins over the (now stale) route entry.
    #[tokio::test]
    async fn invariant_8_same_session_prefers_pool() {
        let h = Harness::new();
        h.seed_pool(3, &["5556667777"]).await;
        let mut request = Map::new();
        request.insert("sid".to_string(), json!("shared-session"));
        let x = h
            .pool_engine
            .lease_number(3, request, None, None, false)
            .await
            .unwrap();

        // A stale route entry sharing the lease's session id, left over
        // from an earlier call between the same two numbers.
        let mut stale_route = Map::new();
        stale_route.insert("sid".to_string(), json!("shared-session"));
        h.route_cache
            .set("+15551230000", &x, &json!(stale_route))
            .await
            .unwrap();

        let resolved = h.resolver().resolve("+15551230000", &x).await.unwrap().unwrap();
        assert!(!resolved.has_cached_route);
        assert_eq!(
            resolved.context.get("request_context").and_then(|c| c.get("sid")),
            Some(&json!("shared-session"))
        );
    }
}
