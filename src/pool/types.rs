//! Core data types for the pool state engine (C3), per the data model §3.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known keys read out of an otherwise-arbitrary JSON request context.
/// Deep-merge is specified only for `visits` and `latest_context`; every
/// other key is last-writer-wins (spec design note: "Dynamic typing of
/// contexts").
pub const SESSION_KEY: &str = "sid";
pub const IP_KEY: &str = "ip";
pub const USER_AGENT_KEY: &str = "user_agent";
pub const VISITS_KEY: &str = "visits";
pub const LATEST_CONTEXT_KEY: &str = "latest_context";

/// A typed façade over the arbitrary-JSON request context attached to a
/// number lease. Unknown keys round-trip through `extra` untouched.
pub type RequestContext = Map<String, Value>;

pub fn sid(ctx: &RequestContext) -> Option<&str> {
    ctx.get(SESSION_KEY).and_then(Value::as_str)
}

pub fn ip(ctx: &RequestContext) -> Option<&str> {
    ctx.get(IP_KEY).and_then(Value::as_str)
}

pub fn user_agent(ctx: &RequestContext) -> Option<&str> {
    ctx.get(USER_AGENT_KEY).and_then(Value::as_str)
}

/// Merge `incoming` into `base` in place: `visits` and `latest_context` are
/// merged key-by-key (incoming wins per key on conflict); every other key
/// in `incoming` overwrites the one in `base`. Mirrors `dictmerge` calls
/// around `visits`/`latest_context` in the original lease/renew paths.
pub fn merge_request_context(base: &mut RequestContext, incoming: &RequestContext) {
    for (key, incoming_value) in incoming {
        match key.as_str() {
            VISITS_KEY | LATEST_CONTEXT_KEY => {
                let existing = base
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let (Value::Object(existing_map), Value::Object(incoming_map)) =
                    (existing, incoming_value)
                {
                    for (k, v) in incoming_map {
                        existing_map.insert(k.clone(), v.clone());
                    }
                } else {
                    base.insert(key.clone(), incoming_value.clone());
                }
            }
            _ => {
                base.insert(key.clone(), incoming_value.clone());
            }
        }
    }
}

/// `{pool_id, request_context, leased_at, renewed_at}` — the unit of state
/// stored per leased number (spec §3 "NumberContext").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumberContext {
    pub pool_id: i64,
    #[serde(default)]
    pub request_context: RequestContext,
    pub leased_at: f64,
    pub renewed_at: f64,
}

impl NumberContext {
    pub fn new(pool_id: i64, request_context: RequestContext, now: f64) -> Self {
        NumberContext {
            pool_id,
            request_context,
            leased_at: now,
            renewed_at: now,
        }
    }

    pub fn age_secs(&self, now: f64) -> f64 {
        now - self.renewed_at
    }

    pub fn sid(&self) -> Option<&str> {
        sid(&self.request_context)
    }
}

/// The three reachable states of a number within its owning pool (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberStatus {
    Free,
    Taken,
    Expired,
}

/// A pool's property bag as read from the catalog and cached in the store
/// (spec §3 "Pool" / "PoolPropertiesCache").
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PoolProperties {
    #[serde(default)]
    pub area_code: Option<String>,
    #[serde(default)]
    pub fallback_area_code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PoolProperties {
    /// A pool is an *area-code pool* when `area_code == "all"` (case
    /// insensitive; spec §4.3).
    pub fn is_area_code_pool(&self) -> bool {
        self.area_code
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("all"))
            .unwrap_or(false)
    }
}
