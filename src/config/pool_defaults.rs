//! Pool-engine timing constants (§6 "Constants (defaults)").

use serde_derive::{Deserialize, Serialize};

use super::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PoolDefaults {
    /// Inactivity window after which a Taken number becomes eligible for
    /// takeover. Two values appear in the original service's history (4m
    /// and 6m); this keeps 6m as the default per the design-notes decision.
    #[serde(default = "PoolDefaults::default_pool_cache_expiration")]
    pub pool_cache_expiration: Duration,
    /// Ceiling on continuous renewal age; the first renewal past this
    /// fails with max-renewal-exceeded.
    #[serde(default = "PoolDefaults::default_max_renewal_age")]
    pub max_renewal_age: Duration,
    /// Route-cache retention window.
    #[serde(default = "PoolDefaults::default_route_cache_ttl")]
    pub route_cache_ttl: Duration,
    /// User-profile retention window.
    #[serde(default = "PoolDefaults::default_user_context_ttl")]
    pub user_context_ttl: Duration,
    /// Per-pool lock wait timeout.
    #[serde(default = "PoolDefaults::default_lock_wait")]
    pub lock_wait: Duration,
    /// Per-pool lock hold timeout (auto-release even if the holder crashed).
    #[serde(default = "PoolDefaults::default_lock_hold")]
    pub lock_hold: Duration,
    /// Global init-lock wait timeout.
    #[serde(default = "PoolDefaults::default_init_lock_wait")]
    pub init_lock_wait: Duration,
}

impl PoolDefaults {
    fn default_pool_cache_expiration() -> Duration {
        Duration::from_mins(6)
    }
    fn default_max_renewal_age() -> Duration {
        Duration::from_hours(24 * 7)
    }
    fn default_route_cache_ttl() -> Duration {
        Duration::from_hours(24 * 30)
    }
    fn default_user_context_ttl() -> Duration {
        Duration::from_hours(24 * 14)
    }
    fn default_lock_wait() -> Duration {
        Duration::from_secs(5)
    }
    fn default_lock_hold() -> Duration {
        Duration::from_secs(5)
    }
    fn default_init_lock_wait() -> Duration {
        Duration::from_secs(2)
    }
}

impl Default for PoolDefaults {
    fn default() -> Self {
        PoolDefaults {
            pool_cache_expiration: Self::default_pool_cache_expiration(),
            max_renewal_age: Self::default_max_renewal_age(),
            route_cache_ttl: Self::default_route_cache_ttl(),
            user_context_ttl: Self::default_user_context_ttl(),
            lock_wait: Self::default_lock_wait(),
            lock_hold: Self::default_lock_hold(),
            init_lock_wait: Self::default_init_lock_wait(),
        }
    }
}
