use std::fmt;

use crate::errors::KvError;

/// Errors surfaced by the pool state engine (C3). Mirrors the teacher's
/// hand-written `Display` style (rather than a `thiserror` derive), since
/// every variant here maps to one of the literal HTTP-facing messages in
/// the external-interfaces error table.
#[derive(Debug)]
pub enum PoolError {
    /// Store connection failed or the per-pool lock could not be acquired
    /// within `wait_timeout`.
    PoolUnavailable { pool_id: i64 },

    /// Free set empty and no Taken entry is eligible for takeover.
    PoolEmpty { pool_id: i64 },

    /// Lease was pinned by session but the targeted/session number could
    /// not be obtained (e.g. taken by someone else with no fallback path).
    SessionNumberUnavailable { pool_id: i64 },

    /// A targeted free number was removed from the pool concurrently.
    NumberNotFound { pool_id: i64, number: String },

    /// Renewal attempted past `MAX_RENEWAL_AGE` since the original lease.
    MaxRenewalExceeded { pool_id: i64, number: String },

    /// Area-code pool has no `fallback_area_code` configured; fatal for
    /// the lease attempt rather than falling back to a random number.
    MissingFallbackAreaCode { pool_id: i64 },

    /// An area code string failed the `len == 3 && all digits` check.
    InvalidAreaCode { area_code: String },

    /// Underlying store error.
    Kv(KvError),
}

impl From<KvError> for PoolError {
    fn from(e: KvError) -> Self {
        Self::Kv(e)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolUnavailable { pool_id } => {
                write!(f, "pool unavailable (pool_unavailable): pool {pool_id}")
            }
            Self::PoolEmpty { pool_id } => write!(f, "pool empty (empty): pool {pool_id}"),
            Self::SessionNumberUnavailable { pool_id } => write!(
                f,
                "session number unavailable (number_unavailable): pool {pool_id}"
            ),
            Self::NumberNotFound { pool_id, number } => {
                write!(f, "number not found (not_found): {pool_id}/{number}")
            }
            Self::MaxRenewalExceeded { pool_id, number } => write!(
                f,
                "maximum renewal exceeded (max_renewal): {pool_id}/{number}"
            ),
            Self::MissingFallbackAreaCode { pool_id } => write!(
                f,
                "no fallback area code specified for pool {pool_id} (config_error)"
            ),
            Self::InvalidAreaCode { area_code } => {
                write!(f, "invalid area code: {area_code:?}")
            }
            Self::Kv(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

impl PoolError {
    /// The literal `error` code the HTTP layer renders in `{status:"error",
    /// msg: ...}` envelopes, per spec.md §7's error-kind table.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PoolUnavailable { .. } => "pool_unavailable",
            Self::PoolEmpty { .. } => "empty",
            Self::SessionNumberUnavailable { .. } => "number_unavailable",
            Self::NumberNotFound { .. } => "not_found",
            Self::MaxRenewalExceeded { .. } => "max_renewal",
            Self::MissingFallbackAreaCode { .. } | Self::InvalidAreaCode { .. } => "config_error",
            Self::Kv(_) => "pool_unavailable",
        }
    }
}

/// What the lease driver does next after evaluating a candidate path,
/// replacing the original Python implementation's exception-driven control
/// flow (spec design note: "Exception-driven control flow in lease").
pub enum LeaseOutcome {
    Leased(String),
    /// Demote to a fresh random/area-code lease. Session-key-mismatch is
    /// never surfaced to callers — it is caught here and folded into a
    /// retry, exactly like `NumberSessionKeyMismatch` in the original.
    Retry,
    Fail(PoolError),
}
