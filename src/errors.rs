//! Errors.

use std::io;

use crate::catalog::CatalogError;
use crate::pool::errors::PoolError;

/// Top-level error type aggregating every component's error enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Attribution(#[from] AttributionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised by the key-value store adapter (C1).
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key-value store connection unavailable after {attempts} attempts")]
    ConnectionUnavailable { attempts: u32 },
    #[error("lock {name:?} unavailable")]
    LockUnavailable { name: String },
    #[error(transparent)]
    Backend(#[from] redis::RedisError),
    #[error("failed to (de)serialize value stored under {key:?}: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Pool(#[from] deadpool_redis::PoolError),
}

/// Errors surfaced by the call-attribution resolver (C8).
#[derive(Debug, thiserror::Error)]
pub enum AttributionError {
    #[error("no context found for call {call_from} -> {call_to}")]
    NotFound { call_from: String, call_to: String },
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("unrecognized config file extension in {0:?}")]
    UnknownFormat(String),
    #[error("area-code pool {pool_id} has no fallback_area_code configured")]
    MissingFallbackAreaCode { pool_id: i64 },
    #[error("invalid duration literal {0:?}")]
    InvalidDuration(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the identifier/cookie service (C10).
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no resolvable session id")]
    NoSid,
    #[error("cookie value is not valid URL-encoded JSON: {0}")]
    MalformedCookie(#[from] serde_json::Error),
}
