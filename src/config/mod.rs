//! Configuration module for the number-pool engine.
//!
//! Provides configuration parsing, validation, and global access, mirroring
//! the teacher's `ArcSwap`-backed global config pattern.

use arc_swap::ArcSwap;
use log::info;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::errors::ConfigError;

mod catalog;
pub mod duration;
mod geo;
mod identity;
mod pool_defaults;
mod store;

pub use catalog::Catalog;
pub use duration::Duration;
pub use geo::Geo;
pub use identity::Identity;
pub use pool_defaults::PoolDefaults;
pub use store::Store;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file format, detected from extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn detect(path: &str) -> Self {
        let path_lower = path.to_lowercase();
        if path_lower.ends_with(".yaml") || path_lower.ends_with(".yml") {
            ConfigFormat::Yaml
        } else {
            ConfigFormat::Toml
        }
    }
}

fn parse_config_content<T: serde::de::DeserializeOwned>(
    contents: &str,
    format: ConfigFormat,
) -> Result<T, ConfigError> {
    match format {
        ConfigFormat::Toml => Ok(toml::from_str(contents)?),
        ConfigFormat::Yaml => Ok(serde_yaml::from_str(contents)?),
    }
}

/// Globally available configuration, swapped wholesale on reload.
static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// HTTP-facing settings: where the service listens and the admin key
/// that gates the admin routes (§6 of the external-interfaces contract).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Http {
    #[serde(default = "Http::default_host")]
    pub host: String,
    #[serde(default = "Http::default_port")]
    pub port: u16,
    /// Admin routes accept any `key` when this is set; used only in dev.
    #[serde(default)]
    pub debug: bool,
    /// Shared secret admin routes compare `key` against.
    #[serde(default)]
    pub admin_key: String,
}

impl Http {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        8000
    }
}

impl Default for Http {
    fn default() -> Self {
        Http {
            host: Self::default_host(),
            port: Self::default_port(),
            debug: false,
            admin_key: String::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(
        default = "Config::default_path",
        skip_serializing_if = "String::is_empty"
    )]
    pub path: String,

    #[serde(default)]
    pub http: Http,

    pub store: Store,

    #[serde(default)]
    pub catalog: Catalog,

    #[serde(default)]
    pub pool_defaults: PoolDefaults,

    #[serde(default)]
    pub geo: Geo,

    #[serde(default)]
    pub identity: Identity,

    /// Caller ids excluded from user-profile reads/writes (spec's
    /// `IGNORED_USER_CONTEXT_CALLER_IDS`), kept configurable rather than
    /// hard-coded.
    #[serde(default = "Config::default_ignored_caller_ids")]
    pub ignored_user_context_caller_ids: Vec<String>,
}

impl Config {
    pub fn default_path() -> String {
        String::from("numpool.toml")
    }

    fn default_ignored_caller_ids() -> Vec<String> {
        vec!["anonymous".to_string(), "266696687".to_string()]
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            path: Self::default_path(),
            http: Http::default(),
            store: Store::default(),
            catalog: Catalog::default(),
            pool_defaults: PoolDefaults::default(),
            geo: Geo::default(),
            identity: Identity::default(),
            ignored_user_context_caller_ids: Self::default_ignored_caller_ids(),
        }
    }
}

impl Config {
    /// Print current configuration at startup, mirroring the teacher's
    /// `Config::show`.
    pub fn show(&self) {
        info!("HTTP listening on {}:{}", self.http.host, self.http.port);
        info!("Store: {}", self.store.describe());
        info!(
            "Pool cache expiration: {}",
            self.pool_defaults.pool_cache_expiration
        );
        info!("Max renewal age: {}", self.pool_defaults.max_renewal_age);
        info!("Route cache TTL: {}", self.pool_defaults.route_cache_ttl);
        info!("User context TTL: {}", self.pool_defaults.user_context_ttl);
        info!(
            "Ignored user-context caller ids: {:?}",
            self.ignored_user_context_caller_ids
        );
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        Ok(())
    }
}

/// Get a read-only snapshot of the configuration from anywhere in the app.
pub fn get_config() -> Config {
    (*(*CONFIG.load())).clone()
}

async fn load_file(path: &str) -> Result<String, ConfigError> {
    let mut contents = String::new();
    let mut file = File::open(path).await?;
    file.read_to_string(&mut contents).await?;
    Ok(contents)
}

/// Parse the configuration file located at the path and install it as the
/// globally visible configuration. Supports TOML and YAML, auto-detected by
/// extension.
pub async fn parse(path: &str) -> Result<(), ConfigError> {
    let format = ConfigFormat::detect(path);
    let contents = load_file(path).await?;
    let mut config: Config = parse_config_content(&contents, format)?;
    config.validate()?;
    config.path = path.to_string();
    CONFIG.store(Arc::new(config));
    Ok(())
}

/// Replace the globally visible configuration, used by the admin
/// `refresh_number_pool_conn` path after a KV-store reconnect (C9).
pub fn set_config(config: Config) {
    CONFIG.store(Arc::new(config));
}
