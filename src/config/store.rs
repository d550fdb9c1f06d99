//! Key-value store connection settings (backs C1).

use serde_derive::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Store {
    #[serde(default = "Store::default_url")]
    pub url: String,
    #[serde(default = "Store::default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "Store::default_connect_retry_pause")]
    pub connect_retry_pause: super::Duration,
    #[serde(default = "Store::default_pool_size")]
    pub pool_size: usize,
}

impl Store {
    fn default_url() -> String {
        "redis://127.0.0.1:6379".to_string()
    }

    fn default_connect_retries() -> u32 {
        5
    }

    fn default_connect_retry_pause() -> super::Duration {
        super::Duration::from_secs(1)
    }

    fn default_pool_size() -> usize {
        16
    }

    pub fn describe(&self) -> String {
        format!("{} (pool_size={})", self.url, self.pool_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid("store.url must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Store {
            url: Self::default_url(),
            connect_retries: Self::default_connect_retries(),
            connect_retry_pause: Self::default_connect_retry_pause(),
            pool_size: Self::default_pool_size(),
        }
    }
}
