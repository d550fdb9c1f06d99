//! Catalog Reader (C2) — the source of truth for which pools exist and
//! which numbers belong to each, read from Postgres. `number_pool.py`
//! delegates this to an injected Django-ORM-backed catalog; here it is a
//! thin `tokio-postgres` client against the same two tables.

use std::collections::HashSet;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use thiserror::Error;
use tokio_postgres::NoTls;

use crate::pool::types::PoolProperties;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog connection error: {0}")]
    Connect(#[from] tokio_postgres::Error),
    #[error("malformed pool properties for pool {pool_id}: {source}")]
    MalformedProperties {
        pool_id: i64,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PoolRow {
    pub id: i64,
    pub name: String,
    pub properties: PoolProperties,
}

/// Abstraction over "where pools and their numbers come from", so
/// `PoolEngine::init_pools`/`reset_pool`/`get_all_pool_stats` can be tested
/// against an in-memory catalog double.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn active_pools(&self) -> Result<Vec<PoolRow>, CatalogError>;
    async fn pool_numbers(&self, pool_id: i64) -> Result<HashSet<String>, CatalogError>;
}

/// Postgres-backed catalog, querying `pools` and `pool_numbers` tables.
pub struct PostgresCatalog {
    client: tokio_postgres::Client,
}

impl PostgresCatalog {
    pub async fn connect(connection_string: &str) -> Result<Self, CatalogError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("catalog connection closed: {e}");
            }
        });
        Ok(PostgresCatalog { client })
    }
}

#[async_trait]
impl CatalogReader for PostgresCatalog {
    async fn active_pools(&self) -> Result<Vec<PoolRow>, CatalogError> {
        let rows = self
            .client
            .query(
                "SELECT id, name, properties FROM pools WHERE active = true ORDER BY id",
                &[],
            )
            .await?;
        let mut pools = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let name: String = row.get("name");
            let raw: Value = row.get("properties");
            let properties: PoolProperties = serde_json::from_value(raw)
                .map_err(|source| CatalogError::MalformedProperties { pool_id: id, source })?;
            pools.push(PoolRow { id, name, properties });
        }
        Ok(pools)
    }

    async fn pool_numbers(&self, pool_id: i64) -> Result<HashSet<String>, CatalogError> {
        let rows = self
            .client
            .query("SELECT number FROM pool_numbers WHERE pool_id = $1", &[&pool_id])
            .await?;
        Ok(rows.into_iter().map(|row| row.get::<_, String>("number")).collect())
    }
}

/// In-process catalog double for tests, matching the shape of the
/// in-memory `KvStore` test double.
pub struct MemoryCatalog {
    pools: Vec<(PoolRow, HashSet<String>)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog { pools: Vec::new() }
    }

    pub fn add_pool(&mut self, id: i64, name: &str, properties: PoolProperties, numbers: HashSet<String>) {
        self.pools.push((
            PoolRow {
                id,
                name: name.to_string(),
                properties,
            },
            numbers,
        ));
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn active_pools(&self) -> Result<Vec<PoolRow>, CatalogError> {
        Ok(self.pools.iter().map(|(row, _)| row.clone()).collect())
    }

    async fn pool_numbers(&self, pool_id: i64) -> Result<HashSet<String>, CatalogError> {
        Ok(self
            .pools
            .iter()
            .find(|(row, _)| row.id == pool_id)
            .map(|(_, numbers)| numbers.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_catalog_round_trip() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_pool(
            1,
            "sales",
            PoolProperties::default(),
            HashSet::from(["5551234567".to_string()]),
        );
        let pools = catalog.active_pools().await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name, "sales");
        let numbers = catalog.pool_numbers(1).await.unwrap();
        assert!(numbers.contains("5551234567"));
    }
}
