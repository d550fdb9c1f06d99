//! Runtime bootstrap: builds the tokio runtime by hand (mirroring the
//! teacher's manual `Builder::new_multi_thread()` instead of
//! `#[tokio::main]`), wires every component behind `http::AppState`, and
//! serves the axum router with graceful shutdown on SIGINT/SIGTERM.

use std::path::Path;
use std::process;
use std::sync::Arc;

use tokio::runtime::Builder;
#[cfg(not(windows))]
use tokio::signal::unix::{signal as unix_signal, SignalKind};
#[cfg(windows)]
use tokio::signal::windows as win_signal;

use log::{error, info};

use crate::admin::AdminService;
use crate::app::args::Args;
use crate::catalog::{CatalogReader, PostgresCatalog};
use crate::config::Config;
use crate::geo::CriteriaTable;
use crate::http::{self, AppState};
use crate::kv::memory::MemoryStore;
use crate::kv::redis_store::RedisStore;
use crate::kv::KvStore;
use crate::pool::engine::PoolEngine;
use crate::route_cache::RouteCache;
use crate::static_numbers::StaticNumberMap;
use crate::user_profile::UserProfileStore;

async fn shutdown_signal() {
    #[cfg(not(windows))]
    {
        let mut term = unix_signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = unix_signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = term.recv() => info!("got SIGTERM, starting graceful shutdown"),
            _ = int.recv() => info!("got SIGINT, starting graceful shutdown"),
        }
    }
    #[cfg(windows)]
    {
        let mut ctrl_c = win_signal::ctrl_c().expect("install Ctrl-C handler");
        ctrl_c.recv().await;
        info!("got Ctrl-C, starting graceful shutdown");
    }
}

/// A `memory://` store URL selects the in-process test double instead of
/// Redis; everything else is treated as a Redis connection string.
async fn build_store(config: &Config) -> Result<(Arc<dyn KvStore>, Option<RedisStore>), Box<dyn std::error::Error>> {
    if config.store.url.starts_with("memory://") {
        return Ok((Arc::new(MemoryStore::new()), None));
    }
    let redis = RedisStore::connect(&config.store).await?;
    Ok((Arc::new(redis.clone()), Some(redis)))
}

async fn run_async(_args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (store, redis_store) = build_store(&config).await?;

    let criteria_path = Path::new(&config.geo.criteria_path);
    let criteria = if criteria_path.exists() {
        CriteriaTable::load(criteria_path).await?
    } else {
        info!(
            "criteria table {} not found, falling back to the embedded sample set",
            config.geo.criteria_path
        );
        CriteriaTable::embedded()
    };
    let criteria = Arc::new(criteria);
    let geo_config = Arc::new(config.geo.clone());

    let pool_engine = Arc::new(PoolEngine::new(
        store.clone(),
        config.pool_defaults.clone(),
        geo_config.clone(),
        criteria.clone(),
    ));
    let route_cache = Arc::new(RouteCache::new(store.clone(), config.pool_defaults.route_cache_ttl));
    let user_profile = Arc::new(UserProfileStore::new(
        store.clone(),
        config.pool_defaults.user_context_ttl,
        config.ignored_user_context_caller_ids.clone(),
    ));
    let static_numbers = Arc::new(StaticNumberMap::new(store.clone()));
    let admin = Arc::new(AdminService::new(pool_engine.clone(), redis_store));

    let catalog: Arc<dyn CatalogReader> =
        Arc::new(PostgresCatalog::connect(&config.catalog.connection_string).await?);

    let state = AppState {
        pool_engine,
        route_cache,
        user_profile,
        static_numbers,
        admin,
        catalog,
        criteria,
        geo_config,
        identity_config: Arc::new(config.identity.clone()),
        store_config: Arc::new(config.store.clone()),
        admin_key: Arc::new(config.http.admin_key.clone()),
        admin_debug: config.http.debug,
    };

    let router = http::build_router(state);
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

pub fn run_server(args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut runtime_builder = Builder::new_multi_thread();
    runtime_builder.enable_all().thread_name("worker-numpool");

    let runtime = runtime_builder.build().unwrap_or_else(|e| {
        error!("failed to build tokio runtime: {e}");
        process::exit(1);
    });

    runtime.block_on(run_async(args, config))
}
