//! External Interfaces (spec.md §6) — a thin axum layer over C3/C6/C7/C8/
//! C9/C10. Grounded in `xulek-RustSocks`'s `api::server` (`axum::Router`
//! wiring a cloneable `ApiState`, `routing::{get, post}`) since the teacher
//! speaks the Postgres wire protocol for its own traffic, not JSON-over-HTTP.

pub mod cookies;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::admin::AdminService;
use crate::catalog::CatalogReader;
use crate::config::{Geo, Identity as IdentityConfig, Store as StoreConfig};
use crate::geo::CriteriaTable;
use crate::pool::engine::PoolEngine;
use crate::route_cache::RouteCache;
use crate::static_numbers::StaticNumberMap;
use crate::user_profile::UserProfileStore;

/// Shared state handed to every handler, following `xulek-RustSocks`'s
/// `ApiState` (one `Clone` struct of `Arc`-wrapped services passed via
/// `State`).
#[derive(Clone)]
pub struct AppState {
    pub pool_engine: Arc<PoolEngine>,
    pub route_cache: Arc<RouteCache>,
    pub user_profile: Arc<UserProfileStore>,
    pub static_numbers: Arc<StaticNumberMap>,
    pub admin: Arc<AdminService>,
    pub catalog: Arc<dyn CatalogReader>,
    pub criteria: Arc<CriteriaTable>,
    pub geo_config: Arc<Geo>,
    pub identity_config: Arc<IdentityConfig>,
    pub store_config: Arc<StoreConfig>,
    pub admin_key: Arc<String>,
    pub admin_debug: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ok", get(handlers::health::ok))
        .route("/page", post(handlers::page::page))
        .route("/track", post(handlers::page::track))
        .route("/noscript", get(handlers::page::noscript))
        .route("/number_pool", post(handlers::pool::number_pool))
        .route("/update_number", post(handlers::pool::update_number))
        .route("/track_call", post(handlers::track_call::track_call))
        .route("/get_user_context", get(handlers::user_context::get_user_context))
        .route("/update_user_context", post(handlers::user_context::update_user_context))
        .route("/remove_user_context", get(handlers::user_context::remove_user_context))
        .route(
            "/get_static_number_context",
            get(handlers::static_numbers::get_static_number_context),
        )
        .route(
            "/set_static_number_contexts",
            post(handlers::static_numbers::set_static_number_contexts),
        )
        .route(
            "/refresh_number_pool_conn",
            get(handlers::admin::refresh_number_pool_conn),
        )
        .route("/init_number_pools", get(handlers::admin::init_number_pools))
        .route("/reset_pool", get(handlers::admin::reset_pool))
        .route("/number_pool_stats", get(handlers::admin::number_pool_stats))
        .with_state(state)
}
