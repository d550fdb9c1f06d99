//! `/refresh_number_pool_conn`, `/init_number_pools`, `/reset_pool`,
//! `/number_pool_stats` (spec.md §6) — C9 ops, all admin-key-gated.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::http::errors::ApiError;
use crate::http::handlers::check_admin_key;
use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminKeyQuery {
    #[serde(default)]
    pub key: Option<String>,
}

pub async fn refresh_number_pool_conn(
    State(state): State<AppState>,
    Query(query): Query<AdminKeyQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    state.admin.refresh_conn(&state.store_config).await?;
    Ok(Json(json!({ "status": "success" })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct InitPoolsQuery {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub pool_id: Option<i64>,
}

pub async fn init_number_pools(
    State(state): State<AppState>,
    Query(query): Query<InitPoolsQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let pool_ids = query.pool_id.map(|id| vec![id]);
    let report = state
        .admin
        .init_pools(state.catalog.as_ref(), pool_ids.as_deref())
        .await?;
    Ok(Json(json!({ "status": "success", "pools_initialized": report.pools_initialized })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ResetPoolQuery {
    #[serde(default)]
    pub key: Option<String>,
    pub pool_id: i64,
    #[serde(default)]
    pub preserve: bool,
}

pub async fn reset_pool(
    State(state): State<AppState>,
    Query(query): Query<ResetPoolQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let report = state
        .admin
        .reset_pool(state.catalog.as_ref(), query.pool_id, query.preserve)
        .await?;
    Ok(Json(json!({ "status": "success", "removed": report.removed, "added": report.added })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub with_contexts: bool,
}

pub async fn number_pool_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let stats = state
        .admin
        .stats(state.catalog.as_ref(), query.with_contexts)
        .await?;
    Ok(Json(json!({ "status": "success", "pools": stats })).into_response())
}
