//! `/get_user_context`, `/update_user_context`, `/remove_user_context`
//! (spec.md §6) — C6 ops. `id_type` follows the original `schemas/zar.py`
//! wire value `session_id` rather than spec.md's `sid` shorthand (see
//! DESIGN.md's Open Question decision).

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::errors::ApiError;
use crate::http::handlers::check_admin_key;
use crate::http::AppState;
use crate::user_profile::UserIdType;

fn parse_id_type(raw: &str) -> Result<UserIdType, ApiError> {
    match raw {
        "phone" => Ok(UserIdType::Phone),
        "email" => Ok(UserIdType::Email),
        "session_id" => Ok(UserIdType::SessionId),
        other => Err(ApiError::BadRequest(format!("unknown id_type {other:?}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct UserContextQuery {
    pub key: Option<String>,
    pub user_id: String,
    pub id_type: String,
}

pub async fn get_user_context(
    State(state): State<AppState>,
    Query(query): Query<UserContextQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let id_type = parse_id_type(&query.id_type)?;
    let context = state.user_profile.get(id_type, &query.user_id).await?;
    Ok(Json(json!({ "status": "success", "context": context })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserContextRequest {
    pub key: Option<String>,
    pub user_id: String,
    pub id_type: String,
    #[serde(default)]
    pub context: Value,
}

pub async fn update_user_context(
    State(state): State<AppState>,
    Json(body): Json<UpdateUserContextRequest>,
) -> Result<Response, ApiError> {
    check_admin_key(body.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let id_type = parse_id_type(&body.id_type)?;
    let context = match body.context {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    let merged = state.user_profile.update(id_type, &body.user_id, &context).await?;
    Ok(Json(json!({ "status": "success", "context": merged })).into_response())
}

pub async fn remove_user_context(
    State(state): State<AppState>,
    Query(query): Query<UserContextQuery>,
) -> Result<Response, ApiError> {
    check_admin_key(query.key.as_deref(), &state.admin_key, state.admin_debug)?;
    let id_type = parse_id_type(&query.id_type)?;
    state.user_profile.remove(id_type, &query.user_id).await?;
    Ok(Json(json!({ "status": "success" })).into_response())
}
