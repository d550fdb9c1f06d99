//! `/get_static_number_context`, `/set_static_number_contexts` (spec.md §6)
//! — C7 ops. Only the write route is in the admin-routes list; the read
//! route carries a `key` field in its request shape but is not checked
//! against it.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::errors::ApiError;
use crate::http::handlers::check_admin_key;
use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct GetStaticNumberQuery {
    #[serde(default)]
    pub key: Option<String>,
    pub number: String,
}

pub async fn get_static_number_context(
    State(state): State<AppState>,
    Query(query): Query<GetStaticNumberQuery>,
) -> Result<Response, ApiError> {
    let context = state.static_numbers.get(&query.number).await?;
    Ok(Json(json!({ "status": "success", "context": context })).into_response())
}

/// `contexts` is a list of context fragments merged (in order, later keys
/// win) into the single object stored for `number`.
#[derive(Debug, Deserialize)]
pub struct SetStaticNumberContextsRequest {
    pub key: Option<String>,
    pub number: String,
    #[serde(default)]
    pub contexts: Vec<Value>,
}

pub async fn set_static_number_contexts(
    State(state): State<AppState>,
    Json(body): Json<SetStaticNumberContextsRequest>,
) -> Result<Response, ApiError> {
    check_admin_key(body.key.as_deref(), &state.admin_key, state.admin_debug)?;

    let mut merged = serde_json::Map::new();
    for ctx in &body.contexts {
        if let Value::Object(map) = ctx {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    let context = Value::Object(merged);
    state.static_numbers.set(&body.number, &context).await?;
    Ok(Json(json!({ "status": "success", "context": context })).into_response())
}
