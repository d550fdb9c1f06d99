//! `/number_pool`, `/update_number` (spec.md §6) — C3 lease and out-of-band
//! update, driven by the caller's sid (cookie only; no session means
//! `no_sid`).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::http::cookies::{self, POOL_COOKIE, SID_COOKIE};
use crate::http::errors::ApiError;
use crate::http::AppState;
use crate::pool::types::RequestContext;

fn context_with_sid(sid: &str, properties: Option<Value>, context: Option<Value>) -> RequestContext {
    let mut ctx: RequestContext = match context {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(Value::Object(props)) = properties {
        for (k, v) in props {
            ctx.entry(k).or_insert(v);
        }
    }
    ctx.insert("sid".to_string(), json!(sid));
    ctx
}

#[derive(Debug, Deserialize)]
pub struct NumberPoolRequest {
    pub pool_id: i64,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub properties: Option<Value>,
}

/// `POST /number_pool`.
pub async fn number_pool(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NumberPoolRequest>,
) -> Result<Response, ApiError> {
    let Some(sid) = cookies::read_zar_id(&headers, SID_COOKIE) else {
        return Err(ApiError::NoSid);
    };

    let had_pool_cookie = cookies::read_raw(&headers, POOL_COOKIE).is_some();
    if body.number.is_some() && !had_pool_cookie {
        return Err(ApiError::PoolCookieExpired);
    }

    let ctx = context_with_sid(&sid.id, body.properties, body.context);
    let renew = body.number.is_some();
    let leased = state
        .pool_engine
        .lease_number(body.pool_id, ctx, body.number, None, renew)
        .await?;

    Ok(Json(json!({ "status": "success", "number": leased })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpdateNumberRequest {
    pub pool_id: i64,
    pub number: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub properties: Value,
}

/// `POST /update_number` — always merges (spec.md §4.2 "Update-number").
pub async fn update_number(
    State(state): State<AppState>,
    Json(body): Json<UpdateNumberRequest>,
) -> Result<Response, ApiError> {
    let mut ctx: RequestContext = match body.context {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(props) = body.properties {
        for (k, v) in props {
            ctx.entry(k).or_insert(v);
        }
    }

    let updated = state
        .pool_engine
        .update_number(body.pool_id, &body.number, ctx, true)
        .await?;

    match updated {
        Some(context) => Ok(Json(json!({ "status": "success", "context": context })).into_response()),
        None => Err(ApiError::Pool(crate::pool::errors::PoolError::NumberNotFound {
            pool_id: body.pool_id,
            number: body.number,
        })),
    }
}
