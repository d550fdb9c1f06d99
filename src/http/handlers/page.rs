//! `/page`, `/track`, `/noscript` (spec.md §6) — identifier reconciliation
//! (C10) plus, for `/page`, an optional pool lease (C3) when the client has
//! opted in via the pool cookie or the `pl=1` query flag.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::http::cookies::{self, CID_MAX_AGE, CID_COOKIE, POOL_COOKIE, SID_COOKIE, SID_MAX_AGE};
use crate::http::errors::ApiError;
use crate::http::AppState;
use crate::identity::{self, ZarId};
use crate::pool::types::{RequestContext, LATEST_CONTEXT_KEY};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn request_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}

fn request_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
pub struct PageProperties {
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub zar: Option<Map<String, Value>>,
    #[serde(default)]
    pub pool_id: Option<i64>,
    #[serde(default)]
    pub pool_context: Option<Value>,
    #[serde(default)]
    pub pool_max_age: Option<u64>,
    #[serde(default)]
    pub is_bot: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PageRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub properties: PageProperties,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolCookie {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    numbers: HashMap<String, Value>,
}

fn identifiers(
    headers: &HeaderMap,
    zar_body: Option<&Map<String, Value>>,
    referrer: &str,
    reset_param_value: Option<&str>,
) -> identity::ZarIds {
    let cookie_sid = cookies::read_zar_id(headers, SID_COOKIE);
    let cookie_cid = cookies::read_zar_id(headers, CID_COOKIE);
    let cookie_vid = zar_body
        .and_then(|z| z.get("vid"))
        .and_then(|v| serde_json::from_value::<ZarId>(v.clone()).ok());
    identity::reconcile(zar_body, cookie_sid, cookie_cid, cookie_vid, now_ms(), referrer, reset_param_value)
}

fn request_context(
    headers: &HeaderMap,
    sid: &str,
    properties: &PageProperties,
) -> RequestContext {
    let mut ctx = Map::new();
    ctx.insert("sid".to_string(), json!(sid));
    // Area-code pool leasing (spec.md §4.3) resolves its target area codes
    // from `latest_context.url`'s query string.
    ctx.insert(LATEST_CONTEXT_KEY.to_string(), json!({ "url": properties.url }));
    if let Some(ip) = request_ip(headers) {
        ctx.insert("ip".to_string(), json!(ip));
    }
    if let Some(ua) = request_user_agent(headers) {
        ctx.insert("user_agent".to_string(), json!(ua));
    }
    if let Some(extra) = &properties.pool_context {
        if let Value::Object(map) = extra {
            for (k, v) in map {
                ctx.insert(k.clone(), v.clone());
            }
        }
    }
    ctx
}

/// `POST /page`.
pub async fn page(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<PageRequest>,
) -> Result<Response, ApiError> {
    let reset_param_value = query.get(state.identity_config.reset_param.as_str()).map(String::as_str);
    let ids = identifiers(
        &headers,
        body.properties.zar.as_ref(),
        body.properties.referrer.as_deref().unwrap_or(""),
        reset_param_value,
    );

    let host = request_host(&headers);
    let mut response_headers = HeaderMap::new();
    response_headers.append(
        axum::http::header::SET_COOKIE,
        cookies::zar_set_cookie(SID_COOKIE, &ids.sid, SID_MAX_AGE, &host),
    );
    response_headers.append(
        axum::http::header::SET_COOKIE,
        cookies::zar_set_cookie(CID_COOKIE, &ids.cid, CID_MAX_AGE, &host),
    );

    let mut pool_cookie: PoolCookie = if ids.session_reset {
        PoolCookie::default()
    } else {
        cookies::read_raw(&headers, POOL_COOKIE)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    };

    let mut pool_data = None;
    if let Some(pool_id) = body.properties.pool_id {
        let opted_in = pool_cookie.enabled || query.get("pl").map(String::as_str) == Some("1");
        if opted_in {
            let ctx = request_context(&headers, &ids.sid.id, &body.properties);
            let leased = state.pool_engine.lease_number(pool_id, ctx, None, None, false).await?;
            pool_cookie.enabled = true;
            pool_cookie
                .numbers
                .insert(pool_id.to_string(), json!({ "number": leased }));
            pool_data = Some(json!({ pool_id.to_string(): { "number": leased } }));

            let pool_max_age = body
                .properties
                .pool_max_age
                .map(crate::config::Duration::from_secs)
                .unwrap_or(crate::config::Duration::from_hours(24 * 7));
            let raw = serde_json::to_string(&pool_cookie).unwrap_or_else(|_| "{}".to_string());
            response_headers.append(
                axum::http::header::SET_COOKIE,
                cookies::set_cookie_header(POOL_COOKIE, &raw, pool_max_age, &host),
            );
        }
    }

    let body = json!({
        "status": "success",
        "vid": ids.vid,
        "sid": ids.sid,
        "cid": ids.cid,
        "id": ids.vid.id,
        "pool_data": pool_data,
    });
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub event: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

/// `POST /track` — resolves identifiers without minting new ones.
pub async fn track(headers: HeaderMap, Json(_body): Json<TrackRequest>) -> Response {
    let is_beacon = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/plain"))
        .unwrap_or(false);
    if is_beacon {
        return StatusCode::NO_CONTENT.into_response();
    }
    let vid = cookies::read_zar_id(&headers, SID_COOKIE).map(|z| z.id);
    Json(json!({ "status": "success", "id": vid })).into_response()
}

/// `GET /noscript` — server-side id synthesis, records a page event with
/// `noscript=true` (external persistence is out of core scope per spec.md
/// §6's persisted-state note).
pub async fn noscript(headers: HeaderMap) -> Response {
    let sid = cookies::read_zar_id(&headers, SID_COOKIE)
        .map(|z| z.id)
        .unwrap_or_else(identity::create_sid);
    Json(json!({ "status": "success", "id": sid, "noscript": true })).into_response()
}
