//! Integration tests over the axum surface (spec.md §6/§8), built entirely
//! on the in-memory `KvStore`/`CatalogReader` doubles so no Redis or
//! Postgres instance is required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use numpool::admin::AdminService;
use numpool::catalog::{CatalogReader, MemoryCatalog};
use numpool::config::{Duration, Geo, Identity, PoolDefaults};
use numpool::geo::CriteriaTable;
use numpool::http::{build_router, AppState};
use numpool::kv::memory::MemoryStore;
use numpool::kv::KvStore;
use numpool::pool::engine::PoolEngine;
use numpool::route_cache::RouteCache;
use numpool::static_numbers::StaticNumberMap;
use numpool::user_profile::UserProfileStore;

const ADMIN_KEY: &str = "test-admin-key";

fn build_state() -> AppState {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let defaults = PoolDefaults::default();
    let criteria = Arc::new(CriteriaTable::embedded());
    let geo_config = Arc::new(Geo::default());
    let pool_engine = Arc::new(PoolEngine::new(
        store.clone(),
        defaults.clone(),
        geo_config.clone(),
        criteria.clone(),
    ));
    let route_cache = Arc::new(RouteCache::new(store.clone(), defaults.route_cache_ttl));
    let user_profile = Arc::new(UserProfileStore::new(
        store.clone(),
        defaults.user_context_ttl,
        vec!["anonymous".to_string()],
    ));
    let static_numbers = Arc::new(StaticNumberMap::new(store.clone()));
    let admin = Arc::new(AdminService::new(pool_engine.clone(), None));
    let catalog: Arc<dyn CatalogReader> = Arc::new(MemoryCatalog::new());

    AppState {
        pool_engine,
        route_cache,
        user_profile,
        static_numbers,
        admin,
        catalog,
        criteria,
        geo_config,
        identity_config: Arc::new(Identity::default()),
        store_config: Arc::new(numpool::config::Store {
            url: "memory://test".to_string(),
            connect_retries: 1,
            connect_retry_pause: Duration::from_secs(0),
            pool_size: 1,
        }),
        admin_key: Arc::new(ADMIN_KEY.to_string()),
        admin_debug: false,
    }
}

async fn send(router: axum::Router, req: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json, headers)
}

fn json_post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn ok_health_check() {
    let router = build_router(build_state());
    let req = Request::builder().uri("/ok").body(Body::empty()).unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn page_mints_identifiers_and_sets_cookies() {
    let router = build_router(build_state());
    let body = json!({
        "type": "page",
        "properties": { "url": "https://example.com/" },
    });
    let (status, payload, headers) = send(router, json_post("/page", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], json!("success"));
    assert!(payload["sid"]["id"].is_string());
    assert!(payload["cid"]["id"].is_string());

    let set_cookie_count = headers.get_all(axum::http::header::SET_COOKIE).iter().count();
    assert_eq!(set_cookie_count, 2, "expected sid + cid Set-Cookie headers, no pool opt-in");
}

#[tokio::test]
async fn number_pool_without_sid_cookie_is_no_sid() {
    let router = build_router(build_state());
    let body = json!({ "pool_id": 1 });
    let (_status, payload, _headers) = send(router, json_post("/number_pool", body)).await;
    assert_eq!(payload["status"], json!("error"));
    assert_eq!(payload["error"], json!("no_sid"));
}

#[tokio::test]
async fn static_number_context_round_trips_through_admin_key() {
    let router = build_router(build_state());

    let set_body = json!({
        "key": ADMIN_KEY,
        "number": "5551112222",
        "contexts": [{"business": "acme"}, {"campaign": "spring"}],
    });
    let (status, payload, _headers) = send(router.clone(), json_post("/set_static_number_contexts", set_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["context"]["business"], json!("acme"));
    assert_eq!(payload["context"]["campaign"], json!("spring"));

    let req = Request::builder()
        .uri("/get_static_number_context?number=5551112222")
        .body(Body::empty())
        .unwrap();
    let (status, payload, _headers) = send(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["context"]["business"], json!("acme"));
}

#[tokio::test]
async fn set_static_number_contexts_rejects_bad_admin_key() {
    let router = build_router(build_state());
    let body = json!({ "key": "wrong", "number": "5551112222", "contexts": [] });
    let (status, payload, _headers) = send(router, json_post("/set_static_number_contexts", body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"], json!("forbidden"));
}

#[tokio::test]
async fn track_call_falls_back_to_static_number_context() {
    let router = build_router(build_state());

    // Static numbers are keyed post-normalization (spec §4.4 strips a
    // leading `+1` from `call_to` before any lookup).
    let set_body = json!({
        "key": ADMIN_KEY,
        "number": "5551112222",
        "contexts": [{"business": "acme"}],
    });
    send(router.clone(), json_post("/set_static_number_contexts", set_body)).await;

    let track_body = json!({
        "call_id": "call-1",
        "call_from": "+15559998888",
        "call_to": "+15551112222",
    });
    let (status, payload, _headers) = send(router, json_post("/track_call", track_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], json!("success"));
    assert_eq!(payload["context"]["business"], json!("acme"));
}

#[tokio::test]
async fn init_and_stats_admin_routes_round_trip() {
    let router = build_router(build_state());

    let req = Request::builder()
        .uri(format!("/init_number_pools?key={ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let (status, payload, _headers) = send(router.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], json!("success"));

    let req = Request::builder()
        .uri(format!("/number_pool_stats?key={ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let (status, payload, _headers) = send(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], json!("success"));
}

#[tokio::test]
async fn user_context_requires_admin_key() {
    let router = build_router(build_state());
    let req = Request::builder()
        .uri("/get_user_context?user_id=+15551234567&id_type=phone")
        .body(Body::empty())
        .unwrap();
    let (status, payload, _headers) = send(router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"], json!("forbidden"));
}
