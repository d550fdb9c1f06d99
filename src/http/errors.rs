//! HTTP-facing error envelope. Translates `PoolError`/`IdentityError`/
//! catalog failures into the `{status: "error", msg, error}` shape spec.md
//! §7 prescribes, following `xulek-RustSocks`'s `utils::error::RustSocksError`
//! pattern of one boundary-level enum with a dedicated response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::catalog::CatalogError;
use crate::errors::IdentityError;
use crate::pool::errors::PoolError;

#[derive(Debug)]
pub enum ApiError {
    Pool(PoolError),
    NoSid,
    Forbidden,
    PoolCookieExpired,
    BadRequest(String),
    Internal(String),
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        ApiError::Pool(e)
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            ApiError::Pool(e) => (StatusCode::OK, e.error_code(), e.to_string()),
            ApiError::NoSid => (StatusCode::OK, "no_sid", "no resolvable session id".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "forbidden".to_string()),
            ApiError::PoolCookieExpired => (StatusCode::OK, "expired", "pool cookie expired".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::OK, "internal_error", msg.clone()),
        };
        (
            status,
            Json(json!({ "status": "error", "error": code, "msg": msg })),
        )
            .into_response()
    }
}
