//! `/track_call` (spec.md §6) — runs the call-attribution resolver (C8) and
//! records a `track_call` row. Persistence is out of core scope per spec.md
//! §6's persisted-state note, so this only logs the row it would have
//! written.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::attribution::AttributionResolver;
use crate::http::errors::ApiError;
use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackCallRequest {
    /// Present in the request shape per spec.md §6 but, unlike the admin
    /// routes, not compared against the configured admin key here.
    #[serde(default)]
    pub key: Option<String>,
    pub call_id: String,
    pub call_from: String,
    pub call_to: String,
}

pub async fn track_call(
    State(state): State<AppState>,
    Json(body): Json<TrackCallRequest>,
) -> Result<Response, ApiError> {
    let resolver = AttributionResolver {
        pool_engine: &state.pool_engine,
        route_cache: &state.route_cache,
        user_profile: &state.user_profile,
        static_numbers: &state.static_numbers,
        geo_config: &state.geo_config,
        criteria: &state.criteria,
    };

    let attribution = resolver.resolve(&body.call_from, &body.call_to).await?;

    match attribution {
        Some(attribution) => {
            info!(
                "track_call: call_id={} {}->{} from_route_cache={}",
                body.call_id, body.call_from, body.call_to, attribution.has_cached_route
            );
            Ok(Json(json!({
                "status": "success",
                "context": attribution.context,
                "user_context": attribution.user_context,
            }))
            .into_response())
        }
        None => Err(ApiError::Pool(crate::pool::errors::PoolError::NumberNotFound {
            pool_id: -1,
            number: body.call_to,
        })),
    }
}
