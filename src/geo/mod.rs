//! Area-Code Selector (C4) — resolves which area codes a request should
//! prefer, either from an explicit list or from the caller's geography.
//! Grounded on `original_source/.../api_v2/endpoints/zar.py`'s
//! `get_area_codes_from_context`, which branches on a `gm` ("geo mode")
//! request parameter and a `s` ("source") parameter distinguishing Bing
//! Maps-style geolocation from physical/interest location hints.

pub mod criteria;
pub mod distance;

use serde_json::Value;

use crate::config::Geo;
use crate::pool::types::LATEST_CONTEXT_KEY;

pub use criteria::{AreaCodeCriteria, CriteriaTable, LocationAreaCodes};

/// Extract `latest_context.url` from the request context (spec.md §4.3
/// step 1).
fn extract_url(context: &serde_json::Map<String, Value>) -> Option<&str> {
    context.get(LATEST_CONTEXT_KEY)?.get("url")?.as_str()
}

/// Parse a URL's query string into its parameters. Tolerates a bare query
/// string or a full URL, since `latest_context.url` is caller-supplied and
/// not necessarily absolute.
fn parse_query(url: &str) -> std::collections::HashMap<String, String> {
    let query = url.splitn(2, '?').nth(1).unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

/// Resolve the ordered list of area codes a request should prefer
/// (spec.md §4.3).
///
/// - An explicit `target_area_codes` argument always wins (caller asked for
///   specific codes).
/// - Otherwise, parse `loc_physical_ms`/`loc_interest_ms`/`gm`/the
///   configured source parameter out of `latest_context.url`'s query
///   string, prefixing location ids with `bing-` when the source is one of
///   `config.bing_sources`, and look each resolved id up directly in the
///   criteria table.
///
/// Returns `None` when nothing resolves, letting the caller fall back to
/// the pool's configured `fallback_area_code`.
pub fn resolve_area_codes(
    context: &serde_json::Map<String, Value>,
    target_area_codes: Option<Vec<String>>,
    config: &Geo,
    criteria: &CriteriaTable,
) -> Option<Vec<String>> {
    if let Some(codes) = target_area_codes.filter(|c| !c.is_empty()) {
        return Some(codes);
    }

    let url = extract_url(context)?;
    let params = parse_query(url);

    let bing_prefixed = params
        .get(&config.source_param)
        .map(|source| config.bing_sources.contains(&source.to_lowercase()))
        .unwrap_or(false);
    let location_id = |raw: &str| -> String {
        if bing_prefixed {
            format!("bing-{raw}")
        } else {
            raw.to_string()
        }
    };

    let physical = params
        .get(&config.loc_physical_param)
        .map(|id| location_id(id))
        .and_then(|id| criteria.by_location_id(&id));
    let interest = params
        .get(&config.loc_interest_param)
        .map(|id| location_id(id))
        .and_then(|id| criteria.by_location_id(&id));

    let chosen = match (physical, interest) {
        (Some(p), None) => Some(p),
        (None, Some(i)) => Some(i),
        (None, None) => None,
        (Some(p), Some(i)) => match params.get(&config.gm_param).map(String::as_str) {
            Some("2") => Some(p),
            Some("3") => Some(i),
            // gm=1 (default): physical if states differ or are missing,
            // otherwise interest.
            _ => {
                if p.state.is_some() && i.state.is_some() && p.state == i.state {
                    Some(i)
                } else {
                    Some(p)
                }
            }
        },
    };

    chosen.map(|entry| entry.area_codes.clone())
}

/// Distance in miles between a zip code's centroid and an area code's
/// centroid, both resolved from the criteria table. `None` if either side
/// doesn't resolve (mirrors the original's `if ... is not None` guard at
/// the call site rather than raising).
pub fn zip_area_code_distance_miles(zip: &str, area_code: &str, criteria: &CriteriaTable) -> Option<f64> {
    let zip_entry = criteria.by_zip(zip)?;
    let (ac_lat, ac_lon) = criteria.area_code_centroid(area_code)?;
    Some(distance::haversine_miles(zip_entry.lat, zip_entry.lon, ac_lat, ac_lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with_url(url: &str) -> serde_json::Map<String, Value> {
        let mut ctx = serde_json::Map::new();
        ctx.insert(LATEST_CONTEXT_KEY.to_string(), json!({ "url": url }));
        ctx
    }

    #[test]
    fn explicit_target_wins() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = serde_json::Map::new();
        let resolved = resolve_area_codes(&ctx, Some(vec!["212".into()]), &config, &criteria);
        assert_eq!(resolved, Some(vec!["212".to_string()]));
    }

    #[test]
    fn no_hint_resolves_to_none() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = serde_json::Map::new();
        assert_eq!(resolve_area_codes(&ctx, None, &config, &criteria), None);
    }

    #[test]
    fn physical_only_resolves_its_area_codes() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url("https://example.com/page?loc_physical_ms=9002212");
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["401".to_string()]));
    }

    #[test]
    fn interest_only_resolves_its_area_codes() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url("https://example.com/page?loc_interest_ms=1018455");
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["339".to_string(), "781".to_string()]));
    }

    #[test]
    fn bing_source_prefixes_location_id() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url("https://example.com/page?loc_physical_ms=1018455&s=bing");
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["339".to_string(), "781".to_string()]));
    }

    #[test]
    fn gm_default_prefers_physical_when_states_missing_or_differ() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        // Both resolve, but interest has no state entry distinct from physical
        // here; states differ (RI vs MA) so gm=1 picks physical.
        let ctx = ctx_with_url(
            "https://example.com/page?loc_physical_ms=9002212&loc_interest_ms=1018455",
        );
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["401".to_string()]));
    }

    #[test]
    fn gm_default_prefers_interest_when_states_match() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url(
            "https://example.com/page?loc_physical_ms=9002212&loc_interest_ms=9002299",
        );
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["charlie-401".to_string()]));
    }

    #[test]
    fn gm_2_forces_physical() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url(
            "https://example.com/page?loc_physical_ms=9002212&loc_interest_ms=1018455&gm=2",
        );
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["401".to_string()]));
    }

    #[test]
    fn gm_3_forces_interest() {
        let config = Geo::default();
        let criteria = CriteriaTable::embedded();
        let ctx = ctx_with_url(
            "https://example.com/page?loc_physical_ms=9002212&loc_interest_ms=1018455&gm=3",
        );
        let resolved = resolve_area_codes(&ctx, None, &config, &criteria);
        assert_eq!(resolved, Some(vec!["339".to_string(), "781".to_string()]));
    }
}
