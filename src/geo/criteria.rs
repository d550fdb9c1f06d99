//! Area-code criteria table, loaded from the JSON file at
//! `config.geo.criteria_path`. Each entry is either:
//! - a zip-code centroid `{"zip": "...", "area_code": "...", "lat": .., "lon": ..}`,
//!   used by `geo::zip_area_code_distance_miles` (spec.md §4.4 steps 4/8), or
//! - a location-id entry `{"location_id": "...", "area_codes": [...], "state": "..."?}`,
//!   used by `geo::resolve_area_codes` (spec.md §4.3) to map the `loc_physical_ms`/
//!   `loc_interest_ms` query parameters straight to their preferred area codes.
//!
//! Both shapes can appear in the same array; an entry contributes to
//! whichever side(s) its fields populate.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaCodeCriteria {
    pub zip: String,
    pub area_code: String,
    pub lat: f64,
    pub lon: f64,
}

/// `(area_codes, state)` resolved for a single location id (spec.md §4.3
/// step 3).
#[derive(Debug, Clone, PartialEq)]
pub struct LocationAreaCodes {
    pub area_codes: Vec<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CriteriaEntry {
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    area_code: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    location_id: Option<String>,
    #[serde(default)]
    area_codes: Option<Vec<String>>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CriteriaTable {
    by_zip: HashMap<String, AreaCodeCriteria>,
    /// One centroid per area code, used by `zip_area_code_distance_miles`;
    /// the first zip seen for an area code wins.
    by_area_code: HashMap<String, (f64, f64)>,
    by_location_id: HashMap<String, LocationAreaCodes>,
}

impl CriteriaTable {
    fn from_raw_entries(entries: Vec<CriteriaEntry>) -> Self {
        let mut by_zip = HashMap::new();
        let mut by_area_code = HashMap::new();
        let mut by_location_id = HashMap::new();
        for entry in entries {
            if let (Some(zip), Some(area_code), Some(lat), Some(lon)) =
                (entry.zip.clone(), entry.area_code.clone(), entry.lat, entry.lon)
            {
                by_area_code.entry(area_code.clone()).or_insert((lat, lon));
                by_zip.insert(zip.clone(), AreaCodeCriteria { zip, area_code, lat, lon });
            }
            if let Some(location_id) = entry.location_id {
                by_location_id.insert(
                    location_id,
                    LocationAreaCodes {
                        area_codes: entry.area_codes.unwrap_or_default(),
                        state: entry.state,
                    },
                );
            }
        }
        CriteriaTable { by_zip, by_area_code, by_location_id }
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let entries: Vec<CriteriaEntry> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        Ok(Self::from_raw_entries(entries))
    }

    pub fn by_zip(&self, zip: &str) -> Option<&AreaCodeCriteria> {
        self.by_zip.get(zip)
    }

    pub fn area_code_centroid(&self, area_code: &str) -> Option<(f64, f64)> {
        self.by_area_code.get(area_code).copied()
    }

    pub fn by_location_id(&self, location_id: &str) -> Option<&LocationAreaCodes> {
        self.by_location_id.get(location_id)
    }

    /// A small built-in sample used for tests and as a fallback when the
    /// criteria file hasn't been loaded yet.
    pub fn embedded() -> Self {
        Self::from_raw_entries(vec![
            CriteriaEntry {
                zip: Some("10001".into()),
                area_code: Some("212".into()),
                lat: Some(40.7506),
                lon: Some(-73.9972),
                ..Default::default()
            },
            CriteriaEntry {
                zip: Some("90001".into()),
                area_code: Some("213".into()),
                lat: Some(33.9731),
                lon: Some(-118.2479),
                ..Default::default()
            },
            CriteriaEntry {
                zip: Some("60601".into()),
                area_code: Some("312".into()),
                lat: Some(41.8857),
                lon: Some(-87.6224),
                ..Default::default()
            },
            CriteriaEntry {
                zip: Some("02108".into()),
                area_code: Some("617".into()),
                lat: Some(42.3588),
                lon: Some(-71.0707),
                ..Default::default()
            },
            CriteriaEntry {
                location_id: Some("9002212".into()),
                area_codes: Some(vec!["401".into()]),
                state: Some("RI".into()),
                ..Default::default()
            },
            CriteriaEntry {
                location_id: Some("1018455".into()),
                area_codes: Some(vec!["339".into(), "781".into()]),
                state: Some("MA".into()),
                ..Default::default()
            },
            CriteriaEntry {
                location_id: Some("bing-1018455".into()),
                area_codes: Some(vec!["339".into(), "781".into()]),
                state: Some("MA".into()),
                ..Default::default()
            },
            CriteriaEntry {
                location_id: Some("9002299".into()),
                area_codes: Some(vec!["charlie-401".into()]),
                state: Some("RI".into()),
                ..Default::default()
            },
        ])
    }
}
