//! Area-code selector configuration (C4).

use std::collections::HashSet;

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Geo {
    /// Path to the static criteria table (location id -> area codes/state).
    #[serde(default = "Geo::default_criteria_path")]
    pub criteria_path: String,
    /// Query-string parameter carrying the "physical location" id.
    #[serde(default = "Geo::default_loc_physical_param")]
    pub loc_physical_param: String,
    /// Query-string parameter carrying the "interest location" id.
    #[serde(default = "Geo::default_loc_interest_param")]
    pub loc_interest_param: String,
    /// Query-string parameter carrying the geo-mode (`gm=1|2|3`).
    #[serde(default = "Geo::default_gm_param")]
    pub gm_param: String,
    /// Query-string parameter identifying the traffic source.
    #[serde(default = "Geo::default_source_param")]
    pub source_param: String,
    /// Source values that get a `bing-` prefix applied to location ids.
    #[serde(default = "Geo::default_bing_sources")]
    pub bing_sources: HashSet<String>,
    /// JSON key under which a caller/pool profile's ZIP code is stored.
    #[serde(default = "Geo::default_zip_field")]
    pub zip_field: String,
}

impl Geo {
    fn default_criteria_path() -> String {
        "criteria_area_codes.json".to_string()
    }
    fn default_loc_physical_param() -> String {
        "loc_physical_ms".to_string()
    }
    fn default_loc_interest_param() -> String {
        "loc_interest_ms".to_string()
    }
    fn default_gm_param() -> String {
        "gm".to_string()
    }
    fn default_source_param() -> String {
        "s".to_string()
    }
    fn default_bing_sources() -> HashSet<String> {
        ["bing", "msft"].into_iter().map(String::from).collect()
    }
    fn default_zip_field() -> String {
        "zip".to_string()
    }
}

impl Default for Geo {
    fn default() -> Self {
        Geo {
            criteria_path: Self::default_criteria_path(),
            loc_physical_param: Self::default_loc_physical_param(),
            loc_interest_param: Self::default_loc_interest_param(),
            gm_param: Self::default_gm_param(),
            source_param: Self::default_source_param(),
            bing_sources: Self::default_bing_sources(),
            zip_field: Self::default_zip_field(),
        }
    }
}
