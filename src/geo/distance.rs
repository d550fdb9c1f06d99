//! Haversine great-circle distance between a caller's zip centroid and a
//! callee's area-code centroid (spec.md §4.4 steps 4/8). Not present in the
//! retrieved original source (`app/geo.py` was missing from the pack); this
//! is the documented stand-in (see DESIGN.md).

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Distance in miles between two lat/lon points.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(haversine_miles(40.0, -73.0, 40.0, -73.0), 0.0);
    }

    #[test]
    fn nyc_to_la_is_roughly_2450_miles() {
        let d = haversine_miles(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((2400.0..2500.0).contains(&d), "unexpected distance: {d}");
    }
}
