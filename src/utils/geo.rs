//! Great-circle distances and a coarse country-centroid lookup.
//!
//! Transactions usually carry only a country, so travel checks fall back to
//! the approximate geographic centre of that country.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

// (ISO alpha-2, English name, latitude, longitude)
const CENTROIDS: &[(&str, &str, f64, f64)] = &[
    ("US", "United States", 39.8, -98.6),
    ("CA", "Canada", 56.1, -106.3),
    ("MX", "Mexico", 23.6, -102.6),
    ("BR", "Brazil", -14.2, -51.9),
    ("AR", "Argentina", -38.4, -63.6),
    ("CL", "Chile", -35.7, -71.5),
    ("CO", "Colombia", 4.6, -74.3),
    ("PE", "Peru", -9.2, -75.0),
    ("GB", "United Kingdom", 54.0, -2.0),
    ("IE", "Ireland", 53.4, -8.2),
    ("FR", "France", 46.2, 2.2),
    ("DE", "Germany", 51.2, 10.5),
    ("ES", "Spain", 40.5, -3.7),
    ("PT", "Portugal", 39.4, -8.2),
    ("IT", "Italy", 41.9, 12.6),
    ("NL", "Netherlands", 52.1, 5.3),
    ("BE", "Belgium", 50.5, 4.5),
    ("CH", "Switzerland", 46.8, 8.2),
    ("AT", "Austria", 47.5, 14.6),
    ("SE", "Sweden", 60.1, 18.6),
    ("NO", "Norway", 60.5, 8.5),
    ("DK", "Denmark", 56.3, 9.5),
    ("FI", "Finland", 61.9, 25.7),
    ("PL", "Poland", 51.9, 19.1),
    ("UA", "Ukraine", 48.4, 31.2),
    ("RU", "Russia", 61.5, 105.3),
    ("TR", "Turkey", 38.9, 35.2),
    ("GR", "Greece", 39.1, 21.8),
    ("RO", "Romania", 45.9, 25.0),
    ("IL", "Israel", 31.0, 34.9),
    ("AE", "United Arab Emirates", 23.4, 53.8),
    ("SA", "Saudi Arabia", 23.9, 45.1),
    ("EG", "Egypt", 26.8, 30.8),
    ("NG", "Nigeria", 9.1, 8.7),
    ("KE", "Kenya", -0.0, 37.9),
    ("ZA", "South Africa", -30.6, 22.9),
    ("IN", "India", 20.6, 79.0),
    ("PK", "Pakistan", 30.4, 69.3),
    ("CN", "China", 35.9, 104.2),
    ("HK", "Hong Kong", 22.3, 114.2),
    ("JP", "Japan", 36.2, 138.3),
    ("KR", "South Korea", 35.9, 127.8),
    ("SG", "Singapore", 1.35, 103.8),
    ("TH", "Thailand", 15.9, 100.99),
    ("VN", "Vietnam", 14.1, 108.3),
    ("PH", "Philippines", 12.9, 121.8),
    ("ID", "Indonesia", -0.8, 113.9),
    ("MY", "Malaysia", 4.2, 101.98),
    ("AU", "Australia", -25.3, 133.8),
    ("NZ", "New Zealand", -40.9, 174.9),
];

/// Approximate centre of a country given its ISO alpha-2 code or English name.
pub fn country_centroid(country: &str) -> Option<GeoPoint> {
    let needle = country.trim();
    if needle.is_empty() {
        return None;
    }
    CENTROIDS
        .iter()
        .find(|(code, name, _, _)| {
            code.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle)
        })
        .map(|(_, _, lat, lon)| GeoPoint::new(*lat, *lon))
}

/// Canonical form used when comparing countries: the ISO code when known.
pub fn normalize_country(country: &str) -> String {
    let needle = country.trim();
    CENTROIDS
        .iter()
        .find(|(code, name, _, _)| {
            code.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle)
        })
        .map(|(code, _, _, _)| code.to_string())
        .unwrap_or_else(|| needle.to_ascii_uppercase())
}
