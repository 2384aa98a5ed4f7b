//! Geolocation collaborator: AS-number and city lookups for source
//! addresses, plus great-circle distance from the home reference point.
//!
//! The two lookups fail independently: an AS without city data still gets a
//! profile, just with sentinel geography (distance 100, country "unknown").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::constants;

/// AS attribution for a source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnInfo {
    /// Stable AS key, e.g. "AS8075".
    pub as_id: String,
    pub org_name: String,
}

/// City-level location for a source address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityInfo {
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Geography attached to an AS profile at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFact {
    pub as_id: String,
    pub org_name: String,
    pub country_code: String,
    pub distance_miles: f64,
}

impl GeoFact {
    /// Fact for an AS whose city lookup failed.
    pub fn unknown_location(as_id: String, org_name: String) -> Self {
        Self {
            as_id,
            org_name,
            country_code: constants::UNKNOWN_COUNTRY.to_string(),
            distance_miles: constants::UNKNOWN_DISTANCE_MILES,
        }
    }
}

/// Seam to the external GeoIP databases. Each lookup is independently
/// fail-safe: `None` means "no data", never an abort.
pub trait GeoProvider {
    /// AS number and organisation for an address.
    fn asn(&self, addr: &str) -> Option<AsnInfo>;

    /// Country and coordinates for an address.
    fn city(&self, addr: &str) -> Option<CityInfo>;
}

/// Resolve the full geography for an AS's representative source address.
///
/// The AS attribution must already be known; only the city half may fail,
/// in which case the sentinel fact is returned.
pub fn resolve_fact(
    provider: &dyn GeoProvider,
    asn: &AsnInfo,
    addr: &str,
    home: (f64, f64),
) -> GeoFact {
    match provider.city(addr) {
        Some(city) => {
            let distance = haversine_miles(home, (city.latitude, city.longitude));
            GeoFact {
                as_id: asn.as_id.clone(),
                org_name: asn.org_name.clone(),
                country_code: city.country_code,
                distance_miles: distance.round(),
            }
        }
        None => {
            log::debug!("city lookup failed for {}, using sentinel geography", addr);
            GeoFact::unknown_location(asn.as_id.clone(), asn.org_name.clone())
        }
    }
}

/// Great-circle distance between two (lat, lon) points in miles.
pub fn haversine_miles(a: (f64, f64), b: (f64, f64)) -> f64 {
    const EARTH_RADIUS_MILES: f64 = 3958.8;

    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

// ============================================================================
// TABLE-BACKED PROVIDER
// ============================================================================

/// One row of an exported lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTableEntry {
    pub asn: Option<AsnInfo>,
    pub city: Option<CityInfo>,
}

/// Provider backed by a JSON table keyed by exact source address. Stands in
/// for a live GeoIP database; anything absent from the table is a lookup
/// failure.
#[derive(Debug, Default)]
pub struct TableGeoProvider {
    entries: HashMap<String, GeoTableEntry>,
}

impl TableGeoProvider {
    pub fn new(entries: HashMap<String, GeoTableEntry>) -> Self {
        Self { entries }
    }

    /// Load a table from a JSON file of `{addr: {asn, city}}` entries.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let entries: HashMap<String, GeoTableEntry> = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        log::info!("Loaded geo table with {} addresses", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoProvider for TableGeoProvider {
    fn asn(&self, addr: &str) -> Option<AsnInfo> {
        self.entries.get(addr).and_then(|e| e.asn.clone())
    }

    fn city(&self, addr: &str) -> Option<CityInfo> {
        self.entries.get(addr).and_then(|e| e.city.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asn(id: &str) -> AsnInfo {
        AsnInfo {
            as_id: id.to_string(),
            org_name: "Test Org".to_string(),
        }
    }

    #[test]
    fn test_haversine_zero_distance() {
        let home = (constants::HOME_LATITUDE, constants::HOME_LONGITUDE);
        assert!(haversine_miles(home, home) < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Milton Keynes to New York is roughly 3,470 miles.
        let home = (52.0175, -0.7896);
        let nyc = (40.7128, -74.0060);
        let d = haversine_miles(home, nyc);
        assert!(d > 3300.0 && d < 3600.0, "got {}", d);
    }

    #[test]
    fn test_resolve_fact_sentinel_on_city_failure() {
        let provider = TableGeoProvider::default();
        let fact = resolve_fact(&provider, &asn("AS100"), "10.0.0.1", (52.0, -0.7));

        assert_eq!(fact.as_id, "AS100");
        assert_eq!(fact.country_code, constants::UNKNOWN_COUNTRY);
        assert_eq!(fact.distance_miles, constants::UNKNOWN_DISTANCE_MILES);
    }

    #[test]
    fn test_table_provider_independent_lookups() {
        let mut entries = HashMap::new();
        entries.insert(
            "1.2.3.4".to_string(),
            GeoTableEntry {
                asn: Some(asn("AS200")),
                city: None,
            },
        );
        let provider = TableGeoProvider::new(entries);

        // ASN resolves, city does not: the two halves fail independently.
        assert!(provider.asn("1.2.3.4").is_some());
        assert!(provider.city("1.2.3.4").is_none());
        assert!(provider.asn("5.6.7.8").is_none());
    }
}
