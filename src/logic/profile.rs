//! AS profile store - one accumulating profile per Autonomous System.
//!
//! Profiles are created lazily on the first flow attributed to an AS and are
//! never deleted within a process lifetime. Raw sums are always retained;
//! averages are derived after every update, so a profile can never hold an
//! average inconsistent with its own counters.

use parking_lot::RwLock;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;

use crate::constants;
use crate::geo::GeoFact;

/// Accumulated per-AS state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AsProfile {
    // Fixed at creation
    pub country_code: String,
    pub org_name: String,
    pub distance_miles: f64,

    // Monotonic counters
    pub total_flow_count: u64,
    pub total_bytes: u64,
    pub total_packet_rate: f64,

    // Derived, recomputed after every update
    pub avg_bytes_per_flow: f64,
    pub avg_packet_rate: f64,
}

impl AsProfile {
    fn new(fact: &GeoFact) -> Self {
        Self {
            country_code: fact.country_code.clone(),
            org_name: fact.org_name.clone(),
            distance_miles: fact.distance_miles,
            total_flow_count: 0,
            total_bytes: 0,
            total_packet_rate: 0.0,
            avg_bytes_per_flow: 0.0,
            avg_packet_rate: 0.0,
        }
    }

    /// Fold one flow into the counters and refresh the derived averages.
    fn record(&mut self, bytes: u64, packet_rate: f64) {
        self.total_flow_count += 1;
        self.total_bytes += bytes;
        self.total_packet_rate +=
            constants::round_to(packet_rate, constants::PACKET_RATE_PRECISION);

        let count = self.total_flow_count as f64;
        self.avg_bytes_per_flow = self.total_bytes as f64 / count;
        self.avg_packet_rate = self.total_packet_rate / count;
    }
}

/// Map of AS id to profile.
///
/// The map is guarded so that an implementation running geolocation lookups
/// on worker threads still gets exactly one profile per AS: creation goes
/// through a single write acquisition, and a second `get_or_create` for the
/// same id returns the existing profile unchanged.
#[derive(Debug, Default)]
pub struct AsProfileStore {
    inner: RwLock<HashMap<String, AsProfile>>,
}

impl AsProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known ASes.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn contains(&self, as_id: &str) -> bool {
        self.inner.read().contains_key(as_id)
    }

    /// Snapshot of one profile.
    pub fn get(&self, as_id: &str) -> Option<AsProfile> {
        self.inner.read().get(as_id).cloned()
    }

    /// All AS ids currently known, sorted.
    pub fn as_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Create the profile for `as_id` if unseen, resolving geography through
    /// `fact`. Idempotent: an existing profile is returned unchanged and the
    /// supplied fact is ignored.
    pub fn get_or_create(&self, as_id: &str, fact: impl FnOnce() -> GeoFact) -> AsProfile {
        if let Some(existing) = self.inner.read().get(as_id) {
            return existing.clone();
        }

        let fact = fact();
        let mut map = self.inner.write();
        // A concurrent creator may have won the race between the read above
        // and this write acquisition.
        map.entry(as_id.to_string())
            .or_insert_with(|| {
                log::info!(
                    "new AS profile {} ({}) country={} distance={}mi",
                    as_id,
                    fact.org_name,
                    fact.country_code,
                    fact.distance_miles
                );
                AsProfile::new(&fact)
            })
            .clone()
    }

    /// Fold one flow into the profile for `as_id`. The profile must already
    /// exist (creation is always attempted first by the batch processor);
    /// an unknown id is a dropped flow, never a corrupted counter.
    pub fn record_flow(&self, as_id: &str, bytes: u64, packet_rate: f64) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(as_id) {
            Some(profile) => {
                profile.record(bytes, packet_rate);
                true
            }
            None => {
                log::warn!("record_flow for unknown AS {}, flow dropped", as_id);
                false
            }
        }
    }

    /// Sorted lifetime flow counts across all profiles.
    pub fn flow_count_distribution(&self) -> Vec<f64> {
        let map = self.inner.read();
        let mut out: Vec<f64> = map.values().map(|p| p.total_flow_count as f64).collect();
        out.sort_by(|a, b| a.total_cmp(b));
        out
    }

    /// Sorted lifetime byte totals across all profiles.
    pub fn byte_volume_distribution(&self) -> Vec<f64> {
        let map = self.inner.read();
        let mut out: Vec<f64> = map.values().map(|p| p.total_bytes as f64).collect();
        out.sort_by(|a, b| a.total_cmp(b));
        out
    }
}

// Serialized as the bare map; the lock is a process-lifetime construct.
impl Serialize for AsProfileStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AsProfileStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = HashMap::<String, AsProfile>::deserialize(deserializer)?;
        Ok(Self {
            inner: RwLock::new(map),
        })
    }
}

impl PartialEq for AsProfileStore {
    fn eq(&self, other: &Self) -> bool {
        *self.inner.read() == *other.inner.read()
    }
}
