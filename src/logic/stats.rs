//! Global and per-batch running statistics.
//!
//! `GlobalStats` spans the process lifetime and is extended on every batch;
//! `BatchStats` are immutable once a later batch completes. Cutoffs are
//! recomputed over the complete current population at each finalize - this
//! is intentional, not an incremental-update candidate (the cutoff is
//! defined relative to the lifetime totals).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::logic::distribution;
use crate::logic::profile::AsProfileStore;

/// Lifetime totals and derived thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_flow_count: u64,
    pub total_bytes: u64,

    /// Lifetime bytes / lifetime flows. `None` until the first flow lands.
    pub avg_bytes_per_flow: Option<f64>,

    /// Sorted lifetime flow counts per AS, as of the last recomputation.
    pub flow_count_distribution: Vec<f64>,

    /// Sorted lifetime byte totals per AS, as of the last recomputation.
    pub byte_volume_distribution: Vec<f64>,

    /// Flow volume below this is statistically insignificant.
    pub flow_cutoff: f64,

    /// Byte volume below this is statistically insignificant.
    pub byte_cutoff: f64,
}

impl GlobalStats {
    /// Fold one ingested record into the lifetime totals.
    pub fn record_flow(&mut self, bytes: u64) {
        self.total_flow_count += 1;
        self.total_bytes += bytes;
    }

    /// Full recomputation of the derived fields over all known profiles.
    pub fn recompute(&mut self, profiles: &AsProfileStore, flow_factor: f64, bytes_factor: f64) {
        self.avg_bytes_per_flow = if self.total_flow_count > 0 {
            Some(self.total_bytes as f64 / self.total_flow_count as f64)
        } else {
            None
        };

        self.flow_count_distribution = profiles.flow_count_distribution();
        self.byte_volume_distribution = profiles.byte_volume_distribution();

        self.flow_cutoff = self.total_flow_count as f64 * flow_factor;
        self.byte_cutoff = self.total_bytes as f64 * bytes_factor;
    }
}

/// Totals for one processed batch, keyed by batch id in the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_flow_count: u64,
    pub total_bytes: u64,
    pub avg_bytes_per_flow: Option<f64>,

    /// Mean of per-record trust lookups made while ingesting the batch.
    /// `None` when no lookup produced a usable score.
    pub avg_trust_metric: Option<f64>,

    /// Modification time of the batch file, seconds since the epoch.
    pub file_age: i64,

    pub processed_at: DateTime<Utc>,
}

impl BatchStats {
    pub fn new(file_age: i64) -> Self {
        Self {
            file_age,
            processed_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn record_flow(&mut self, bytes: u64) {
        self.total_flow_count += 1;
        self.total_bytes += bytes;
    }

    /// Derive the batch averages, guarding both zero denominators.
    pub fn finalize(&mut self, trust_sum: f64, trust_lookups: u64) {
        self.avg_bytes_per_flow = if self.total_flow_count > 0 {
            Some(self.total_bytes as f64 / self.total_flow_count as f64)
        } else {
            None
        };
        self.avg_trust_metric = if trust_lookups > 0 {
            Some(trust_sum / trust_lookups as f64)
        } else {
            None
        };
    }
}

/// Cross-batch byte-rate baseline: population stddev and mean over every
/// batch's avg_bytes_per_flow. This is what the scorer treats as "normal".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDistribution {
    pub std_dev_bytes_per_flow: Option<f64>,
    pub std_dev_bytes_per_flow_avg: Option<f64>,
}

impl BatchDistribution {
    /// Both halves present, or nothing.
    pub fn baseline(&self) -> Option<(f64, f64)> {
        match (self.std_dev_bytes_per_flow, self.std_dev_bytes_per_flow_avg) {
            (Some(sd), Some(mean)) => Some((sd, mean)),
            _ => None,
        }
    }
}

/// All batches processed so far, plus the derived baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchHistory {
    pub batches: HashMap<String, BatchStats>,
    pub distribution: BatchDistribution,
}

impl BatchHistory {
    pub fn contains(&self, batch_id: &str) -> bool {
        self.batches.contains_key(batch_id)
    }

    pub fn insert(&mut self, batch_id: String, stats: BatchStats) {
        self.batches.insert(batch_id, stats);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Recompute the cross-batch baseline over all batches that produced an
    /// average (empty batches contribute nothing).
    pub fn recompute_distribution(&mut self) {
        let values: Vec<f64> = self
            .batches
            .values()
            .filter_map(|b| b.avg_bytes_per_flow)
            .collect();

        match distribution::std_dev(&values) {
            Some((sd, mean)) => {
                self.distribution.std_dev_bytes_per_flow = Some(sd);
                self.distribution.std_dev_bytes_per_flow_avg = Some(mean);
            }
            None => {
                self.distribution.std_dev_bytes_per_flow = None;
                self.distribution.std_dev_bytes_per_flow_avg = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoFact;

    fn seeded_profiles() -> AsProfileStore {
        let store = AsProfileStore::new();
        for (id, flows, bytes) in [("AS1", 10u64, 100u64), ("AS2", 5, 50)] {
            store.get_or_create(id, || GeoFact::unknown_location(id.into(), "Org".into()));
            for _ in 0..flows {
                store.record_flow(id, bytes, 1.0);
            }
        }
        store
    }

    #[test]
    fn test_global_recompute() {
        let profiles = seeded_profiles();
        let mut global = GlobalStats::default();
        for _ in 0..10 {
            global.record_flow(100);
        }
        for _ in 0..5 {
            global.record_flow(50);
        }

        global.recompute(&profiles, 0.0005, 0.000005);

        assert_eq!(global.total_flow_count, 15);
        assert_eq!(global.total_bytes, 1250);
        assert_eq!(global.avg_bytes_per_flow, Some(1250.0 / 15.0));
        assert_eq!(global.flow_count_distribution, vec![5.0, 10.0]);
        assert_eq!(global.byte_volume_distribution, vec![250.0, 1000.0]);
        assert!((global.flow_cutoff - 15.0 * 0.0005).abs() < 1e-12);
        assert!((global.byte_cutoff - 1250.0 * 0.000005).abs() < 1e-12);
    }

    #[test]
    fn test_global_recompute_empty_is_defined() {
        let profiles = AsProfileStore::new();
        let mut global = GlobalStats::default();
        global.recompute(&profiles, 0.0005, 0.000005);

        assert_eq!(global.avg_bytes_per_flow, None);
        assert_eq!(global.flow_cutoff, 0.0);
    }

    #[test]
    fn test_batch_finalize_zero_guards() {
        let mut batch = BatchStats::new(0);
        batch.finalize(0.0, 0);
        assert_eq!(batch.avg_bytes_per_flow, None);
        assert_eq!(batch.avg_trust_metric, None);

        let mut batch = BatchStats::new(0);
        batch.record_flow(1000);
        batch.record_flow(3000);
        batch.finalize(30.0, 2);
        assert_eq!(batch.avg_bytes_per_flow, Some(2000.0));
        assert_eq!(batch.avg_trust_metric, Some(15.0));
    }

    #[test]
    fn test_batch_distribution_over_history() {
        let mut history = BatchHistory::default();

        // No batches -> no baseline, not a crash.
        history.recompute_distribution();
        assert_eq!(history.distribution.baseline(), None);

        for (id, avg) in [("a.csv", 1000.0), ("b.csv", 3000.0)] {
            let mut b = BatchStats::new(0);
            b.record_flow(avg as u64);
            b.finalize(0.0, 0);
            b.avg_bytes_per_flow = Some(avg);
            history.insert(id.to_string(), b);
        }
        history.recompute_distribution();

        let (sd, mean) = history.distribution.baseline().unwrap();
        assert_eq!(mean, 2000.0);
        assert_eq!(sd, 1000.0);
    }
}
