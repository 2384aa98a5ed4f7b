//! Batch processor: drives one batch from ingestion through finalization,
//! and the run loop that works through every eligible batch in age order.
//!
//! Batches are strictly sequential - batch N+1's scoring baseline (batch
//! distribution, global cutoffs) depends on the fully finalized state of
//! batch N. Within a batch there are two phases: ingesting (per-record
//! mutation of profiles, counters and the report) and finalizing (derive
//! averages, full distribution recomputation, persist). A record that fails
//! parsing or AS attribution is skipped without aborting the batch.

use std::path::Path;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geo::{self, GeoProvider};
use crate::ingest::{self, BatchFile, FlowRecord};
use crate::logic::distribution;
use crate::logic::profile::AsProfile;
use crate::logic::report::TrustReport;
use crate::logic::scoring;
use crate::logic::stats::BatchStats;
use crate::persist::{self, EngineState};

/// Outcome of one `run()` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub batches_processed: u64,
    pub flows_ingested: u64,
    pub records_skipped: u64,
}

/// Snapshot view of the global statistics for reporting.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatsSummary {
    pub total_flow_count: u64,
    pub total_bytes: u64,
    pub avg_bytes_per_flow: Option<f64>,
    pub flow_cutoff: f64,
    pub byte_cutoff: f64,
    pub as_count: usize,
    pub batch_count: usize,
    pub coverage_mins: u64,
    pub byte_volume_p50: Option<f64>,
    pub byte_volume_p90: Option<f64>,
}

/// Running trust accumulator for the batch being ingested.
#[derive(Debug, Default)]
struct BatchTrust {
    sum: f64,
    lookups: u64,
}

/// The long-lived engine: configuration, the geolocation seam, the persisted
/// aggregate state and the current batch's report.
pub struct TrustEngine<G: GeoProvider> {
    config: EngineConfig,
    geo: G,
    state: EngineState,
    report: TrustReport,
}

impl<G: GeoProvider> TrustEngine<G> {
    /// Load the persisted state and build the engine. A missing state file
    /// starts fresh; an unreadable one is fatal.
    pub fn open(config: EngineConfig, geo: G) -> Result<Self, EngineError> {
        let state = persist::load(&config.state_path)?;
        Ok(Self::with_state(config, geo, state))
    }

    pub fn with_state(config: EngineConfig, geo: G, state: EngineState) -> Self {
        Self {
            config,
            geo,
            state,
            report: TrustReport::new(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Report for the most recently processed batch.
    pub fn report(&self) -> &TrustReport {
        &self.report
    }

    pub fn profile(&self, as_id: &str) -> Option<AsProfile> {
        self.state.profiles.get(as_id)
    }

    /// Process every eligible batch oldest-first, then refresh the trust
    /// cache with a full scoring pass over all known ASes.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::default();

        loop {
            let batch = match ingest::next_batch(&self.config.netflow_dir, &self.state.history)? {
                Some(batch) => batch,
                None => break,
            };

            match self.process_batch(&batch) {
                Ok((ingested, skipped)) => {
                    summary.batches_processed += 1;
                    summary.flows_ingested += ingested;
                    summary.records_skipped += skipped;
                }
                Err(e @ EngineError::BatchOpen { .. }) => {
                    // The batch is recorded as attempted so selection moves
                    // on; an unopenable file is not retried.
                    log::warn!("batch {} not started: {}", batch.id, e);
                    self.state
                        .history
                        .insert(batch.id.clone(), BatchStats::new(batch.age));
                    persist::save(&self.config.state_path, &self.state)?;
                }
                Err(e) => return Err(e),
            }
        }

        self.refresh_trust();
        persist::save(&self.config.state_path, &self.state)?;

        log::info!(
            "run complete: {} batches, {} flows ingested, {} records skipped",
            summary.batches_processed,
            summary.flows_ingested,
            summary.records_skipped
        );
        Ok(summary)
    }

    /// Ingest and finalize one batch. Returns (ingested, skipped) counts.
    pub fn process_batch(&mut self, batch: &BatchFile) -> Result<(u64, u64), EngineError> {
        log::info!("loading batch {}", batch.path.display());
        let (field_map, rows) = ingest::read_batch(batch)?;

        // Scores consulted while ingesting must reflect the finalized state
        // of every prior batch, so rebuild the cache before the first record.
        self.refresh_trust();

        // The report belongs to this batch alone.
        self.report = TrustReport::new();
        let mut stats = BatchStats::new(batch.age);
        let mut trust = BatchTrust::default();
        let mut skipped = 0u64;

        for row in &rows {
            match field_map.parse_row(row) {
                Ok(record) => {
                    if !self.ingest_record(record, &mut stats, &mut trust) {
                        skipped += 1;
                    }
                }
                Err(e) => {
                    log::debug!("skipping row in {}: {}", batch.id, e);
                    skipped += 1;
                }
            }
        }

        let ingested = stats.total_flow_count;
        self.finalize_batch(batch.id.clone(), stats, trust)?;

        log::info!(
            "batch {} done: {} flows ingested, {} skipped",
            batch.id,
            ingested,
            skipped
        );
        Ok((ingested, skipped))
    }

    /// Fold one typed record into profiles, counters and the report.
    /// Returns false when the record had to be dropped (AS attribution
    /// failed); existing state is never corrupted by a dropped record.
    fn ingest_record(
        &mut self,
        mut record: FlowRecord,
        stats: &mut BatchStats,
        trust: &mut BatchTrust,
    ) -> bool {
        // Outbound analysis: when the source matches the local filter, the
        // interesting party is the destination - re-key on it.
        if !self.config.source_filter.is_empty()
            && record.source_address.contains(&self.config.source_filter)
        {
            record.source_address = record.destination_address.clone();
        }

        let asn = match self.geo.asn(&record.source_address) {
            Some(asn) => asn,
            None => {
                log::debug!("no AS attribution for {}, record dropped", record.source_address);
                return false;
            }
        };

        self.state.profiles.get_or_create(&asn.as_id, || {
            geo::resolve_fact(&self.geo, &asn, &record.source_address, self.config.home_point)
        });
        self.state
            .profiles
            .record_flow(&asn.as_id, record.bytes_in_volume, record.packets_in_rate);

        // Trust lookup for the batch's running average: cached metric from
        // the pass at the start of this batch, or computed on demand for an
        // AS first seen mid-batch.
        let record_trust = self
            .state
            .trust
            .get(&asn.as_id)
            .copied()
            .or_else(|| self.score(&asn.as_id));
        if let Some(t) = record_trust {
            trust.sum += t;
            trust.lookups += 1;
        }

        self.state.global.record_flow(record.bytes_in_volume);
        stats.record_flow(record.bytes_in_volume);
        self.report.record(&record, record_trust);
        true
    }

    /// Derive batch averages, recompute the global distributions and cutoffs
    /// over the complete current population, refresh the cross-batch
    /// baseline, and persist. Recomputation is deliberately full, not
    /// incremental: the cutoffs are defined against lifetime totals.
    fn finalize_batch(
        &mut self,
        batch_id: String,
        mut stats: BatchStats,
        trust: BatchTrust,
    ) -> Result<(), EngineError> {
        stats.finalize(trust.sum, trust.lookups);
        self.state.history.insert(batch_id, stats);

        self.state.global.recompute(
            &self.state.profiles,
            self.config.flow_cutoff_factor,
            self.config.bytes_cutoff_factor,
        );
        self.state.history.recompute_distribution();

        persist::save(&self.config.state_path, &self.state)
    }

    /// Trust metric for one AS from current state. `None` when unavailable.
    pub fn score(&self, as_id: &str) -> Option<f64> {
        let profile = self.state.profiles.get(as_id)?;
        scoring::score(
            as_id,
            &profile,
            &self.state.global,
            &self.state.history.distribution,
        )
    }

    /// Full scoring pass over every known AS, rebuilding the trust cache
    /// consulted during ingestion. Runs at the start of every batch and
    /// once more when the run exhausts its batches.
    pub fn refresh_trust(&mut self) {
        self.state.trust.clear();
        for as_id in self.state.profiles.as_ids() {
            if let Some(metric) = self.score(&as_id) {
                self.state.trust.insert(as_id, metric);
            }
        }
        log::debug!("trust cache refreshed for {} ASes", self.state.trust.len());
    }

    /// Sources from the last processed batch whose snapshot trust exceeds
    /// the configured report threshold, worst first.
    pub fn flagged_sources(&self) -> Vec<(String, f64)> {
        self.report
            .low_trust_sources(self.config.report_trust_threshold)
    }

    /// Cached trust metrics, worst first.
    pub fn trust_ranking(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> =
            self.state.trust.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Global statistics snapshot with percentile markers.
    pub fn stats_summary(&self) -> StatsSummary {
        let global = &self.state.global;
        StatsSummary {
            total_flow_count: global.total_flow_count,
            total_bytes: global.total_bytes,
            avg_bytes_per_flow: global.avg_bytes_per_flow,
            flow_cutoff: global.flow_cutoff,
            byte_cutoff: global.byte_cutoff,
            as_count: self.state.profiles.len(),
            batch_count: self.state.history.len(),
            coverage_mins: self.state.history.len() as u64 * crate::constants::BATCH_INTERVAL_MINS,
            byte_volume_p50: distribution::percentile(&global.byte_volume_distribution, 0.5),
            byte_volume_p90: distribution::percentile(&global.byte_volume_distribution, 0.9),
        }
    }

    /// Persist the current state explicitly (the run loop already saves
    /// after every finalize).
    pub fn save(&self) -> Result<(), EngineError> {
        persist::save(&self.config.state_path, &self.state)
    }

    pub fn geo(&self) -> &G {
        &self.geo
    }

    pub fn config_netflow_dir(&self) -> &Path {
        &self.config.netflow_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{AsnInfo, CityInfo, GeoTableEntry, TableGeoProvider};
    use std::collections::HashMap;
    use std::fs;

    const HEADER: &str = "Protocol,SourceAddress,SourcePort,DestinationAddress,\
         DestinationPort,BytesInVolume,BytesInRatePerDuration,FlowDuration,\
         PacketsInRatePerDuration";

    fn provider() -> TableGeoProvider {
        let mut entries = HashMap::new();
        for (addr, as_id, lat, lon) in [
            ("81.2.69.160", "AS100", 51.5, -0.1),
            ("81.2.69.161", "AS100", 51.5, -0.1),
            ("203.0.113.5", "AS200", -33.8, 151.2),
        ] {
            entries.insert(
                addr.to_string(),
                GeoTableEntry {
                    asn: Some(AsnInfo {
                        as_id: as_id.to_string(),
                        org_name: format!("{} Org", as_id),
                    }),
                    city: Some(CityInfo {
                        country_code: "XX".to_string(),
                        latitude: lat,
                        longitude: lon,
                    }),
                },
            );
        }
        // An address with AS attribution but no city data.
        entries.insert(
            "198.51.100.9".to_string(),
            GeoTableEntry {
                asn: Some(AsnInfo {
                    as_id: "AS300".to_string(),
                    org_name: "AS300 Org".to_string(),
                }),
                city: None,
            },
        );
        TableGeoProvider::new(entries)
    }

    fn engine(dir: &Path) -> TrustEngine<TableGeoProvider> {
        let config = EngineConfig {
            netflow_dir: dir.join("netflow"),
            state_path: dir.join("state.json"),
            ..Default::default()
        };
        fs::create_dir_all(&config.netflow_dir).unwrap();
        TrustEngine::with_state(config, provider(), EngineState::default())
    }

    fn write_batch(engine: &TrustEngine<TableGeoProvider>, name: &str, rows: &[&str]) {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        fs::write(engine.config_netflow_dir().join(name), content).unwrap();
    }

    #[test]
    fn test_three_record_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &[
                "6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0",
                "6,81.2.69.160,1001,9.9.9.9,443,2000,1.0,60,2.0",
                "6,81.2.69.161,1002,9.9.9.9,443,3000,1.0,60,2.0",
            ],
        );

        let summary = engine.run().unwrap();
        assert_eq!(summary.batches_processed, 1);
        assert_eq!(summary.flows_ingested, 3);
        assert_eq!(summary.records_skipped, 0);

        let p = engine.profile("AS100").unwrap();
        assert_eq!(p.total_bytes, 6000);
        assert_eq!(p.total_flow_count, 3);
        assert_eq!(p.avg_bytes_per_flow, 2000.0);
    }

    #[test]
    fn test_malformed_record_skipped_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &[
                "6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0",
                "6,81.2.69.160,https,9.9.9.9,not-a-port,2000,1.0,60,2.0",
                "6,203.0.113.5,1002,9.9.9.9,443,3000,1.0,60,2.0",
            ],
        );

        let summary = engine.run().unwrap();
        assert_eq!(summary.flows_ingested, 2);
        assert_eq!(summary.records_skipped, 1);

        let batch = &engine.state().history.batches["b1.csv"];
        assert_eq!(batch.total_flow_count, 2);
        assert_eq!(batch.total_bytes, 4000);
    }

    #[test]
    fn test_unattributable_source_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &[
                "6,10.99.99.99,1000,9.9.9.9,443,1000,1.0,60,2.0",
                "6,81.2.69.160,1001,9.9.9.9,443,2000,1.0,60,2.0",
            ],
        );

        let summary = engine.run().unwrap();
        assert_eq!(summary.flows_ingested, 1);
        assert_eq!(summary.records_skipped, 1);
        assert!(engine.profile("AS100").is_some());
    }

    #[test]
    fn test_sentinel_geography_still_scorable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        // 198.51.100.9 has ASN data but no city data.
        write_batch(
            &engine,
            "b1.csv",
            &["6,198.51.100.9,1000,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        write_batch(
            &engine,
            "b2.csv",
            &["6,198.51.100.9,1000,9.9.9.9,443,5000,1.0,60,2.0"],
        );

        engine.run().unwrap();

        let p = engine.profile("AS300").unwrap();
        assert_eq!(p.country_code, crate::constants::UNKNOWN_COUNTRY);
        assert_eq!(p.distance_miles, crate::constants::UNKNOWN_DISTANCE_MILES);
        // Two batches give the distribution a baseline, so a score exists.
        assert!(engine.score("AS300").is_some());
    }

    #[test]
    fn test_global_count_is_sum_of_batch_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &[
                "6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0",
                "6,203.0.113.5,1001,9.9.9.9,443,2000,1.0,60,2.0",
            ],
        );
        write_batch(
            &engine,
            "b2.csv",
            &["17,81.2.69.161,53,9.9.9.9,53,300,1.0,5,9.0"],
        );

        engine.run().unwrap();

        let state = engine.state();
        let batch_sum: u64 = state
            .history
            .batches
            .values()
            .map(|b| b.total_flow_count)
            .sum();
        assert_eq!(state.global.total_flow_count, batch_sum);
        assert_eq!(state.global.total_flow_count, 3);
    }

    #[test]
    fn test_source_filter_rekeys_on_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        engine.config.source_filter = "10.".to_string();
        // Source is internal; the true external party is the destination.
        write_batch(
            &engine,
            "b1.csv",
            &["6,10.0.0.5,1000,203.0.113.5,443,4000,1.0,60,2.0"],
        );

        engine.run().unwrap();
        let p = engine.profile("AS200").unwrap();
        assert_eq!(p.total_bytes, 4000);
    }

    #[test]
    fn test_report_replaced_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &["6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        engine.run().unwrap();
        assert_eq!(engine.report().flow_key_count(), 1);

        write_batch(
            &engine,
            "b2.csv",
            &["6,203.0.113.5,7000,8.8.8.8,53,200,1.0,5,1.0"],
        );
        engine.run().unwrap();

        // Only the second batch's flows remain in the report.
        let report = engine.report();
        assert_eq!(report.flow_key_count(), 1);
        assert!(report.destinations.contains_key("8.8.8.8"));
        assert!(!report.destinations.contains_key("9.9.9.9"));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            netflow_dir: dir.path().join("netflow"),
            state_path: dir.path().join("state.json"),
            ..Default::default()
        };
        fs::create_dir_all(&config.netflow_dir).unwrap();

        let mut engine =
            TrustEngine::with_state(config.clone(), provider(), EngineState::default());
        write_batch(
            &engine,
            "b1.csv",
            &["6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        engine.run().unwrap();
        let before = engine.stats_summary();

        // Reopen from disk: identical profiles and stats, and the processed
        // batch is not selected again.
        let mut reopened = TrustEngine::open(config, provider()).unwrap();
        assert_eq!(reopened.state(), engine.state());
        let summary = reopened.run().unwrap();
        assert_eq!(summary.batches_processed, 0);
        assert_eq!(reopened.stats_summary(), before);
    }

    #[test]
    fn test_batch_trust_reflects_prior_finalized_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &[
                "6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0",
                "6,81.2.69.160,1001,9.9.9.9,443,1000,1.0,60,2.0",
                "6,81.2.69.161,1002,9.9.9.9,443,1000,1.0,60,2.0",
            ],
        );
        engine.run().unwrap();

        // Poison the cache with a value no current state can produce; the
        // rebuild at the start of the next batch must discard it, so the
        // batch average folds in the freshly computed floor metric.
        engine.state.trust.insert("AS100".to_string(), 999.0);
        write_batch(
            &engine,
            "b2.csv",
            &["6,81.2.69.160,1003,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        engine.run().unwrap();

        let b2 = &engine.state().history.batches["b2.csv"];
        assert_eq!(b2.avg_trust_metric, Some(crate::constants::TRUST_FLOOR));
    }

    #[test]
    fn test_default_threshold_skips_ordinary_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        write_batch(
            &engine,
            "b1.csv",
            &["6,81.2.69.160,1000,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        write_batch(
            &engine,
            "b2.csv",
            &["6,81.2.69.160,1001,9.9.9.9,443,1000,1.0,60,2.0"],
        );
        engine.run().unwrap();

        // Every source here scores at the floor, so the default report view
        // stays empty; an explicit permissive threshold still surfaces them.
        assert!(engine.flagged_sources().is_empty());
        assert_eq!(engine.report().low_trust_sources(0.0).len(), 1);
    }

    #[test]
    fn test_trust_cache_refreshed_at_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());

        // A well-established near-home AS with 50 in-baseline flows...
        let rows: Vec<String> = (0..50)
            .map(|i| format!("6,81.2.69.160,{},9.9.9.9,443,1000,1.0,60,2.0", 1000 + i))
            .collect();
        let row_refs: Vec<&str> = rows.iter().map(|s| s.as_str()).collect();
        write_batch(&engine, "b1.csv", &row_refs);
        // ...and a single far-away flow with wildly off-baseline bytes.
        write_batch(
            &engine,
            "b2.csv",
            &["6,203.0.113.5,1000,9.9.9.9,443,90000,1.0,60,2.0"],
        );

        engine.run().unwrap();

        // Batches exhausted -> baseline exists -> every AS has a cached
        // metric with the floor of 1 enforced.
        let ranking = engine.trust_ranking();
        assert_eq!(ranking.len(), 2);
        for (_, metric) in &ranking {
            assert!(*metric >= 1.0);
        }
        // The statistically insignificant, distant, off-baseline AS ranks
        // worst; the established AS pins at the floor.
        assert_eq!(ranking[0].0, "AS200");
        assert!(ranking[0].1 > 1.0);
        assert_eq!(ranking[1], ("AS100".to_string(), 1.0));
    }
}
