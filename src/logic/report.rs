//! Per-batch trust report.
//!
//! A five-level association from destination address down to source port,
//! each leaf carrying the aggregate counters for that exact flow key, plus a
//! per-source trust snapshot and per-destination-protocol byte totals. The
//! report is owned by the current batch and replaced, never merged, when the
//! next batch starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ingest::FlowRecord;

/// Aggregate counters for one (dest, proto, dport, src, sport) key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowAggregate {
    pub total_flow_count: u64,
    pub total_bytes: u64,
    pub total_duration: u64,
    pub total_packet_rate: f64,
}

impl FlowAggregate {
    fn add(&mut self, record: &FlowRecord) {
        self.total_flow_count += 1;
        self.total_bytes += record.bytes_in_volume;
        self.total_duration += record.flow_duration;
        self.total_packet_rate += record.packets_in_rate;
    }
}

/// Flows under one (destination, protocol) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEntry {
    /// Running byte total for this destination/protocol pair.
    pub ip_bytes_in_volume: u64,

    /// dport -> src -> sport -> aggregate
    pub ports: BTreeMap<u16, BTreeMap<String, BTreeMap<u16, FlowAggregate>>>,
}

/// Report for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustReport {
    /// destination -> protocol -> ...
    pub destinations: BTreeMap<String, BTreeMap<u16, ProtocolEntry>>,

    /// Trust metric of each source's AS at its first appearance in the batch.
    pub source_trust: BTreeMap<String, f64>,
}

impl TrustReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the nested aggregates. `trust` is the score of
    /// the source's AS if it was computable at ingest time; it is recorded
    /// once per source address per batch.
    pub fn record(&mut self, record: &FlowRecord, trust: Option<f64>) {
        let proto_entry = self
            .destinations
            .entry(record.destination_address.clone())
            .or_default()
            .entry(record.protocol)
            .or_default();

        proto_entry.ip_bytes_in_volume += record.bytes_in_volume;

        proto_entry
            .ports
            .entry(record.destination_port)
            .or_default()
            .entry(record.source_address.clone())
            .or_default()
            .entry(record.source_port)
            .or_default()
            .add(record);

        if let Some(trust) = trust {
            self.source_trust
                .entry(record.source_address.clone())
                .or_insert(trust);
        }
    }

    /// Sources whose snapshot trust exceeds `threshold`, worst first.
    pub fn low_trust_sources(&self, threshold: f64) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .source_trust
            .iter()
            .filter(|(_, t)| **t > threshold)
            .map(|(s, t)| (s.clone(), *t))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    pub fn flow_key_count(&self) -> usize {
        self.destinations
            .values()
            .flat_map(|protos| protos.values())
            .flat_map(|entry| entry.ports.values())
            .flat_map(|srcs| srcs.values())
            .map(|sports| sports.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(src: &str, sport: u16, dst: &str, dport: u16, bytes: u64) -> FlowRecord {
        FlowRecord {
            protocol: 6,
            source_address: src.to_string(),
            source_port: sport,
            destination_address: dst.to_string(),
            destination_port: dport,
            bytes_in_volume: bytes,
            bytes_in_rate: 1.0,
            flow_duration: 30,
            packets_in_rate: 2.5,
        }
    }

    #[test]
    fn test_aggregates_by_full_key() {
        let mut report = TrustReport::new();
        report.record(&record("1.1.1.1", 1000, "9.9.9.9", 443, 500), None);
        report.record(&record("1.1.1.1", 1000, "9.9.9.9", 443, 700), None);
        report.record(&record("1.1.1.1", 2000, "9.9.9.9", 443, 100), None);

        let entry = &report.destinations["9.9.9.9"][&6];
        assert_eq!(entry.ip_bytes_in_volume, 1300);

        let agg = &entry.ports[&443]["1.1.1.1"][&1000];
        assert_eq!(agg.total_flow_count, 2);
        assert_eq!(agg.total_bytes, 1200);
        assert_eq!(agg.total_duration, 60);
        assert_eq!(agg.total_packet_rate, 5.0);

        assert_eq!(report.flow_key_count(), 2);
    }

    #[test]
    fn test_trust_snapshot_taken_at_first_appearance() {
        let mut report = TrustReport::new();
        report.record(&record("1.1.1.1", 1000, "9.9.9.9", 443, 500), Some(120.0));
        // A later, different score for the same source does not overwrite.
        report.record(&record("1.1.1.1", 1001, "9.9.9.9", 443, 500), Some(999.0));
        report.record(&record("2.2.2.2", 1000, "9.9.9.9", 443, 500), None);

        assert_eq!(report.source_trust.get("1.1.1.1"), Some(&120.0));
        assert!(!report.source_trust.contains_key("2.2.2.2"));
    }

    #[test]
    fn test_low_trust_sources_sorted_worst_first() {
        let mut report = TrustReport::new();
        report.record(&record("1.1.1.1", 1, "9.9.9.9", 443, 1), Some(50.0));
        report.record(&record("2.2.2.2", 1, "9.9.9.9", 443, 1), Some(900.0));
        report.record(&record("3.3.3.3", 1, "9.9.9.9", 443, 1), Some(300.0));

        let flagged = report.low_trust_sources(100.0);
        assert_eq!(
            flagged,
            vec![("2.2.2.2".to_string(), 900.0), ("3.3.3.3".to_string(), 300.0)]
        );
    }
}
