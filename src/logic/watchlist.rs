//! Watchlist scoring: given a file of IP addresses (one per line, first
//! whitespace-separated token), resolve each to its AS, score every distinct
//! AS once, and report the count and mean trust across the list. Addresses
//! that cannot be attributed or scored contribute nothing.

use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::geo::GeoProvider;
use crate::logic::processor::TrustEngine;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistReport {
    /// Distinct ASes that produced a usable trust metric.
    pub scored_count: u64,
    pub trust_sum: f64,
}

impl WatchlistReport {
    pub fn avg_trust(&self) -> Option<f64> {
        if self.scored_count > 0 {
            Some(self.trust_sum / self.scored_count as f64)
        } else {
            None
        }
    }
}

/// Score every distinct AS seen in the watchlist file.
pub fn score_watchlist<G: GeoProvider>(
    engine: &TrustEngine<G>,
    path: &Path,
) -> Result<WatchlistReport, EngineError> {
    let content = fs::read_to_string(path).map_err(|source| EngineError::Watchlist {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen: Vec<String> = Vec::new();
    let mut report = WatchlistReport::default();

    for line in content.lines() {
        let addr = match line.split_whitespace().next() {
            Some(addr) => addr,
            None => continue,
        };
        let asn = match engine.geo().asn(addr) {
            Some(asn) => asn,
            None => {
                log::debug!("watchlist address {} has no AS attribution", addr);
                continue;
            }
        };
        if seen.contains(&asn.as_id) {
            continue;
        }
        seen.push(asn.as_id.clone());

        if let Some(metric) = engine.score(&asn.as_id) {
            report.scored_count += 1;
            report.trust_sum += metric;
        }
    }

    log::info!(
        "watchlist {}: {} ASes scored, avg trust {:?}",
        path.display(),
        report.scored_count,
        report.avg_trust()
    );
    Ok(report)
}
