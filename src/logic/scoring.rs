//! Trust scorer - turns an AS profile plus the accumulated baselines into a
//! single bounded, lower-is-better score.
//!
//! Three dimensions, combined multiplicatively so a single strongly-anomalous
//! dimension dominates:
//! - distance: sources geographically implausible relative to the home point
//! - byte rate: deviation from the cross-batch norm in either direction
//!   (both beaconing-quiet and exfiltration-loud are suspicious)
//! - flow count: too little traffic to earn a clean bill, capped so a
//!   single-flow AS cannot dominate

use crate::constants;
use crate::logic::profile::AsProfile;
use crate::logic::stats::{BatchDistribution, GlobalStats};

/// Compute the trust metric for one AS.
///
/// Deterministic in the stored state; the only side effect is a debug trace.
/// `None` when the computation is unavailable: a zero flow count, or no
/// cross-batch baseline yet.
pub fn score(
    as_id: &str,
    profile: &AsProfile,
    global: &GlobalStats,
    batch_dist: &BatchDistribution,
) -> Option<f64> {
    let (std_dev, std_dev_avg) = batch_dist.baseline()?;
    if profile.total_flow_count == 0 {
        return None;
    }

    let distance_metric = (profile.distance_miles / constants::DISTANCE_METRIC_DIVISOR)
        .clamp(constants::DISTANCE_METRIC_MIN, constants::DISTANCE_METRIC_MAX);

    // Deviation above the expected band...
    let neg_byte_metric =
        (profile.avg_bytes_per_flow - (std_dev_avg + std_dev / 2.0)).max(1.0);
    // ...and below it. At most one of the two exceeds its floor.
    let pos_byte_metric =
        ((std_dev_avg - std_dev / 2.0) - profile.avg_bytes_per_flow).max(1.0);

    let total_byte_metric =
        (neg_byte_metric + pos_byte_metric).min(constants::TOTAL_BYTE_METRIC_CAP);

    let flow_count_metric = (global.flow_cutoff / profile.total_flow_count as f64)
        .min(constants::FLOW_COUNT_METRIC_CAP);

    let trust_metric = ((flow_count_metric * total_byte_metric * distance_metric
        / constants::TRUST_NORMALIZER)
        * constants::TRUST_SCALE)
        .max(constants::TRUST_FLOOR);

    log::debug!(
        "trust {}: distance={:.2} byte={:.0} flow={:.2} -> {:.0} (of {}, lower is better)",
        as_id,
        distance_metric,
        total_byte_metric,
        flow_count_metric,
        trust_metric,
        constants::TRUST_SCALE,
    );

    Some(trust_metric)
}
