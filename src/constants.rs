//! Central Configuration Constants
//!
//! Single source of truth for all tuning defaults of the trust engine.
//! Runtime overrides come from environment variables via the `get_*` helpers.

use once_cell::sync::Lazy;
use std::path::PathBuf;

/// App name
pub const APP_NAME: &str = "FlowTrust";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fraction of the lifetime flow count below which an AS's flow volume is
/// considered statistically insignificant (0.0005 = 500 in 1,000,000).
pub const DIST_FLOW_CUTOFF_FACTOR: f64 = 0.0005;

/// Fraction of the lifetime byte total below which an AS's byte volume is
/// considered statistically insignificant.
pub const DIST_BYTES_CUTOFF_FACTOR: f64 = 0.000005;

/// Home reference point for source distance: Shenley, Milton Keynes.
pub const HOME_LATITUDE: f64 = 52.0175;
pub const HOME_LONGITUDE: f64 = -0.7896;

/// Distance assumed for a source whose geolocation lookup failed (miles).
pub const UNKNOWN_DISTANCE_MILES: f64 = 100.0;

/// Country code recorded when geolocation is unavailable.
pub const UNKNOWN_COUNTRY: &str = "unknown";

/// Divisor turning raw miles into the distance metric, clamped to [1, 2].
pub const DISTANCE_METRIC_DIVISOR: f64 = 2500.0;
pub const DISTANCE_METRIC_MIN: f64 = 1.0;
pub const DISTANCE_METRIC_MAX: f64 = 2.0;

/// Ceiling on the combined byte-deviation metric.
pub const TOTAL_BYTE_METRIC_CAP: f64 = 50_000.0;

/// Ceiling on the flow-count metric.
pub const FLOW_COUNT_METRIC_CAP: f64 = 5.0;

/// Normalizer and scale for the final trust metric (lower is better,
/// nominal ceiling 1000, hard floor 1).
pub const TRUST_NORMALIZER: f64 = 500_000.0;
pub const TRUST_SCALE: f64 = 1000.0;
pub const TRUST_FLOOR: f64 = 1.0;

/// Default report threshold. Metrics floor at [`TRUST_FLOOR`], so the
/// default view only surfaces sources whose metric is clearly elevated
/// (half the scale); pass an explicit threshold to widen it.
pub const DEFAULT_REPORT_TRUST_THRESHOLD: f64 = 500.0;

/// Decimal places kept when accumulating packet rates.
pub const PACKET_RATE_PRECISION: u32 = 4;

/// Decimal places kept when parsing byte rates.
pub const BYTE_RATE_PRECISION: u32 = 2;

/// Minutes of traffic covered by one netflow export file.
pub const BATCH_INTERVAL_MINS: u64 = 15;

/// State database file name.
pub const STATE_FILE_NAME: &str = "netflow_state.json";

/// Default directory scanned for netflow CSV batches.
static DEFAULT_NETFLOW_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os("FLOWTRUST_NETFLOW_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("netflow"))
});

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get the netflow batch directory from environment or use default
pub fn get_netflow_dir() -> PathBuf {
    DEFAULT_NETFLOW_DIR.clone()
}

/// Get the state database path from environment or use the platform default
pub fn get_state_path() -> PathBuf {
    if let Some(path) = std::env::var_os("FLOWTRUST_STATE_PATH") {
        return PathBuf::from(path);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join(STATE_FILE_NAME)
}

/// Get the outbound source filter substring (empty = filtering disabled)
pub fn get_source_filter() -> String {
    std::env::var("FLOWTRUST_SOURCE_FILTER").unwrap_or_default()
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456789, 4), 1.2346);
        assert_eq!(round_to(1.0051, 2), 1.01);
        assert_eq!(round_to(-2.71828, 2), -2.72);
    }
}
