//! Engine runtime configuration.
//!
//! Tuning defaults live in `constants`; this struct is what callers hand to
//! the engine, with environment overrides applied by `from_env()`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory scanned for netflow CSV batch files.
    pub netflow_dir: PathBuf,

    /// Path of the persisted state database.
    pub state_path: PathBuf,

    /// Substring matched against source addresses; a match swaps source and
    /// destination so outbound flows are keyed on the true external party.
    /// Empty disables the swap.
    pub source_filter: String,

    /// Home reference point for source distance (latitude, longitude).
    pub home_point: (f64, f64),

    /// Fraction of lifetime flow count forming the flow cutoff.
    pub flow_cutoff_factor: f64,

    /// Fraction of lifetime byte total forming the byte cutoff.
    pub bytes_cutoff_factor: f64,

    /// Flows scoring above this threshold are collected into the batch
    /// report's low-trust view.
    pub report_trust_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            netflow_dir: PathBuf::from("netflow"),
            state_path: constants::get_state_path(),
            source_filter: String::new(),
            home_point: (constants::HOME_LATITUDE, constants::HOME_LONGITUDE),
            flow_cutoff_factor: constants::DIST_FLOW_CUTOFF_FACTOR,
            bytes_cutoff_factor: constants::DIST_BYTES_CUTOFF_FACTOR,
            report_trust_threshold: constants::DEFAULT_REPORT_TRUST_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            netflow_dir: constants::get_netflow_dir(),
            state_path: constants::get_state_path(),
            source_filter: constants::get_source_filter(),
            ..Default::default()
        }
    }
}
