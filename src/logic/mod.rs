//! Logic Module - aggregation and scoring engines.
//!
//! - `distribution` - sorted-sequence statistics (stddev, percentile)
//! - `profile` - per-AS accumulating profiles
//! - `stats` - lifetime-global and per-batch running totals
//! - `scoring` - the heuristic trust metric
//! - `report` - per-batch nested flow report
//! - `processor` - batch orchestration and the run loop
//! - `watchlist` - trust scoring over externally supplied address lists

pub mod distribution;
pub mod processor;
pub mod profile;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod watchlist;
