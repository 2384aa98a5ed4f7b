//! flowtrust - NetFlow AS trust baseline engine.
//!
//! Ingests network-flow summary batches, accumulates per-AS and global
//! distributional statistics, and maintains a lower-is-better trust metric
//! per originating Autonomous System. Batches are processed strictly
//! sequentially: each batch's scoring baseline depends on the fully
//! finalized state of all prior batches.

pub mod config;
pub mod constants;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod logic;
pub mod persist;

pub use config::EngineConfig;
pub use error::EngineError;
pub use logic::processor::TrustEngine;
