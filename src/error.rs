//! Error taxonomy for the trust engine.
//!
//! Record- and lookup-level failures are recovered inside the batch
//! processor and never surface past it; persistence failures are fatal for
//! the current run. Undefined divisions degrade to `None` at the call site
//! rather than appearing here.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal (or caller-visible) engine failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// State store unreadable or unwritable. Aborts the run before any
    /// further mutation.
    #[error("state database {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State store contents could not be decoded.
    #[error("state database {path} is corrupt: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A batch file existed at selection time but could not be opened.
    /// The batch is skipped, not retried.
    #[error("batch {path}: {source}")]
    BatchOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The netflow directory itself could not be listed.
    #[error("netflow directory {path}: {source}")]
    BatchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Watchlist input file could not be read.
    #[error("watchlist {path}: {source}")]
    Watchlist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single CSV row was rejected. Rejected rows are skipped and logged;
/// they never count against batch totals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The header row did not contain a required field name.
    #[error("required field {0} missing from header")]
    MissingField(&'static str),

    /// A data row was shorter than the discovered field positions.
    #[error("row has {got} columns, field {field} needs index {need}")]
    ShortRow {
        field: &'static str,
        need: usize,
        got: usize,
    },

    /// A field failed integer/float conversion.
    #[error("field {field} is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },
}
