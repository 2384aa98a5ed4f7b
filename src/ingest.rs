//! Batch ingestion: CSV field discovery, typed row parsing and batch file
//! selection.
//!
//! Netflow exports are comma-separated with a header row naming each column.
//! Field positions are discovered from the header by exact name, so the
//! exporter may reorder columns freely. Rows that fail typing are skipped
//! one at a time; they never abort the batch.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, RecordError};
use crate::logic::stats::BatchHistory;

/// Header names of the fields the engine consumes.
pub const FIELD_PROTOCOL: &str = "Protocol";
pub const FIELD_SOURCE_ADDRESS: &str = "SourceAddress";
pub const FIELD_SOURCE_PORT: &str = "SourcePort";
pub const FIELD_DESTINATION_ADDRESS: &str = "DestinationAddress";
pub const FIELD_DESTINATION_PORT: &str = "DestinationPort";
pub const FIELD_BYTES_IN_VOLUME: &str = "BytesInVolume";
pub const FIELD_BYTES_IN_RATE: &str = "BytesInRatePerDuration";
pub const FIELD_FLOW_DURATION: &str = "FlowDuration";
pub const FIELD_PACKETS_IN_RATE: &str = "PacketsInRatePerDuration";

/// One parsed, typed flow row. The core never re-parses raw text past this
/// point.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub protocol: u16,
    pub source_address: String,
    pub source_port: u16,
    pub destination_address: String,
    pub destination_port: u16,
    pub bytes_in_volume: u64,
    pub bytes_in_rate: f64,
    pub flow_duration: u64,
    pub packets_in_rate: f64,
}

/// Column positions discovered from the header row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    protocol: usize,
    source_address: usize,
    source_port: usize,
    destination_address: usize,
    destination_port: usize,
    bytes_in_volume: usize,
    bytes_in_rate: usize,
    flow_duration: usize,
    packets_in_rate: usize,
}

impl FieldMap {
    /// Build the map from the first line of a batch file.
    pub fn from_header(header: &str) -> Result<Self, RecordError> {
        let columns: Vec<&str> = header.split(',').map(|c| c.trim()).collect();
        let find = |name: &'static str| -> Result<usize, RecordError> {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or(RecordError::MissingField(name))
        };

        Ok(Self {
            protocol: find(FIELD_PROTOCOL)?,
            source_address: find(FIELD_SOURCE_ADDRESS)?,
            source_port: find(FIELD_SOURCE_PORT)?,
            destination_address: find(FIELD_DESTINATION_ADDRESS)?,
            destination_port: find(FIELD_DESTINATION_PORT)?,
            bytes_in_volume: find(FIELD_BYTES_IN_VOLUME)?,
            bytes_in_rate: find(FIELD_BYTES_IN_RATE)?,
            flow_duration: find(FIELD_FLOW_DURATION)?,
            packets_in_rate: find(FIELD_PACKETS_IN_RATE)?,
        })
    }

    /// Parse one data row into a typed record.
    pub fn parse_row(&self, row: &str) -> Result<FlowRecord, RecordError> {
        let cells: Vec<&str> = row.split(',').map(|c| c.trim()).collect();

        let cell = |field: &'static str, index: usize| -> Result<&str, RecordError> {
            cells.get(index).copied().ok_or(RecordError::ShortRow {
                field,
                need: index,
                got: cells.len(),
            })
        };

        let int = |field: &'static str, index: usize| -> Result<u64, RecordError> {
            let raw = cell(field, index)?;
            raw.parse().map_err(|_| RecordError::NotNumeric {
                field,
                value: raw.to_string(),
            })
        };

        let float = |field: &'static str, index: usize| -> Result<f64, RecordError> {
            let raw = cell(field, index)?;
            raw.parse().map_err(|_| RecordError::NotNumeric {
                field,
                value: raw.to_string(),
            })
        };

        let port = |field: &'static str, index: usize| -> Result<u16, RecordError> {
            let raw = cell(field, index)?;
            raw.parse().map_err(|_| RecordError::NotNumeric {
                field,
                value: raw.to_string(),
            })
        };

        let bytes_in_rate = crate::constants::round_to(
            float(FIELD_BYTES_IN_RATE, self.bytes_in_rate)?,
            crate::constants::BYTE_RATE_PRECISION,
        );

        Ok(FlowRecord {
            protocol: port(FIELD_PROTOCOL, self.protocol)?,
            source_address: cell(FIELD_SOURCE_ADDRESS, self.source_address)?.to_string(),
            source_port: port(FIELD_SOURCE_PORT, self.source_port)?,
            destination_address: cell(FIELD_DESTINATION_ADDRESS, self.destination_address)?
                .to_string(),
            destination_port: port(FIELD_DESTINATION_PORT, self.destination_port)?,
            bytes_in_volume: int(FIELD_BYTES_IN_VOLUME, self.bytes_in_volume)?,
            bytes_in_rate,
            flow_duration: int(FIELD_FLOW_DURATION, self.flow_duration)?,
            packets_in_rate: float(FIELD_PACKETS_IN_RATE, self.packets_in_rate)?,
        })
    }
}

/// A batch eligible for processing.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFile {
    /// Batch identifier: the bare file name.
    pub id: String,
    pub path: PathBuf,
    /// Modification time, seconds since the epoch.
    pub age: i64,
}

/// Pick the next unprocessed batch: the oldest file (by modification time)
/// in `dir` whose name is not in the processed history. `Ok(None)` is the
/// normal "no batches remain" termination signal.
pub fn next_batch(dir: &Path, history: &BatchHistory) -> Result<Option<BatchFile>, EngineError> {
    let entries = fs::read_dir(dir).map_err(|source| EngineError::BatchDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut oldest: Option<BatchFile> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let id = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if history.contains(&id) {
            continue;
        }

        // A file that vanished or lost its metadata between listing and stat
        // is just not eligible this run.
        let age = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => match modified.duration_since(std::time::UNIX_EPOCH) {
                Ok(d) => d.as_secs() as i64,
                Err(_) => 0,
            },
            Err(e) => {
                log::debug!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        // Name breaks modification-time ties so selection does not depend
        // on directory iteration order.
        let candidate = BatchFile { id, path, age };
        oldest = match oldest {
            Some(current)
                if (current.age, current.id.as_str())
                    <= (candidate.age, candidate.id.as_str()) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        };
    }

    Ok(oldest)
}

/// Read a batch file into its header map and data rows. Returns the raw rows
/// so the processor can apply per-record fault isolation.
pub fn read_batch(batch: &BatchFile) -> Result<(FieldMap, Vec<String>), EngineError> {
    let content = fs::read_to_string(&batch.path).map_err(|source| EngineError::BatchOpen {
        path: batch.path.clone(),
        source,
    })?;

    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().unwrap_or_default();
    let map = FieldMap::from_header(header).map_err(|e| EngineError::BatchOpen {
        path: batch.path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
    })?;

    let rows = lines.map(|l| l.to_string()).collect();
    Ok((map, rows))
}
