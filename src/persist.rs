//! State persistence.
//!
//! The entire aggregate state (profiles, global stats, batch history, trust
//! cache) is one opaque JSON unit: loaded once at startup, saved after every
//! batch finalization. Saves go to a sibling temp file first and are renamed
//! into place, so a failed write can never truncate the previous state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::EngineError;
use crate::logic::profile::AsProfileStore;
use crate::logic::stats::{BatchHistory, GlobalStats};

/// Everything that survives between runs.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub profiles: AsProfileStore,
    pub global: GlobalStats,
    pub history: BatchHistory,

    /// Last computed trust metric per AS, refreshed by a full scoring pass
    /// when batch input is exhausted.
    pub trust: HashMap<String, f64>,
}

/// Load the state from `path`. A missing file is a fresh state; an existing
/// but unreadable or undecodable file is fatal - the run must not proceed
/// with a partial state.
pub fn load(path: &Path) -> Result<EngineState, EngineError> {
    if !path.exists() {
        log::info!("no state database at {}, starting fresh", path.display());
        return Ok(EngineState::default());
    }

    let file = File::open(path).map_err(|source| EngineError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let state: EngineState =
        serde_json::from_reader(reader).map_err(|source| EngineError::CorruptState {
            path: path.to_path_buf(),
            source,
        })?;

    log::info!(
        "loaded state: {} AS profiles, {} batches",
        state.profiles.len(),
        state.history.len()
    );
    Ok(state)
}

/// Save the state to `path`, creating parent directories as needed.
pub fn save(path: &Path, state: &EngineState) -> Result<(), EngineError> {
    let persist_err = |source: std::io::Error| EngineError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp_path).map_err(persist_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, state).map_err(|e| {
            persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        writer.flush().map_err(persist_err)?;
    }
    fs::rename(&tmp_path, path).map_err(persist_err)?;

    log::debug!("saved state to {}", path.display());
    Ok(())
}
