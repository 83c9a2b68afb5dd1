//! Reading and writing the state file.
//!
//! A missing file is an empty state. Writes go to a sibling temp file that
//! is renamed over the original, so an interrupted write never leaves a
//! truncated state behind.

use redgrant_config::{STATE_VERSION, StateFile};
use std::path::Path;

/// Errors that can occur when reading or writing the state file.
#[derive(Debug)]
pub enum StateError {
    /// I/O error on the state file
    Io(String),
    /// The state file is not valid JSON, or not a state file
    Parse(String),
    /// Written by a newer redgrant
    Version(u32),
    /// Serializing the state failed
    Serialize(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Io(e) => write!(f, "Failed to access state file: {}", e),
            StateError::Parse(e) => write!(f, "Failed to parse state file: {}", e),
            StateError::Version(v) => write!(
                f,
                "State file version {} is newer than supported version {}",
                v, STATE_VERSION
            ),
            StateError::Serialize(e) => write!(f, "Failed to serialize state: {}", e),
        }
    }
}

impl std::error::Error for StateError {}

pub fn load(path: &Path) -> Result<StateFile, StateError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no state file yet");
            return Ok(StateFile::default());
        }
        Err(e) => return Err(StateError::Io(e.to_string())),
    };

    let state: StateFile =
        facet_json::from_str(&content).map_err(|e| StateError::Parse(e.to_string()))?;
    if state.version > STATE_VERSION {
        return Err(StateError::Version(state.version));
    }
    Ok(state)
}

pub fn save(path: &Path, state: &StateFile) -> Result<(), StateError> {
    let json = facet_json::to_string(state).map_err(|e| StateError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StateError::Io(e.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| StateError::Io(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| StateError::Io(e.to_string()))?;

    tracing::debug!(path = %path.display(), grants = state.grants.len(), "wrote state file");
    Ok(())
}
