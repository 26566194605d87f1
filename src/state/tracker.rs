//! State File
//!
//! Durable storage for the replicated state. The whole state is
//! rewritten on every mutation and read back in full at startup.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::log::ReplicatedState;
use crate::error::{Error, Result};

/// JSON file holding one node's replicated state
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Create a handle for the given path; nothing is touched on disk yet
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing file yields an empty state which is immediately written
    /// as the baseline. An unreadable or unparsable file is an error.
    pub fn load_or_init(&self) -> Result<ReplicatedState> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No state file at {}, starting from an empty log",
                    self.path.display()
                );
                let state = ReplicatedState::default();
                self.save(&state)?;
                return Ok(state);
            }
            Err(e) => return Err(self.persistence_error(e)),
        };

        let state: ReplicatedState =
            serde_json::from_slice(&data).map_err(|e| Error::StateCorrupted {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Loaded state from {} (sequence number {}, {} events)",
            self.path.display(),
            state.sequence_number,
            state.event_log.len()
        );
        Ok(state)
    }

    /// Write the full state and wait until it is on disk.
    ///
    /// The data goes to a sibling temp file which is synced and renamed
    /// over the target, so a crash never leaves a half-written state.
    pub fn save(&self, state: &ReplicatedState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(|e| self.persistence_error(e))?;
        file.write_all(&data).map_err(|e| self.persistence_error(e))?;
        file.sync_all().map_err(|e| self.persistence_error(e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| self.persistence_error(e))?;
        Ok(())
    }

    fn persistence_error(&self, e: std::io::Error) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}
