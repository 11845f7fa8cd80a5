//! Persisted Context Store
//!
//! Durable record of pipeline progress: the id of the next step to run and the
//! context as of that step's start. Writes go to a temp file that is fsynced
//! and renamed over the real file, so a reader sees either the previous record
//! or the new one, never a torn write.
//!
//! A state file that cannot be read or parsed is reported as "no prior run".

use crate::context::Context;
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Step id recorded once the whole pipeline has finished
pub const COMPLETED_STEP_ID: &str = "completed";

/// What the state file holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Next step to run, or [`COMPLETED_STEP_ID`]
    pub step_id: String,
    pub context: Context,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn is_completed(&self) -> bool {
        self.step_id == COMPLETED_STEP_ID
    }
}

/// Load/save of orchestration progress
pub trait StateStore: Send + Sync {
    /// Durably record `{step_id, context}`. Returns only once the record is on
    /// disk (or wherever the store keeps it).
    fn save(&self, step_id: &str, context: &Context) -> KeeperResult<()>;

    /// Last saved record, `None` if there is none or it is unreadable
    fn load(&self) -> Option<PersistedState>;

    /// Forget any saved progress
    fn clear(&self) -> KeeperResult<()>;
}

/// JSON state file at a fixed path
pub struct FileStateStore {
    path: PathBuf,
    log: Logger,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>, log: &Logger) -> Self {
        Self {
            path: path.into(),
            log: log.scoped("state_store"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        // Persist the rename itself
        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn save(&self, step_id: &str, context: &Context) -> KeeperResult<()> {
        let state = PersistedState {
            step_id: step_id.to_string(),
            context: context.clone(),
            saved_at: Some(Utc::now()),
        };
        let json = serde_json::to_vec_pretty(&state)?;

        self.write_atomic(&json).map_err(|e| {
            KeeperError::StateFile(format!("cannot write {}: {}", self.path.display(), e))
        })?;

        debug!(parent: self.log.span(), step = step_id, path = %self.path.display(), "state saved");
        Ok(())
    }

    fn load(&self) -> Option<PersistedState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(parent: self.log.span(), "Failed to read state file {}: {}. Starting fresh.", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedState>(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(parent: self.log.span(), "Failed to parse state file {}: {}. Starting fresh.", self.path.display(), e);
                None
            }
        }
    }

    fn clear(&self) -> KeeperResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeeperError::StateFile(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-memory store that also records every saved step id, in order
#[derive(Default)]
pub struct MemoryStateStore {
    current: Mutex<Option<PersistedState>>,
    history: Mutex<Vec<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a saved record, as if left by an earlier run
    pub fn with_state(step_id: &str, context: Context) -> Self {
        let store = Self::new();
        if let Ok(mut current) = store.current.lock() {
            *current = Some(PersistedState {
                step_id: step_id.to_string(),
                context,
                saved_at: None,
            });
        }
        store
    }

    pub fn saved_step_ids(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, step_id: &str, context: &Context) -> KeeperResult<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| KeeperError::StateFile("state lock poisoned".to_string()))?;
        *current = Some(PersistedState {
            step_id: step_id.to_string(),
            context: context.clone(),
            saved_at: Some(Utc::now()),
        });
        if let Ok(mut history) = self.history.lock() {
            history.push(step_id.to_string());
        }
        Ok(())
    }

    fn load(&self) -> Option<PersistedState> {
        self.current.lock().ok().and_then(|c| c.clone())
    }

    fn clear(&self) -> KeeperResult<()> {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        Ok(())
    }
}
