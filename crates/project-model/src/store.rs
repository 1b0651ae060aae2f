//! Keyed persistence for project snapshots.
//!
//! Stores are plain last-write-wins key/value slots holding snapshot JSON.
//! The editor receives a store at session start; nothing here is global.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::project::{Project, ProjectError};

/// Snapshot persistence interface.
pub trait ProjectStore: Send + Sync {
    /// Fetch the snapshot stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Value>, ProjectError>;

    /// Store a snapshot under `key`, replacing any previous one.
    fn set(&self, key: &str, snapshot: &Value) -> Result<(), ProjectError>;

    /// All stored keys, sorted.
    fn list(&self) -> Result<Vec<String>, ProjectError>;

    /// Remove a snapshot. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, ProjectError>;
}

/// Persist a project under its id.
pub fn save_project(store: &dyn ProjectStore, project: &Project) -> Result<(), ProjectError> {
    let snapshot = project.to_json()?;
    store.set(&project.id, &snapshot)?;
    tracing::debug!(project = %project.id, "Saved project snapshot");
    Ok(())
}

/// Load and leniently restore a project.
pub fn load_project(store: &dyn ProjectStore, key: &str) -> Result<Option<Project>, ProjectError> {
    Ok(store.get(key)?.map(|value| Project::restore(&value)))
}

fn validate_key(key: &str) -> Result<(), ProjectError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ProjectError::validation(format!("invalid project key {key:?}")))
    }
}

/// One pretty-printed JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileProjectStore {
    root: PathBuf,
}

impl FileProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ProjectError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl ProjectStore for FileProjectStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ProjectError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let value = serde_json::from_str(&json)
            .map_err(|e| ProjectError::ParseError { path, source: e })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, snapshot: &Value) -> Result<(), ProjectError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::IoError {
            path: self.root.clone(),
            source: e,
        })?;

        let json = serde_json::to_string_pretty(snapshot).map_err(|e| ProjectError::ParseError {
            path: path.clone(),
            source: e,
        })?;

        // Readers never observe a partially written snapshot.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ProjectError::IoError {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| ProjectError::IoError { path, source: e })
    }

    fn list(&self) -> Result<Vec<String>, ProjectError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| ProjectError::IoError {
            path: self.root.clone(),
            source: e,
        })?;

        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool, ProjectError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProjectError::IoError { path, source: e }),
        }
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    slots: Mutex<HashMap<String, Value>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, ProjectError> {
        self.slots
            .lock()
            .map_err(|_| ProjectError::validation("memory store lock poisoned"))
    }
}

impl ProjectStore for MemoryProjectStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ProjectError> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn set(&self, key: &str, snapshot: &Value) -> Result<(), ProjectError> {
        validate_key(key)?;
        self.slots()?.insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ProjectError> {
        let mut keys: Vec<String> = self.slots()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool, ProjectError> {
        Ok(self.slots()?.remove(key).is_some())
    }
}
