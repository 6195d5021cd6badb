//! [`CalibrationStore`] – calibration overrides backed by a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use webkin_types::{CalibrationOverride, CalibrationOverrides, WebkinError};

/// Joint name → [`CalibrationOverride`] map, optionally mirrored to disk.
#[derive(Debug, Default)]
pub struct CalibrationStore {
    path: Option<PathBuf>,
    overrides: CalibrationOverrides,
}

impl CalibrationStore {
    /// Open the store at `path`. A missing file yields an empty store; the
    /// file is created on the first mutation.
    ///
    /// # Errors
    ///
    /// Returns [`WebkinError::Store`] when the file exists but cannot be read
    /// or is not a JSON object of override records.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WebkinError> {
        let path = path.into();
        let overrides = load_from(&path)?.unwrap_or_default();
        info!(path = %path.display(), joints = overrides.len(), "calibration store opened");
        Ok(Self {
            path: Some(path),
            overrides,
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn overrides(&self) -> &CalibrationOverrides {
        &self.overrides
    }

    pub fn get(&self, joint: &str) -> Option<&CalibrationOverride> {
        self.overrides.get(joint)
    }

    /// Merge `update` into the stored override for `joint` and persist.
    ///
    /// Only fields present in `update` change. Returns the merged record.
    pub fn upsert(
        &mut self,
        joint: &str,
        update: &CalibrationOverride,
    ) -> Result<CalibrationOverride, WebkinError> {
        let updates = CalibrationOverrides::from([(joint.to_string(), *update)]);
        let mut merged = self.upsert_many(&updates)?;
        Ok(merged.remove(joint).unwrap_or_default())
    }

    /// Merge every record of `updates` and persist them in one write.
    ///
    /// Nothing changes in memory when the write fails. Returns the merged
    /// records of the joints named in `updates`.
    pub fn upsert_many(
        &mut self,
        updates: &CalibrationOverrides,
    ) -> Result<CalibrationOverrides, WebkinError> {
        let mut next = self.overrides.clone();
        let mut merged = CalibrationOverrides::new();
        for (joint, update) in updates {
            let entry = next.entry(joint.clone()).or_default();
            entry.merge(update);
            merged.insert(joint.clone(), *entry);
        }
        self.commit(next)?;
        debug!(joints = ?merged.keys().collect::<Vec<_>>(), "calibration overrides stored");
        Ok(merged)
    }

    /// Drop the override for `joint` and persist. Returns whether one existed.
    pub fn remove(&mut self, joint: &str) -> Result<bool, WebkinError> {
        if !self.overrides.contains_key(joint) {
            return Ok(false);
        }
        let mut next = self.overrides.clone();
        next.remove(joint);
        self.commit(next)?;
        debug!(joint, "calibration override removed");
        Ok(true)
    }

    /// Rewrite the backing file. No-op for an in-memory store.
    pub fn save(&self) -> Result<(), WebkinError> {
        match &self.path {
            Some(path) => save_to(&self.overrides, path),
            None => Ok(()),
        }
    }

    /// Persist `next`, then make it the live map.
    fn commit(&mut self, next: CalibrationOverrides) -> Result<(), WebkinError> {
        if let Some(path) = &self.path {
            save_to(&next, path)?;
        }
        self.overrides = next;
        Ok(())
    }
}

/// Read overrides from `path`. Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<CalibrationOverrides>, WebkinError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        WebkinError::Store(format!("failed to read {}: {e}", path.display()))
    })?;
    if raw.trim().is_empty() {
        return Ok(Some(CalibrationOverrides::new()));
    }
    let overrides = serde_json::from_str(&raw).map_err(|e| {
        WebkinError::Store(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(overrides))
}

/// Write overrides to `path`, creating its parent directory if necessary.
pub(crate) fn save_to(overrides: &CalibrationOverrides, path: &Path) -> Result<(), WebkinError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            WebkinError::Store(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = serde_json::to_string_pretty(overrides)
        .map_err(|e| WebkinError::Serialization(e.to_string()))?;
    fs::write(path, raw)
        .map_err(|e| WebkinError::Store(format!("failed to write {}: {e}", path.display())))
}
