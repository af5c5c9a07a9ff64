//! Preference store implementations
//!
//! - [`MemoryPreferences`] - process-local store for tests and ephemeral hosts
//! - [`FilePreferences`] - JSON file with exclusive-lock writes; reads always hit
//!   the file so values written by another process are observed

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use butler_core::prelude::*;

use crate::services::PreferenceStore;

/// In-memory preference store
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, bool>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: bool) -> Self {
        let prefs = Self::new();
        if let Ok(mut values) = prefs.values.lock() {
            values.insert(key.to_string(), value);
        }
        prefs
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).copied())
            .unwrap_or(default)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::platform("preference store poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON-file preference store
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    /// Open (and create if needed) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::preferences(&path, format!("Failed to create directory: {}", e))
                })?;
            }
        }
        if !path.exists() {
            std::fs::write(&path, "{}")
                .map_err(|e| Error::preferences(&path, format!("Failed to create: {}", e)))?;
        }
        debug!("Preference store at {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, bool>> {
        let mut file = std::fs::File::open(&self.path)?;
        file.lock_shared()
            .map_err(|e| Error::preferences(&self.path, format!("Failed to lock: {}", e)))?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

impl PreferenceStore for FilePreferences {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.read_all() {
            Ok(values) => values.get(key).copied().unwrap_or(default),
            Err(e) => {
                warn!("Failed to read preferences {:?}: {}", self.path, e);
                default
            }
        }
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::preferences(&self.path, format!("Failed to open: {}", e)))?;

        // Lock is released when file is dropped
        file.lock_exclusive()
            .map_err(|e| Error::preferences(&self.path, format!("Failed to lock: {}", e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let mut values: HashMap<String, bool> = if content.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding corrupt preferences {:?}: {}", self.path, e);
                HashMap::new()
            })
        };
        values.insert(key.to_string(), value);

        let serialized = serde_json::to_string_pretty(&values)?;
        file.set_len(0)?;
        file.rewind()?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
