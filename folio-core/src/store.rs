use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::controls::ThemeMode;

/// The only state that outlives a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: ThemeMode,
}

pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Option<Preferences>>;
    fn save(&self, preferences: &Preferences) -> Result<()>;
}

pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create preference directory at {:?}", root))?;
        Ok(Self {
            path: root.join("preferences.json"),
        })
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Option<Preferences>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open preference file {:?}", self.path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let preferences = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode preference file {:?}", self.path))?;
        Ok(Some(preferences))
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(preferences)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp preference file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Option<Preferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<Preferences>> {
        Ok(*self.inner.lock())
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        *self.inner.lock() = Some(*preferences);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_theme() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs")).unwrap();
        assert!(store.load().unwrap().is_none());

        store
            .save(&Preferences {
                theme: ThemeMode::Dark,
            })
            .unwrap();
        let restored = store.load().unwrap().unwrap();
        assert_eq!(restored.theme, ThemeMode::Dark);

        let raw = std::fs::read_to_string(dir.path().join("prefs/preferences.json")).unwrap();
        assert!(raw.contains("\"dark\""));
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("preferences.json"), b"{oops").unwrap();
        assert!(store.load().is_err());
    }
}
