//! Local enablement list (`mod-list.json`)
//!
//! The file has the shape `{"mods": [{"name": "...", "enabled": true}, ...]}`.
//! Entry order is kept across load/save but carries no meaning.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// One `mod-list.json` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnablementEntry {
    pub name: String,
    pub enabled: bool,
    /// Pinned version, written by the game for some entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl EnablementEntry {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            version: None,
        }
    }
}

/// Parsed `mod-list.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnablementList {
    #[serde(default)]
    pub mods: Vec<EnablementEntry>,
}

impl EnablementList {
    /// The list a fresh Factorio install starts with.
    pub fn with_base() -> Self {
        Self {
            mods: vec![EnablementEntry::new("base", true)],
        }
    }

    /// Read a list from disk. A missing file is an `Io` error; callers decide
    /// whether that means "no entries".
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::decode(path.display().to_string(), e))
    }

    /// Write the list through a temporary file and rename it into place, so an
    /// interrupted write never leaves a truncated file behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::decode(path.display().to_string(), e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        let tmp = temp_path(path);
        fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| SyncError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(SyncError::io(path, e));
        }
        Ok(())
    }

    /// With duplicate names the last entry wins, matching `flags`.
    pub fn get(&self, name: &str) -> Option<&EnablementEntry> {
        self.mods.iter().rev().find(|e| e.name == name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).map(|e| e.enabled).unwrap_or(false)
    }

    /// Overwrite the flag on every entry named `name`, appending a new entry
    /// if it is unknown.
    pub fn set(&mut self, name: &str, enabled: bool) {
        let mut found = false;
        for entry in self.mods.iter_mut().filter(|e| e.name == name) {
            entry.enabled = enabled;
            found = true;
        }
        if !found {
            self.mods.push(EnablementEntry::new(name, enabled));
        }
    }

    /// name -> enabled. With duplicate names the last entry wins.
    pub fn flags(&self) -> HashMap<&str, bool> {
        self.mods
            .iter()
            .map(|e| (e.name.as_str(), e.enabled))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.mods.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialised access to one `mod-list.json`.
///
/// Every read-modify-write goes through `update`, which holds a lock across
/// load, merge and save so concurrent toggles cannot lose each other's writes.
#[derive(Debug)]
pub struct LocalEnablementStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalEnablementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<EnablementList> {
        let _guard = self.lock.lock().await;
        EnablementList::load(&self.path).await
    }

    /// Like `load`, but a missing file yields the fresh-install list.
    pub async fn load_or_default(&self) -> Result<EnablementList> {
        let _guard = self.lock.lock().await;
        Self::read_or_default(&self.path).await
    }

    pub async fn save(&self, list: &EnablementList) -> Result<()> {
        let _guard = self.lock.lock().await;
        list.save(&self.path).await
    }

    /// Load, apply `f`, save, all under the store lock. Returns the saved list.
    pub async fn update<F>(&self, f: F) -> Result<EnablementList>
    where
        F: FnOnce(&mut EnablementList),
    {
        let _guard = self.lock.lock().await;
        let mut list = Self::read_or_default(&self.path).await?;
        f(&mut list);
        list.save(&self.path).await?;
        Ok(list)
    }

    async fn read_or_default(path: &Path) -> Result<EnablementList> {
        match EnablementList::load(path).await {
            Ok(list) => Ok(list),
            Err(e) if e.is_missing_file() => {
                tracing::debug!("{} not found, starting from an empty list", path.display());
                Ok(EnablementList::with_base())
            }
            Err(e) => Err(e),
        }
    }
}
