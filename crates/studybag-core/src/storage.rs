//! Client-local key/value storage
//!
//! A single JSON object of string values kept in the user's config directory.
//! Plays the role a browser's local storage plays for a web front end: the
//! credential and the backpack each live in one named slot.
//!
//! Every operation goes to disk, so any number of handles on the same path
//! (credential store, backpack, a second process) see each other's writes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage file {path:?} is not a JSON object of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not determine config directory")]
    NoConfigDir,
}

type Entries = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/studybag/storage.json`
    pub fn default_location() -> Result<PathBuf, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(config_dir.join("studybag").join("storage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut entries = self.read()?;
        Ok(entries.remove(key))
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StorageError> {
        let mut entries = self.read_for_write()?;
        entries.insert(key.to_string(), value.into());
        self.write(&entries)
    }

    /// Removing an absent key does not touch the file.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read_for_write()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<Entries, StorageError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// A corrupt file is moved aside to `<name>.bak` so writes start over
    /// from an empty object instead of failing forever.
    fn read_for_write(&self) -> Result<Entries, StorageError> {
        match self.read() {
            Err(StorageError::Corrupt { path, source }) => {
                let backup = backup_path(&path);
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %source,
                    "resetting corrupt storage file"
                );
                fs::rename(&path, &backup).map_err(|source| StorageError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Entries::new())
            }
            other => other,
        }
    }

    fn write(&self, entries: &Entries) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content =
            serde_json::to_string_pretty(entries).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, content).map_err(io_err)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
