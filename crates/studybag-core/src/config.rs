use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::answer::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// `<config_dir>/studybag/config.json`. The API key is not kept here; it
/// lives in local storage next to the backpack.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub storage_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            model: None,
            base_url: None,
            storage_path: None,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// `STUDYBAG_MODEL` and `STUDYBAG_BASE_URL` win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(model) = var("STUDYBAG_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model = Some(model);
        }
        if let Some(base_url) = var("STUDYBAG_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::storage::LocalStorage::default_location()?),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("studybag").join("config.json"))
    }
}
