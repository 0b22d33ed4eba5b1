use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use trader_models::validate::is_valid_strategy_name;
use trader_models::StrategyConfig;

use crate::error::StoreError;

const CONFIG_FILE: &str = "config.json";

/// The on-disk strategy tree: `{root}/{name}/config.json`.
#[derive(Debug, Clone)]
pub struct StrategyFiles {
    root: PathBuf,
}

impl StrategyFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.dir_for(name).join(CONFIG_FILE)
    }

    /// Names are joined onto the root, so anything that could escape it is refused.
    fn checked(&self, name: &str) -> Result<(), StoreError> {
        if is_valid_strategy_name(name) {
            Ok(())
        } else {
            Err(StoreError::NotFound(name.to_string()))
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        is_valid_strategy_name(name) && self.config_path(name).is_file()
    }

    /// Write `config.json` atomically: a temp file in the same directory is
    /// renamed over the target.
    pub fn write(&self, config: &StrategyConfig) -> Result<PathBuf, StoreError> {
        self.checked(&config.name)?;
        let dir = self.dir_for(&config.name);
        fs::create_dir_all(&dir)?;

        let target = dir.join(CONFIG_FILE);
        let tmp = dir.join(format!(".{CONFIG_FILE}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            let mut json = serde_json::to_vec_pretty(config)?;
            json.push(b'\n');
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;

        debug!(path = %target.display(), "Wrote strategy config");
        Ok(target)
    }

    pub fn read(&self, name: &str) -> Result<StrategyConfig, StoreError> {
        self.checked(name)?;
        let path = self.config_path(name);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Delete the strategy's directory. Missing directories are not an error.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.checked(name)?;
        match fs::remove_dir_all(self.dir_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Sorted names of sub-directories that contain a `config.json`.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if entry.path().join(CONFIG_FILE).is_file() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
