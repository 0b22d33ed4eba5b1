use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use trader_models::{validate_strategy_config, Analysis, Strategy, StrategyConfig, StrategyStatus};
use uuid::Uuid;

use crate::db::Store;
use crate::error::StoreError;
use crate::files::StrategyFiles;

/// How callers refer to a strategy: by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKey {
    Id(Uuid),
    Name(String),
}

impl StrategyKey {
    pub fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => StrategyKey::Id(id),
            Err(_) => StrategyKey::Name(raw.to_string()),
        }
    }
}

impl std::fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKey::Id(id) => write!(f, "{id}"),
            StrategyKey::Name(name) => f.write_str(name),
        }
    }
}

/// Keeps the strategy files and the SQLite index in step.
///
/// The file tree is the source of truth for strategy configs; the store
/// holds identity, status and the analysis history.
pub struct StrategyRegistry {
    files: StrategyFiles,
    store: Mutex<Store>,
}

impl StrategyRegistry {
    pub fn new(files: StrategyFiles, store: Store) -> Self {
        Self {
            files,
            store: Mutex::new(store),
        }
    }

    pub fn files(&self) -> &StrategyFiles {
        &self.files
    }

    fn store(&self) -> Result<MutexGuard<'_, Store>, StoreError> {
        self.store
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("store mutex poisoned: {e}")))
    }

    /// Validate, write `config.json`, then index it.
    pub fn create(&self, config: StrategyConfig) -> Result<Strategy, StoreError> {
        validate_strategy_config(&config)?;

        let store = self.store()?;
        if store.find_strategy_by_name(&config.name)?.is_some() || self.files.exists(&config.name)
        {
            return Err(StoreError::Conflict(config.name));
        }

        let strategy = Strategy::new(config);
        self.files.write(&strategy.config)?;
        if let Err(e) = store.insert_strategy(&strategy) {
            if let Err(cleanup) = self.files.remove(strategy.name()) {
                warn!(name = %strategy.name(), error = %cleanup, "Failed to roll back strategy file");
            }
            return Err(e);
        }

        info!(id = %strategy.id, name = %strategy.name(), "Strategy created");
        Ok(strategy)
    }

    pub fn get(&self, key: &StrategyKey) -> Result<Strategy, StoreError> {
        let store = self.store()?;
        let found = match key {
            StrategyKey::Id(id) => store.get_strategy(*id)?,
            StrategyKey::Name(name) => store.find_strategy_by_name(name)?,
        };
        found.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Strategy>, StoreError> {
        self.store()?.list_strategies()
    }

    pub fn set_status(&self, key: &StrategyKey, status: StrategyStatus) -> Result<Strategy, StoreError> {
        let mut strategy = self.get(key)?;
        if strategy.status == status {
            return Ok(strategy);
        }
        strategy.status = status;
        strategy.updated_at = Utc::now();
        self.store()?.update_strategy(&strategy)?;

        info!(name = %strategy.name(), status = %status, "Strategy status changed");
        Ok(strategy)
    }

    /// Remove the strategy's row, its analyses and its directory.
    pub fn delete(&self, key: &StrategyKey) -> Result<Strategy, StoreError> {
        let strategy = self.get(key)?;
        self.store()?.delete_strategy(strategy.id)?;
        self.files.remove(strategy.name())?;

        info!(id = %strategy.id, name = %strategy.name(), "Strategy deleted");
        Ok(strategy)
    }

    /// Register every `config.json` on disk that the store does not know yet.
    ///
    /// Invalid or unreadable files are logged and skipped. Returns the number
    /// of strategies imported.
    pub fn import_from_disk(&self) -> Result<usize, StoreError> {
        let mut imported = 0;
        for name in self.files.list()? {
            let store = self.store()?;
            if store.find_strategy_by_name(&name)?.is_some() {
                continue;
            }

            let config = match self.files.read(&name) {
                Ok(config) => config,
                Err(e) => {
                    warn!(name = %name, error = %e, "Skipping unreadable strategy file");
                    continue;
                }
            };
            if config.name != name {
                warn!(
                    dir = %name,
                    config_name = %config.name,
                    "Skipping strategy whose name does not match its directory"
                );
                continue;
            }
            if let Err(e) = validate_strategy_config(&config) {
                warn!(name = %name, error = %e, "Skipping invalid strategy file");
                continue;
            }

            store.insert_strategy(&Strategy::new(config))?;
            imported += 1;
        }

        if imported > 0 {
            info!(imported, "Imported strategies from disk");
        }
        Ok(imported)
    }

    pub fn record_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        self.store()?.insert_analysis(analysis)
    }

    pub fn analyses(&self, key: &StrategyKey, limit: usize) -> Result<Vec<Analysis>, StoreError> {
        let strategy = self.get(key)?;
        self.store()?.list_analyses(strategy.id, limit)
    }

    pub fn latest_analysis(&self, key: &StrategyKey) -> Result<Option<Analysis>, StoreError> {
        let strategy = self.get(key)?;
        self.store()?.latest_analysis(strategy.id)
    }

    /// Drop analyses older than `retention` measured from `now`.
    pub fn prune(&self, retention: Duration, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.store()?.prune_analyses(now - retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(StrategyKey::parse(&id.to_string()), StrategyKey::Id(id));
        assert_eq!(
            StrategyKey::parse("momentum"),
            StrategyKey::Name("momentum".to_string())
        );
        assert_eq!(StrategyKey::parse("momentum").to_string(), "momentum");
    }
}
