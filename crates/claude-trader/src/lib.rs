//! Claude Trader: user-defined trading strategies analysed by Claude CLI
//! analysts over a shared market data cache.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use claude_trader::{build_state, load_config};
//! use claude_trader::store::StrategyKey;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = load_config("config/claude-trader.toml")?;
//! let state = build_state(&config)?;
//! let analysis = state.analyze(&StrategyKey::parse("aapl-dip"), None).await?;
//! println!("{} {}", analysis.signal, analysis.confidence);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod logging;
pub mod server;

pub use trader_agents as agents;
pub use trader_cache as cache;
pub use trader_models as models;
pub use trader_store as store;

pub use error::TraderError;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use trader_agents::{AnalysisPipeline, Analyst, ClaudeAnalyst, PipelineSettings};
use trader_cache::{CacheReader, MarketDataReader};
use trader_models::config::validate_config;
use trader_models::{validate_strategy_config, Analysis, StrategyConfig, StrategyStatus, TraderConfig};
use trader_store::{Store, StrategyFiles, StrategyKey, StrategyRegistry};

/// Read, parse and validate a TOML config file.
pub fn load_config(path: &str) -> Result<TraderConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    let config: TraderConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))?;
    validate_config(&config)
        .map_err(|errors| anyhow::anyhow!("Invalid config {path}:\n  {}", errors.join("\n  ")))?;
    Ok(config)
}

/// Check a strategy `config.json` without registering it.
///
/// Unreadable files and malformed JSON are reported as a single message;
/// otherwise every validation error is returned.
pub fn validate_strategy_file(path: impl AsRef<std::path::Path>) -> Result<StrategyConfig, Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| vec![format!("cannot read {}: {e}", path.display())])?;
    let config: StrategyConfig = serde_json::from_str(&raw)
        .map_err(|e| vec![format!("not a valid strategy config: {e}")])?;
    validate_strategy_config(&config).map_err(|errors| errors.messages().to_vec())?;
    Ok(config)
}

/// Open the market data cache, or fall back to an unavailable reader so
/// analyses still run (flagged degraded) while the cache file is missing.
pub fn build_cache(config: &TraderConfig) -> Arc<CacheReader> {
    match MarketDataReader::open(&config.cache.sqlite_path) {
        Ok(sqlite) => Arc::new(CacheReader::new(
            sqlite,
            config.cache.memory_max_capacity,
            Duration::from_secs(config.cache.memory_ttl_seconds),
        )),
        Err(e) => {
            warn!(
                path = %config.cache.sqlite_path,
                error = %e,
                "Market data cache unavailable, analyses will run degraded"
            );
            Arc::new(CacheReader::unavailable())
        }
    }
}

/// One Claude CLI analyst per enabled `[[agents.analysts]]` entry.
pub fn build_analysts(config: &TraderConfig) -> Vec<Arc<dyn Analyst>> {
    let agents = &config.agents;
    let timeout = Duration::from_secs(agents.analyst_timeout_seconds);
    agents
        .enabled_analysts()
        .map(|a| {
            Arc::new(ClaudeAnalyst::new(
                a.name.clone(),
                a.domain.clone(),
                agents.claude_binary.clone(),
                agents.model_for(a),
                timeout,
            )) as Arc<dyn Analyst>
        })
        .collect()
}

pub fn build_pipeline(config: &TraderConfig, analysts: Vec<Arc<dyn Analyst>>) -> AnalysisPipeline {
    AnalysisPipeline::new(
        analysts,
        build_cache(config),
        PipelineSettings::from_config(&config.agents, &config.cache.reference_symbols),
        &config.breaker,
    )
}

pub fn build_registry(config: &TraderConfig) -> Result<StrategyRegistry> {
    let store = Store::open(&config.storage.sqlite_path)
        .with_context(|| format!("Failed to open store: {}", config.storage.sqlite_path))?;
    Ok(StrategyRegistry::new(
        StrategyFiles::new(&config.storage.strategies_dir),
        store,
    ))
}

/// Registry plus pipeline built from config with Claude CLI analysts.
pub fn build_state(config: &TraderConfig) -> Result<AppState> {
    let registry = build_registry(config)?;
    let pipeline = build_pipeline(config, build_analysts(config));
    Ok(AppState::new(registry, pipeline))
}

/// Everything the API and CLI commands share.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StrategyRegistry>,
    pub pipeline: Arc<AnalysisPipeline>,
}

impl AppState {
    pub fn new(registry: StrategyRegistry, pipeline: AnalysisPipeline) -> Self {
        Self {
            registry: Arc::new(registry),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Analyse an active strategy and record the result.
    pub async fn analyze(
        &self,
        key: &StrategyKey,
        symbol: Option<&str>,
    ) -> Result<Analysis, TraderError> {
        let strategy = self.registry.get(key)?;
        if strategy.status != StrategyStatus::Active {
            return Err(TraderError::Inactive {
                name: strategy.name().to_string(),
                status: strategy.status,
            });
        }

        let analysis = self.pipeline.analyze(&strategy, symbol).await?;
        self.registry.record_analysis(&analysis)?;
        info!(id = %analysis.id, strategy = %analysis.strategy_name, "Analysis recorded");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn valid_strategy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"name": "aapl-dip", "symbols": ["AAPL"], "interval": "1h",
                "riskParams": {"stopLoss": "0.02", "maxPositionSize": "0.1"}}"#,
        );
        let config = validate_strategy_file(&path).unwrap();
        assert_eq!(config.name, "aapl-dip");
    }

    #[test]
    fn invalid_strategy_file_lists_every_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"name": "Bad Name", "symbols": [], "interval": "1h",
                "riskParams": {"stopLoss": "0.02", "maxPositionSize": "0.1"}}"#,
        );
        let errors = validate_strategy_file(&path).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("name:"));
        assert!(errors[1].starts_with("symbols:"));
    }

    #[test]
    fn malformed_or_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"name": "aapl-dip", "symbols": "#);
        let errors = validate_strategy_file(&path).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not a valid strategy config"));

        let missing = validate_strategy_file(dir.path().join("absent.json")).unwrap_err();
        assert!(missing[0].contains("cannot read"));
    }
}
