use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Top-level configuration for claude-trader, read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraderConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address the REST API listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Where strategies and analyses are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Root of the `{name}/config.json` strategy tree.
    #[serde(default = "default_strategies_dir")]
    pub strategies_dir: String,
    /// SQLite database holding strategy metadata and the analysis history.
    #[serde(default = "default_store_path")]
    pub sqlite_path: String,
    #[serde(default = "default_retention_days")]
    pub analysis_retention_days: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            strategies_dir: default_strategies_dir(),
            sqlite_path: default_store_path(),
            analysis_retention_days: default_retention_days(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Configuration for the market data cache reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Path to the shared market data SQLite file (written by the data pipeline).
    #[serde(default = "default_cache_path")]
    pub sqlite_path: String,
    #[serde(default = "default_memory_capacity")]
    pub memory_max_capacity: u64,
    /// How long a read stays in the in-memory cache.
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
    /// Symbols included in every snapshot for market context.
    #[serde(default = "default_reference_symbols")]
    pub reference_symbols: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_cache_path(),
            memory_max_capacity: default_memory_capacity(),
            memory_ttl_seconds: default_memory_ttl(),
            reference_symbols: default_reference_symbols(),
        }
    }
}

/// Configuration for the Claude analysts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Executable invoked for every analyst call.
    #[serde(default = "default_claude_binary")]
    pub claude_binary: String,
    /// Default model for analysts without an override.
    #[serde(default = "default_analyst_model")]
    pub analyst_model: String,
    /// Budget for a whole analysis in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_seconds: u64,
    #[serde(default = "default_analyst_timeout")]
    pub analyst_timeout_seconds: u64,
    /// Below this, a buy or sell consensus is reported as hold.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    #[serde(default = "default_analysts")]
    pub analysts: Vec<AnalystConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            claude_binary: default_claude_binary(),
            analyst_model: default_analyst_model(),
            total_timeout_seconds: default_total_timeout(),
            analyst_timeout_seconds: default_analyst_timeout(),
            min_confidence: default_min_confidence(),
            analysts: default_analysts(),
        }
    }
}

impl AgentsConfig {
    pub fn enabled_analysts(&self) -> impl Iterator<Item = &AnalystConfig> {
        self.analysts.iter().filter(|a| a.enabled)
    }

    /// Model for an analyst, falling back to `analyst_model`.
    pub fn model_for(&self, analyst: &AnalystConfig) -> String {
        analyst
            .model
            .clone()
            .unwrap_or_else(|| self.analyst_model.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub name: String,
    pub domain: String,
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AnalystConfig {
    fn new(domain: &str) -> Self {
        Self {
            name: domain.to_string(),
            domain: domain.to_string(),
            model: None,
            enabled: true,
        }
    }
}

/// Per-analyst circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before allowing a trial.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// EnvFilter directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_strategies_dir() -> String {
    "strategies".to_string()
}
fn default_store_path() -> String {
    "data/claude_trader.db".to_string()
}
fn default_retention_days() -> u32 {
    90
}
fn default_cleanup_interval() -> u64 {
    3600
}
fn default_cache_path() -> String {
    "data/market_cache.db".to_string()
}
fn default_memory_capacity() -> u64 {
    10_000
}
fn default_memory_ttl() -> u64 {
    60
}
fn default_reference_symbols() -> Vec<String> {
    vec!["SPY".to_string(), "VIX".to_string()]
}
fn default_claude_binary() -> String {
    "claude".to_string()
}
fn default_analyst_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_total_timeout() -> u64 {
    120
}
fn default_analyst_timeout() -> u64 {
    45
}
fn default_min_confidence() -> Decimal {
    dec!(0.55)
}
fn default_analysts() -> Vec<AnalystConfig> {
    ["technical", "macro", "sentiment", "risk"]
        .into_iter()
        .map(AnalystConfig::new)
        .collect()
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown() -> u64 {
    300
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

/// Validate invariants across the config that serde alone cannot enforce.
///
/// Returns every violation found, one message each.
pub fn validate_config(config: &TraderConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    if config.server.bind.trim().is_empty() {
        errors.push("server.bind: must not be empty".into());
    }
    if config.storage.strategies_dir.trim().is_empty() {
        errors.push("storage.strategies_dir: must not be empty".into());
    }
    if config.storage.sqlite_path.trim().is_empty() {
        errors.push("storage.sqlite_path: must not be empty".into());
    }
    if config.storage.analysis_retention_days == 0 {
        errors.push("storage.analysis_retention_days: must be > 0".into());
    }
    if config.storage.cleanup_interval_seconds == 0 {
        errors.push("storage.cleanup_interval_seconds: must be > 0".into());
    }
    if config.cache.sqlite_path.trim().is_empty() {
        errors.push("cache.sqlite_path: must not be empty".into());
    }

    let agents = &config.agents;
    if agents.total_timeout_seconds == 0 {
        errors.push("agents.total_timeout_seconds: must be > 0".into());
    }
    if agents.analyst_timeout_seconds == 0 {
        errors.push("agents.analyst_timeout_seconds: must be > 0".into());
    }
    if agents.analyst_timeout_seconds > agents.total_timeout_seconds {
        errors.push(format!(
            "agents.analyst_timeout_seconds: {} exceeds total_timeout_seconds {}",
            agents.analyst_timeout_seconds, agents.total_timeout_seconds
        ));
    }
    if agents.min_confidence < Decimal::ZERO || agents.min_confidence > Decimal::ONE {
        errors.push(format!(
            "agents.min_confidence: {} must be within [0, 1]",
            agents.min_confidence
        ));
    }

    let mut names = HashSet::new();
    for analyst in &agents.analysts {
        if analyst.name.trim().is_empty() || analyst.domain.trim().is_empty() {
            errors.push("agents.analysts: name and domain must not be empty".into());
        }
        if !names.insert(analyst.name.as_str()) {
            errors.push(format!(
                "agents.analysts: duplicate analyst name '{}'",
                analyst.name
            ));
        }
    }
    if agents.enabled_analysts().next().is_none() {
        errors.push("agents.analysts: at least one analyst must be enabled".into());
    }

    if config.breaker.failure_threshold == 0 {
        errors.push("breaker.failure_threshold: must be > 0".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
