pub mod analysis;
pub mod cache_schema;
pub mod config;
pub mod strategy;
pub mod validate;

pub use analysis::{
    Analysis, AnalystOutcome, AnalystReport, AnalystRequest, AnalystResponse, RiskLevels, Signal,
};
pub use cache_schema::CacheRow;
pub use config::{
    AgentsConfig, AnalystConfig, BreakerConfig, CacheConfig, LogFormat, LoggingConfig,
    ServerConfig, StorageConfig, TraderConfig,
};
pub use strategy::{Interval, RiskParams, Strategy, StrategyConfig, StrategyStatus};
pub use validate::{validate_strategy_config, ValidationErrors};
