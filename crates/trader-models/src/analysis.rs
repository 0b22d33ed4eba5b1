use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::strategy::StrategyConfig;

pub const ANALYSIS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Signal::Buy),
            "sell" => Ok(Signal::Sell),
            "hold" => Ok(Signal::Hold),
            other => Err(format!("unknown signal: {other}")),
        }
    }
}

/// Request sent to an analyst (serialized as JSON to Claude CLI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystRequest {
    pub request_id: Uuid,
    pub strategy: StrategyConfig,
    pub symbol: String,
    /// The analyst's assigned domain (e.g., "technical", "risk").
    pub domain: String,
    /// Market data snapshot from the cache, keyed by cache key.
    pub market_data: serde_json::Value,
}

/// Response parsed from an analyst's Claude CLI stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystResponse {
    pub request_id: Uuid,
    pub analyst_name: String,
    pub domain: String,
    pub signal: Signal,
    /// 0.0 to 1.0 conviction in `signal`.
    pub confidence: Decimal,
    pub reasoning: String,
    #[serde(default)]
    pub analysis: serde_json::Value,
    #[serde(default)]
    pub data_sources_consulted: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalystOutcome {
    Succeeded,
    Failed,
    /// Not invoked because its circuit breaker was open.
    Skipped,
}

/// How one analyst contributed to an analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystReport {
    pub analyst_name: String,
    pub domain: String,
    pub outcome: AnalystOutcome,
    pub signal: Option<Signal>,
    pub confidence: Decimal,
    pub reasoning: String,
    pub data_sources_used: Vec<String>,
    pub elapsed_ms: u64,
}

/// Price levels derived from the strategy's risk params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskLevels {
    pub reference_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub max_position_size: Decimal,
}

/// The stored result of analysing one symbol of a strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub id: Uuid,
    pub schema_version: u32,
    pub strategy_id: Uuid,
    pub strategy_name: String,
    pub symbol: String,
    pub signal: Signal,
    pub confidence: Decimal,
    pub reasoning: String,
    /// None when no reference price was available.
    pub risk: Option<RiskLevels>,
    pub analyst_reports: Vec<AnalystReport>,
    /// True if any analyst failed or was skipped, or market data was unavailable.
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}
