use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STRATEGY_SCHEMA_VERSION: u32 = 1;

/// Bar interval a strategy is evaluated on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn as_duration(&self) -> Duration {
        let minutes = match self {
            Interval::OneMinute => 1,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::FourHours => 240,
            Interval::OneDay => 1440,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown interval: {s}"))
    }
}

/// Risk limits attached to a strategy. All values are fractions (0.02 = 2%).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskParams {
    /// Distance from entry to the protective stop.
    pub stop_loss: Decimal,
    /// Distance from entry to the profit target. None = no fixed target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    /// Largest share of the portfolio a single position may use.
    pub max_position_size: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_loss: Option<Decimal>,
}

/// The on-disk `config.json` of a strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    /// Unique, filesystem-safe name. Also the strategy's directory name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub symbols: Vec<String>,
    pub interval: Interval,
    pub risk_params: RiskParams,
    /// Analyst domains consulted for this strategy. Empty = every enabled analyst.
    #[serde(default)]
    pub analysts: Vec<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    STRATEGY_SCHEMA_VERSION
}

impl StrategyConfig {
    /// Whether the given analyst domain should run for this strategy.
    pub fn wants_analyst(&self, domain: &str) -> bool {
        self.analysts.is_empty() || self.analysts.iter().any(|a| a == domain)
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Paused,
    Archived,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "active",
            StrategyStatus::Paused => "paused",
            StrategyStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StrategyStatus::Active),
            "paused" => Ok(StrategyStatus::Paused),
            "archived" => Ok(StrategyStatus::Archived),
            other => Err(format!("unknown strategy status: {other}")),
        }
    }
}

/// A registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: Uuid,
    pub config: StrategyConfig,
    pub status: StrategyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new(config: StrategyConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            config,
            status: StrategyStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_config_json_with_numeric_risk_params() {
        let json = r#"{
            "name": "momentum-btc",
            "description": "Buy strength on the 5 minute chart",
            "symbols": ["BTC-USD"],
            "interval": "5m",
            "riskParams": {"stopLoss": 0.02, "takeProfit": 0.05, "maxPositionSize": 0.1}
        }"#;

        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.interval, Interval::FiveMinutes);
        assert_eq!(config.risk_params.stop_loss, dec!(0.02));
        assert_eq!(config.risk_params.take_profit, Some(dec!(0.05)));
        assert_eq!(config.risk_params.max_daily_loss, None);
        assert!(config.analysts.is_empty());
        assert_eq!(config.schema_version, STRATEGY_SCHEMA_VERSION);
    }

    #[test]
    fn config_serializes_camel_case() {
        let config = StrategyConfig {
            name: "mean-revert".to_string(),
            description: String::new(),
            symbols: vec!["AAPL".to_string()],
            interval: Interval::OneHour,
            risk_params: RiskParams {
                stop_loss: dec!(0.03),
                take_profit: None,
                max_position_size: dec!(0.25),
                max_daily_loss: Some(dec!(0.05)),
            },
            analysts: vec!["technical".to_string()],
            schema_version: 1,
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["interval"], "1h");
        assert!(value["riskParams"].get("stopLoss").is_some());
        assert!(value["riskParams"].get("takeProfit").is_none());
        assert_eq!(value["schemaVersion"], 1);
    }

    #[test]
    fn interval_durations() {
        assert_eq!(Interval::OneMinute.as_duration(), Duration::from_secs(60));
        assert_eq!(Interval::FourHours.as_duration(), Duration::from_secs(4 * 3600));
        assert_eq!(Interval::OneDay.as_duration(), Duration::from_secs(86_400));
    }

    #[test]
    fn interval_from_str() {
        assert_eq!("15m".parse::<Interval>().unwrap(), Interval::FifteenMinutes);
        assert!("2m".parse::<Interval>().is_err());
    }

    #[test]
    fn status_text_matches_serde() {
        for status in [
            StrategyStatus::Active,
            StrategyStatus::Paused,
            StrategyStatus::Archived,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<StrategyStatus>().unwrap(), status);
        }
    }

    #[test]
    fn wants_analyst_defaults_to_all() {
        let mut config: StrategyConfig = serde_json::from_str(
            r#"{"name":"x","symbols":["SPY"],"interval":"1d",
                "riskParams":{"stopLoss":"0.01","maxPositionSize":"0.5"}}"#,
        )
        .unwrap();
        assert!(config.wants_analyst("macro"));

        config.analysts = vec!["technical".to_string()];
        assert!(config.wants_analyst("technical"));
        assert!(!config.wants_analyst("macro"));
    }
}
