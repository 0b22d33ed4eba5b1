use std::collections::HashSet;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::strategy::{StrategyConfig, STRATEGY_SCHEMA_VERSION};

const MAX_NAME_LEN: usize = 64;
const MAX_SYMBOLS: usize = 20;
const MAX_SYMBOL_LEN: usize = 12;

/// Every problem found in a strategy config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} validation error{}: {}",
            self.0.len(),
            if self.0.len() == 1 { "" } else { "s" },
            self.0.join("; ")
        )
    }
}

impl std::error::Error for ValidationErrors {}

/// Check a strategy config for everything serde cannot enforce.
///
/// All violations are collected so callers can report them together.
pub fn validate_strategy_config(config: &StrategyConfig) -> Result<(), ValidationErrors> {
    let mut errors: Vec<String> = Vec::new();

    validate_name(&config.name, &mut errors);
    validate_symbols(&config.symbols, &mut errors);
    validate_risk(config, &mut errors);
    validate_analysts(&config.analysts, &mut errors);

    if config.schema_version != STRATEGY_SCHEMA_VERSION {
        errors.push(format!(
            "schemaVersion: unsupported version {} (expected {STRATEGY_SCHEMA_VERSION})",
            config.schema_version
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// Names become directory names, so only a conservative character set is allowed.
pub fn is_valid_strategy_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    name.len() <= MAX_NAME_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn validate_name(name: &str, errors: &mut Vec<String>) {
    if name.is_empty() {
        errors.push("name: must not be empty".into());
    } else if name.len() > MAX_NAME_LEN {
        errors.push(format!("name: longer than {MAX_NAME_LEN} characters"));
    } else if !is_valid_strategy_name(name) {
        errors.push(format!(
            "name: '{name}' must start with a lowercase letter or digit and contain only [a-z0-9_-]"
        ));
    } else if Uuid::parse_str(name).is_ok() {
        // Strategies are looked up by id or name; a UUID name would read as an id.
        errors.push(format!("name: '{name}' must not be a UUID"));
    }
}

fn validate_symbols(symbols: &[String], errors: &mut Vec<String>) {
    if symbols.is_empty() {
        errors.push("symbols: at least one symbol is required".into());
        return;
    }
    if symbols.len() > MAX_SYMBOLS {
        errors.push(format!("symbols: at most {MAX_SYMBOLS} allowed, got {}", symbols.len()));
    }

    let mut seen = HashSet::new();
    for symbol in symbols {
        let well_formed = !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && symbol
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-');
        if !well_formed {
            errors.push(format!("symbols: '{symbol}' is not a valid ticker"));
        }
        if !seen.insert(symbol.as_str()) {
            errors.push(format!("symbols: '{symbol}' listed more than once"));
        }
    }
}

fn in_range(value: Decimal, min_exclusive: Decimal, max_inclusive: Decimal) -> bool {
    value > min_exclusive && value <= max_inclusive
}

fn validate_risk(config: &StrategyConfig, errors: &mut Vec<String>) {
    let risk = &config.risk_params;

    if !in_range(risk.stop_loss, Decimal::ZERO, dec!(0.5)) {
        errors.push(format!(
            "riskParams.stopLoss: {} must be in (0, 0.5]",
            risk.stop_loss
        ));
    }

    if let Some(take_profit) = risk.take_profit {
        if !in_range(take_profit, Decimal::ZERO, dec!(5)) {
            errors.push(format!(
                "riskParams.takeProfit: {take_profit} must be in (0, 5]"
            ));
        } else if take_profit <= risk.stop_loss {
            errors.push(format!(
                "riskParams.takeProfit: {take_profit} must exceed stopLoss {}",
                risk.stop_loss
            ));
        }
    }

    if !in_range(risk.max_position_size, Decimal::ZERO, Decimal::ONE) {
        errors.push(format!(
            "riskParams.maxPositionSize: {} must be in (0, 1]",
            risk.max_position_size
        ));
    }

    if let Some(max_daily_loss) = risk.max_daily_loss {
        if !in_range(max_daily_loss, Decimal::ZERO, Decimal::ONE) {
            errors.push(format!(
                "riskParams.maxDailyLoss: {max_daily_loss} must be in (0, 1]"
            ));
        }
    }
}

fn validate_analysts(analysts: &[String], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for analyst in analysts {
        if analyst.trim().is_empty() {
            errors.push("analysts: entries must not be empty".into());
        } else if !seen.insert(analyst.as_str()) {
            errors.push(format!("analysts: '{analyst}' listed more than once"));
        }
    }
}
