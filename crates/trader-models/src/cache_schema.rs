//! Layout of the shared market data cache.
//!
//! An external pipeline owns and writes the `cache_entries` table;
//! claude-trader opens it read-only. Timestamps are RFC 3339 strings.

pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Key builders matching what the pipeline writes.
pub mod key_patterns {
    /// `bars:AAPL:1h`
    pub fn bars(symbol: &str, interval: &str) -> String {
        format!("bars:{symbol}:{interval}")
    }

    pub fn quote(symbol: &str) -> String {
        format!("quote:{symbol}")
    }

    /// `indicator:rsi_14:AAPL`
    pub fn indicator(name: &str, symbol: &str) -> String {
        format!("indicator:{name}:{symbol}")
    }

    /// Market context series such as `ref:VIX`.
    pub fn reference_symbol(symbol: &str) -> String {
        format!("ref:{symbol}")
    }
}

/// One row of `cache_entries`, values still as stored.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}
