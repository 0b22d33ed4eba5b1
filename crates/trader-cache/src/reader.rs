use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use trader_models::cache_schema::key_patterns;

use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::sqlite::MarketDataReader;

/// Read-through market data cache: moka (hot) → SQLite (shared) → None.
///
/// SQLite hits are promoted into moka. `rusqlite::Connection` is not `Sync`,
/// so the reader sits behind a `Mutex`. A reader built with
/// [`CacheReader::unavailable`] has no database and fails every SQLite access
/// with [`CacheError::Unavailable`].
pub struct CacheReader {
    memory: MemoryCache,
    sqlite: Option<Mutex<MarketDataReader>>,
}

impl CacheReader {
    pub fn new(sqlite: MarketDataReader, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Some(Mutex::new(sqlite)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            memory: MemoryCache::new(1, Duration::from_secs(1)),
            sqlite: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.sqlite.is_some()
    }

    fn db(&self) -> Result<MutexGuard<'_, MarketDataReader>, CacheError> {
        self.sqlite
            .as_ref()
            .ok_or_else(|| CacheError::Unavailable("no market data database".to_string()))?
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Raw JSON for a key, checking moka first.
    pub async fn get_json(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(json) = self.memory.get(key).await {
            return Ok(Some(json));
        }

        let row = self.db()?.get(key)?;
        match row {
            Some(row) => {
                self.memory
                    .insert(key.to_string(), row.value_json.clone())
                    .await;
                Ok(Some(row.value_json))
            }
            None => Ok(None),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_json(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Latest traded price from `quote:{symbol}`. Accepts a JSON number or a
    /// decimal string in the `price` field.
    pub async fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>, CacheError> {
        let quote: Option<serde_json::Value> = self.get(&key_patterns::quote(symbol)).await?;
        Ok(quote.and_then(|q| price_from_value(q.get("price")?)))
    }

    /// Everything the cache knows that matters for analysing `symbol`.
    ///
    /// Merges every live entry tagged with the symbol with the `ref:` and
    /// `quote:` entries of each reference symbol into one JSON object keyed by
    /// cache key. Values that are not valid JSON are skipped.
    pub async fn market_snapshot(
        &self,
        symbol: &str,
        reference_symbols: &[String],
    ) -> Result<serde_json::Value, CacheError> {
        let rows = self.db()?.get_by_symbol(symbol)?;

        let mut map = serde_json::Map::new();
        for row in rows {
            match serde_json::from_str::<serde_json::Value>(&row.value_json) {
                Ok(value) => {
                    map.insert(row.key, value);
                }
                Err(e) => {
                    warn!(key = %row.key, error = %e, "Skipping unparsable cache entry");
                }
            }
        }

        for reference in reference_symbols {
            for key in [
                key_patterns::reference_symbol(reference),
                key_patterns::quote(reference),
            ] {
                if map.contains_key(&key) {
                    continue;
                }
                if let Ok(Some(value)) = self.get::<serde_json::Value>(&key).await {
                    map.insert(key, value);
                }
            }
        }

        debug!(symbol, entries = map.len(), "Built market snapshot");
        Ok(serde_json::Value::Object(map))
    }

    /// Drop everything held in memory so the next read goes to SQLite.
    pub fn clear_hot_cache(&self) {
        self.memory.invalidate_all();
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

fn price_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}
