use chrono::Utc;
use rusqlite::{Connection, OpenFlags, Row};
use trader_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};

use crate::error::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT key, category, value_json, source, symbol, created_at, expires_at, updated_at \
     FROM cache_entries";

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        category: row.get(1)?,
        value_json: row.get(2)?,
        source: row.get(3)?,
        symbol: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// SQLite accessor for the market data table.
///
/// Production opens the pipeline's database read-only. Entries whose
/// `expires_at` has passed are filtered out by every query.
pub struct MarketDataReader {
    conn: Connection,
}

impl MarketDataReader {
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Writable in-memory database with the schema applied, for seeding in tests.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE key = ?1 AND expires_at > ?2"
        ))?;

        match stmt.query_row(rusqlite::params![key, now], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Sqlite(e)),
        }
    }

    pub fn get_by_symbol(&self, symbol: &str) -> Result<Vec<CacheRow>, CacheError> {
        self.query_many(
            &format!("{SELECT_COLUMNS} WHERE symbol = ?1 AND expires_at > ?2 ORDER BY key"),
            symbol,
        )
    }

    pub fn get_by_prefix(&self, prefix: &str) -> Result<Vec<CacheRow>, CacheError> {
        self.query_many(
            &format!("{SELECT_COLUMNS} WHERE key LIKE ?1 AND expires_at > ?2 ORDER BY key"),
            &format!("{prefix}%"),
        )
    }

    fn query_many(&self, sql: &str, arg: &str) -> Result<Vec<CacheRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(rusqlite::params![arg, now], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert or replace an entry. Only meaningful on the in-memory database.
    pub fn insert(&self, row: &CacheRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.key,
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}
