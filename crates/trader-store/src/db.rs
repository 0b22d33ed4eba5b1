use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use trader_models::{Analysis, Strategy, StrategyConfig, StrategyStatus};
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::STORE_DDL;

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

struct StrategyRow {
    id: String,
    status: String,
    config_json: String,
    created_at: String,
    updated_at: String,
}

const STRATEGY_COLUMNS: &str =
    "SELECT id, status, config_json, created_at, updated_at FROM strategies";

fn map_strategy_row(row: &Row<'_>) -> rusqlite::Result<StrategyRow> {
    Ok(StrategyRow {
        id: row.get(0)?,
        status: row.get(1)?,
        config_json: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl StrategyRow {
    fn into_strategy(self) -> Result<Strategy, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("strategy id '{}': {e}", self.id)))?;
        let status = self
            .status
            .parse::<StrategyStatus>()
            .map_err(StoreError::Corrupt)?;
        let config: StrategyConfig = serde_json::from_str(&self.config_json)?;
        Ok(Strategy {
            id,
            config,
            status,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// SQLite store for strategy metadata and the analysis time-series.
///
/// Opened read-write in WAL mode so readers are not blocked by the writer.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(STORE_DDL)?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Strategies
    // -----------------------------------------------------------------------

    /// Insert a new strategy. A duplicate name is reported as `Conflict`.
    pub fn insert_strategy(&self, strategy: &Strategy) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO strategies (id, name, status, config_json, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                strategy.id.to_string(),
                strategy.config.name,
                strategy.status.as_str(),
                serde_json::to_string(&strategy.config)?,
                ts(&strategy.created_at),
                ts(&strategy.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(strategy.config.name.clone()))
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Persist status, config and `updated_at` of an existing strategy.
    pub fn update_strategy(&self, strategy: &Strategy) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE strategies SET status = ?2, config_json = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![
                strategy.id.to_string(),
                strategy.status.as_str(),
                serde_json::to_string(&strategy.config)?,
                ts(&strategy.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(strategy.id.to_string()));
        }
        Ok(())
    }

    pub fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>, StoreError> {
        self.conn
            .prepare_cached(&format!("{STRATEGY_COLUMNS} WHERE id = ?1"))?
            .query_row([id.to_string()], map_strategy_row)
            .optional()?
            .map(StrategyRow::into_strategy)
            .transpose()
    }

    pub fn find_strategy_by_name(&self, name: &str) -> Result<Option<Strategy>, StoreError> {
        self.conn
            .prepare_cached(&format!("{STRATEGY_COLUMNS} WHERE name = ?1"))?
            .query_row([name], map_strategy_row)
            .optional()?
            .map(StrategyRow::into_strategy)
            .transpose()
    }

    pub fn list_strategies(&self) -> Result<Vec<Strategy>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{STRATEGY_COLUMNS} ORDER BY name"))?;
        let rows = stmt
            .query_map([], map_strategy_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StrategyRow::into_strategy).collect()
    }

    /// Delete a strategy and its analyses. Returns false if it did not exist.
    pub fn delete_strategy(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM analyses WHERE strategy_id = ?1",
            [id.to_string()],
        )?;
        let deleted = tx.execute("DELETE FROM strategies WHERE id = ?1", [id.to_string()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // -----------------------------------------------------------------------
    // Analyses
    // -----------------------------------------------------------------------

    pub fn insert_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO analyses \
             (id, strategy_id, symbol, signal, confidence, degraded, analysis_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                analysis.id.to_string(),
                analysis.strategy_id.to_string(),
                analysis.symbol,
                analysis.signal.as_str(),
                analysis.confidence.to_string(),
                analysis.degraded,
                serde_json::to_string(analysis)?,
                ts(&analysis.created_at),
            ],
        )?;
        Ok(())
    }

    /// Most recent analyses for a strategy, newest first.
    pub fn list_analyses(&self, strategy_id: Uuid, limit: usize) -> Result<Vec<Analysis>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT analysis_json FROM analyses WHERE strategy_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![strategy_id.to_string(), limit as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    pub fn latest_analysis(&self, strategy_id: Uuid) -> Result<Option<Analysis>, StoreError> {
        Ok(self.list_analyses(strategy_id, 1)?.into_iter().next())
    }

    pub fn count_analyses(&self, strategy_id: Uuid) -> Result<usize, StoreError> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM analyses WHERE strategy_id = ?1",
            [strategy_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete analyses created before `cutoff`. Returns the number removed.
    pub fn prune_analyses(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM analyses WHERE created_at < ?1",
            [ts(&cutoff)],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use trader_models::{Interval, RiskParams, Signal};

    fn strategy(name: &str) -> Strategy {
        Strategy::new(StrategyConfig {
            name: name.to_string(),
            description: String::new(),
            symbols: vec!["SPY".to_string()],
            interval: Interval::OneDay,
            risk_params: RiskParams {
                stop_loss: dec!(0.05),
                take_profit: Some(dec!(0.1)),
                max_position_size: dec!(0.5),
                max_daily_loss: None,
            },
            analysts: vec![],
            schema_version: 1,
        })
    }

    fn analysis(strategy: &Strategy, created_at: DateTime<Utc>) -> Analysis {
        Analysis {
            id: Uuid::new_v4(),
            schema_version: 1,
            strategy_id: strategy.id,
            strategy_name: strategy.config.name.clone(),
            symbol: "SPY".to_string(),
            signal: Signal::Buy,
            confidence: dec!(0.7),
            reasoning: "test".to_string(),
            risk: None,
            analyst_reports: vec![],
            degraded: false,
            created_at,
            processing_time_ms: 10,
        }
    }

    #[test]
    fn strategy_roundtrip_by_id_and_name() {
        let store = Store::open_in_memory().unwrap();
        let s = strategy("alpha");
        store.insert_strategy(&s).unwrap();

        let by_id = store.get_strategy(s.id).unwrap().unwrap();
        assert_eq!(by_id.config, s.config);
        assert_eq!(by_id.status, StrategyStatus::Active);
        // Stored at microsecond precision.
        assert_eq!(ts(&by_id.created_at), ts(&s.created_at));

        let by_name = store.find_strategy_by_name("alpha").unwrap().unwrap();
        assert_eq!(by_name.id, s.id);
        assert!(store.find_strategy_by_name("beta").unwrap().is_none());
        assert!(store.get_strategy(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.insert_strategy(&strategy("alpha")).unwrap();
        let err = store.insert_strategy(&strategy("alpha")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(name) if name == "alpha"));
    }

    #[test]
    fn update_and_list_sorted() {
        let store = Store::open_in_memory().unwrap();
        let mut b = strategy("bravo");
        store.insert_strategy(&b).unwrap();
        store.insert_strategy(&strategy("alpha")).unwrap();

        b.status = StrategyStatus::Paused;
        b.updated_at = Utc::now();
        store.update_strategy(&b).unwrap();

        let all = store.list_strategies().unwrap();
        assert_eq!(
            all.iter().map(|s| s.name()).collect::<Vec<_>>(),
            vec!["alpha", "bravo"]
        );
        assert_eq!(all[1].status, StrategyStatus::Paused);

        let ghost = strategy("ghost");
        assert!(matches!(
            store.update_strategy(&ghost),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn analyses_newest_first_with_limit() {
        let store = Store::open_in_memory().unwrap();
        let s = strategy("alpha");
        store.insert_strategy(&s).unwrap();

        let now = Utc::now();
        for minutes in [30, 10, 20] {
            store
                .insert_analysis(&analysis(&s, now - Duration::minutes(minutes)))
                .unwrap();
        }

        let listed = store.list_analyses(s.id, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at > listed[1].created_at);
        assert_eq!(ts(&listed[0].created_at), ts(&(now - Duration::minutes(10))));

        let latest = store.latest_analysis(s.id).unwrap().unwrap();
        assert_eq!(latest.id, listed[0].id);
        assert_eq!(store.count_analyses(s.id).unwrap(), 3);
    }

    #[test]
    fn analysis_requires_existing_strategy() {
        let store = Store::open_in_memory().unwrap();
        let orphan = strategy("orphan");
        assert!(store.insert_analysis(&analysis(&orphan, Utc::now())).is_err());
    }

    #[test]
    fn delete_cascades_to_analyses() {
        let mut store = Store::open_in_memory().unwrap();
        let s = strategy("alpha");
        store.insert_strategy(&s).unwrap();
        store.insert_analysis(&analysis(&s, Utc::now())).unwrap();

        assert!(store.delete_strategy(s.id).unwrap());
        assert!(!store.delete_strategy(s.id).unwrap());
        assert_eq!(store.count_analyses(s.id).unwrap(), 0);
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let store = Store::open_in_memory().unwrap();
        let s = strategy("alpha");
        store.insert_strategy(&s).unwrap();

        let now = Utc::now();
        store
            .insert_analysis(&analysis(&s, now - Duration::days(100)))
            .unwrap();
        store
            .insert_analysis(&analysis(&s, now - Duration::days(91)))
            .unwrap();
        store.insert_analysis(&analysis(&s, now)).unwrap();

        let deleted = store.prune_analyses(now - Duration::days(90)).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_analyses(s.id).unwrap(), 1);
    }

    #[test]
    fn file_backed_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trader.db");
        let store = Store::open(path.to_str().unwrap()).unwrap();
        store.insert_strategy(&strategy("alpha")).unwrap();
        drop(store);

        let reopened = Store::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reopened.list_strategies().unwrap().len(), 1);
    }
}
