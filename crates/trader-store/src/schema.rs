/// Tables owned by claude-trader.
///
/// `analyses` is append-mostly and queried newest-first per strategy, hence
/// the composite index. Timestamps are RFC 3339 UTC strings, which sort
/// chronologically as text.
pub const STORE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS strategies (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    status      TEXT NOT NULL,
    config_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS analyses (
    id            TEXT PRIMARY KEY,
    strategy_id   TEXT NOT NULL REFERENCES strategies(id) ON DELETE CASCADE,
    symbol        TEXT NOT NULL,
    signal        TEXT NOT NULL,
    confidence    TEXT NOT NULL,
    degraded      INTEGER NOT NULL,
    analysis_json TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_strategy_time ON analyses(strategy_id, created_at);
";
