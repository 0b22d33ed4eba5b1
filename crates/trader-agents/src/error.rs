use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Failed to spawn {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    #[error("{binary} exited {status}: {stderr}")]
    Exit {
        binary: String,
        status: String,
        stderr: String,
    },

    #[error("Claude returned an empty response")]
    EmptyResponse,

    #[error("Analyst response parse error: {0}")]
    Parse(String),

    #[error("Analyst timed out after {0} seconds")]
    Timeout(u64),

    #[error("No prompt for analyst domain: {0}")]
    UnknownDomain(String),

    #[error("Symbol {symbol} is not part of strategy {strategy}")]
    UnknownSymbol { strategy: String, symbol: String },

    #[error("No analyst produced a result ({failed} failed, {skipped} skipped)")]
    NoSuccessfulAnalysts { failed: usize, skipped: usize },

    #[error("Cache error: {0}")]
    Cache(#[from] trader_cache::CacheError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
