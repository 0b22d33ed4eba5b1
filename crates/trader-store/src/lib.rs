//! Persistence for strategies and their analysis history.
//!
//! Strategy definitions live on disk as `{root}/{name}/config.json`; the
//! SQLite store indexes them and keeps the time-series of analyses.

pub mod db;
pub mod error;
pub mod files;
pub mod registry;
pub mod schema;

pub use db::Store;
pub use error::StoreError;
pub use files::StrategyFiles;
pub use registry::{StrategyKey, StrategyRegistry};
