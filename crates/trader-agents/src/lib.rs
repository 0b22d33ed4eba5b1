pub mod aggregate;
pub mod analyst;
pub mod breaker;
pub mod claude_cli;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod prompts;

pub mod test_support;

pub use aggregate::{aggregate, risk_levels, Consensus};
pub use analyst::{Analyst, ClaudeAnalyst};
pub use breaker::{BreakerPermit, BreakerState, CircuitBreaker};
pub use error::AgentError;
pub use pipeline::{AnalysisPipeline, PipelineSettings};
