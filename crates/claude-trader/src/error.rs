use thiserror::Error;
use trader_agents::AgentError;
use trader_models::StrategyStatus;
use trader_store::StoreError;

#[derive(Error, Debug)]
pub enum TraderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Strategy {name} is {status}, only active strategies can be analysed")]
    Inactive { name: String, status: StrategyStatus },
}
