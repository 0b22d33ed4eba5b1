use std::time::Duration;

use async_trait::async_trait;
use trader_models::{AnalystRequest, AnalystResponse};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_analyst_response;
use crate::prompts::analyst_prompt;

/// One domain analyst. Mockable for testing.
#[async_trait]
pub trait Analyst: Send + Sync {
    fn name(&self) -> &str;
    fn domain(&self) -> &str;

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalystResponse, AgentError>;
}

/// An analyst backed by the Claude CLI.
pub struct ClaudeAnalyst {
    pub name: String,
    pub domain: String,
    pub cli_config: ClaudeCliConfig,
}

impl ClaudeAnalyst {
    pub fn new(name: String, domain: String, binary: String, model: String, timeout: Duration) -> Self {
        Self {
            name,
            domain,
            cli_config: ClaudeCliConfig {
                binary,
                model,
                timeout,
            },
        }
    }
}

#[async_trait]
impl Analyst for ClaudeAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalystResponse, AgentError> {
        let system_prompt = analyst_prompt(&self.domain)
            .ok_or_else(|| AgentError::UnknownDomain(self.domain.clone()))?;

        let user_prompt = serde_json::to_string(request)?;
        let raw_output = invoke_claude(&system_prompt, &user_prompt, &self.cli_config).await?;
        let mut response = parse_analyst_response(&raw_output)?;

        // The model echoes these back; ours are authoritative.
        response.request_id = request.request_id;
        response.analyst_name = self.name.clone();
        response.domain = self.domain.clone();
        Ok(response)
    }
}
