//! Tests against the real Claude CLI.
//!
//! Ignored by default. They need the `claude` CLI on PATH with working
//! credentials. Run explicitly with:
//! ```bash
//! cargo test -p trader-agents --test cli_integration -- --ignored
//! ```

use std::time::Duration;

use rust_decimal_macros::dec;
use trader_agents::claude_cli::{check_cli_available, invoke_claude, ClaudeCliConfig};
use trader_agents::parser::extract_json;
use trader_agents::{Analyst, ClaudeAnalyst};
use trader_models::{AnalystRequest, Interval, RiskParams, StrategyConfig};
use uuid::Uuid;

const BINARY: &str = "claude";

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available(BINARY).await,
        "claude CLI not found on PATH"
    );
}

/// Catches changes in the CLI's output format that would break extraction.
#[tokio::test]
#[ignore]
async fn cli_output_is_parseable_json() {
    if !check_cli_available(BINARY).await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        timeout: Duration::from_secs(30),
        ..ClaudeCliConfig::default()
    };
    let system_prompt = concat!(
        "You are a test agent. Respond ONLY with a JSON object, no other text.\n",
        "The JSON must have exactly these fields:\n",
        "- \"status\": the string \"ok\"\n",
        "- \"echo\": repeat back the user's message exactly\n",
    );

    let raw = invoke_claude(system_prompt, "ping", &config)
        .await
        .expect("Claude CLI invocation failed");
    let json = extract_json(&raw)
        .unwrap_or_else(|e| panic!("{e}\nRaw output:\n---\n{raw}\n---"));
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["status"], "ok", "Unexpected response: {parsed}");
}

#[tokio::test]
#[ignore]
async fn technical_analyst_round_trip() {
    if !check_cli_available(BINARY).await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let analyst = ClaudeAnalyst::new(
        "technical".to_string(),
        "technical".to_string(),
        BINARY.to_string(),
        ClaudeCliConfig::default().model,
        Duration::from_secs(60),
    );
    let request = AnalystRequest {
        request_id: Uuid::new_v4(),
        strategy: StrategyConfig {
            name: "aapl-dip".to_string(),
            description: "Buy oversold dips in AAPL".to_string(),
            symbols: vec!["AAPL".to_string()],
            interval: Interval::OneHour,
            risk_params: RiskParams {
                stop_loss: dec!(0.02),
                take_profit: Some(dec!(0.05)),
                max_position_size: dec!(0.1),
                max_daily_loss: None,
            },
            analysts: vec![],
            schema_version: 1,
        },
        symbol: "AAPL".to_string(),
        domain: "technical".to_string(),
        market_data: serde_json::json!({
            "indicator:rsi_14:AAPL": {"value": [34.0, 29.0, 26.5]},
            "quote:AAPL": {"price": 182.4},
        }),
    };

    let response = analyst.analyze(&request).await.expect("analysis failed");
    assert_eq!(response.request_id, request.request_id);
    assert!(response.confidence >= dec!(0) && response.confidence <= dec!(1));
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available(BINARY).await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        model: "nonexistent-model-12345".to_string(),
        timeout: Duration::from_secs(15),
        ..ClaudeCliConfig::default()
    };
    let result = invoke_claude("You are a test.", "hello", &config).await;
    assert!(result.is_err(), "Expected error, got: {result:?}");
}
