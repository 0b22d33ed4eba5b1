//! End-to-end analysis scenarios.
//!
//! Each test seeds an in-memory market data cache, runs the full pipeline
//! with rule-based analysts and checks the resulting consensus.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use trader_agents::test_support::{FailingAnalyst, ScenarioMockAnalyst};
use trader_agents::{AgentError, Analyst, AnalysisPipeline, BreakerState, PipelineSettings};
use trader_cache::{CacheReader, MarketDataReader};
use trader_models::cache_schema::CacheRow;
use trader_models::{
    AnalystOutcome, BreakerConfig, Interval, RiskParams, Signal, Strategy, StrategyConfig,
};

fn row(key: &str, category: &str, symbol: &str, value: serde_json::Value) -> CacheRow {
    let now = Utc::now();
    CacheRow {
        key: key.to_string(),
        category: category.to_string(),
        value_json: value.to_string(),
        source: "test".to_string(),
        symbol: Some(symbol.to_string()),
        created_at: now.to_rfc3339(),
        expires_at: (now + ChronoDuration::hours(1)).to_rfc3339(),
        updated_at: now.to_rfc3339(),
    }
}

fn bars(start: f64, step: f64, count: usize) -> serde_json::Value {
    let bars: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let close = start + step * i as f64;
            serde_json::json!({
                "open": close - step / 2.0,
                "high": close + 0.5,
                "low": close - 0.5,
                "close": close,
                "volume": 10_000.0,
                "timestamp": i * 300_000,
            })
        })
        .collect();
    serde_json::Value::Array(bars)
}

fn cache(rows: Vec<CacheRow>) -> Arc<CacheReader> {
    let sqlite = MarketDataReader::open_in_memory().unwrap();
    for row in &rows {
        sqlite.insert(row).unwrap();
    }
    Arc::new(CacheReader::new(sqlite, 100, Duration::from_secs(60)))
}

fn strategy() -> Strategy {
    Strategy::new(StrategyConfig {
        name: "aapl-swing".to_string(),
        description: "Swing AAPL on 5 minute bars".to_string(),
        symbols: vec!["AAPL".to_string()],
        interval: Interval::FiveMinutes,
        risk_params: RiskParams {
            stop_loss: dec!(0.02),
            take_profit: Some(dec!(0.05)),
            max_position_size: dec!(0.1),
            max_daily_loss: Some(dec!(0.03)),
        },
        analysts: vec![],
        schema_version: 1,
    })
}

fn panel() -> Vec<Arc<dyn Analyst>> {
    ScenarioMockAnalyst::full_panel()
        .into_iter()
        .map(|a| Arc::new(a) as Arc<dyn Analyst>)
        .collect()
}

fn pipeline(analysts: Vec<Arc<dyn Analyst>>, cache: Arc<CacheReader>) -> AnalysisPipeline {
    AnalysisPipeline::new(
        analysts,
        cache,
        PipelineSettings {
            total_timeout: Duration::from_secs(5),
            min_confidence: dec!(0.4),
            reference_symbols: vec!["SPY".to_string(), "VIX".to_string()],
        },
        &BreakerConfig {
            failure_threshold: 2,
            cooldown_seconds: 300,
        },
    )
}

fn bullish_market() -> Vec<CacheRow> {
    vec![
        row("indicator:rsi_14:AAPL", "indicator", "AAPL", serde_json::json!({"value": [35.0, 30.0, 27.0]})),
        row("indicator:sma_20:AAPL", "indicator", "AAPL", serde_json::json!({"value": [148.0, 149.0, 150.0]})),
        row("indicator:ema_20:AAPL", "indicator", "AAPL", serde_json::json!({"value": [149.0, 150.5, 152.0]})),
        row(
            "indicator:macd:AAPL",
            "indicator",
            "AAPL",
            serde_json::json!({"macd_line": [-0.5, 0.2, 0.8], "signal_line": [0.1, 0.1, 0.3], "histogram": [-0.6, 0.1, 0.5]}),
        ),
        row("indicator:atr_14:AAPL", "indicator", "AAPL", serde_json::json!({"value": [1.2]})),
        row("bars:AAPL:5m", "market_data", "AAPL", bars(148.0, 1.0, 5)),
        row("quote:AAPL", "market_data", "AAPL", serde_json::json!({"price": 152.0})),
        row("sentiment:news:AAPL", "sentiment", "AAPL", serde_json::json!({"score": 0.6, "count": 8})),
        row("sentiment:social:AAPL", "sentiment", "AAPL", serde_json::json!({"score": 0.45, "mentions": 1200})),
        row("ref:VIX", "reference_symbol", "VIX", serde_json::json!({"value": [15.5, 14.8, 14.2]})),
        row("ref:SPY", "reference_symbol", "SPY", serde_json::json!({"value": [500.0, 502.0, 505.0, 509.0]})),
    ]
}

#[tokio::test]
async fn bullish_setup_produces_buy_with_risk_levels() {
    let pipeline = pipeline(panel(), cache(bullish_market()));
    let analysis = pipeline.analyze(&strategy(), None).await.unwrap();

    assert_eq!(analysis.signal, Signal::Buy);
    assert!(!analysis.degraded);
    assert_eq!(analysis.analyst_reports.len(), 4);
    assert!(analysis
        .analyst_reports
        .iter()
        .all(|r| r.outcome == AnalystOutcome::Succeeded));

    let risk = analysis.risk.expect("quote cached, risk levels expected");
    assert_eq!(risk.reference_price, dec!(152));
    assert_eq!(risk.stop_loss_price, dec!(148.96));
    assert_eq!(risk.take_profit_price, Some(dec!(159.6)));
    assert_eq!(risk.max_position_size, dec!(0.1));

    let technical = analysis
        .analyst_reports
        .iter()
        .find(|r| r.domain == "technical")
        .unwrap();
    assert!(technical
        .data_sources_used
        .contains(&"bars:AAPL:5m".to_string()));
}

#[tokio::test]
async fn risk_off_market_produces_sell() {
    let pipeline = pipeline(
        panel(),
        cache(vec![
            row("indicator:rsi_14:AAPL", "indicator", "AAPL", serde_json::json!({"value": [68.0, 74.0, 78.0]})),
            row("indicator:sma_20:AAPL", "indicator", "AAPL", serde_json::json!({"value": [155.0]})),
            row("indicator:ema_20:AAPL", "indicator", "AAPL", serde_json::json!({"value": [152.0]})),
            row("indicator:bollinger_bands:AAPL", "indicator", "AAPL", serde_json::json!({"percent_b": [0.9, 1.1]})),
            row("bars:AAPL:5m", "market_data", "AAPL", bars(160.0, -1.5, 6)),
            row("quote:AAPL", "market_data", "AAPL", serde_json::json!({"price": "152.50"})),
            row("sentiment:news:AAPL", "sentiment", "AAPL", serde_json::json!({"score": -0.7, "count": 12})),
            row("ref:VIX", "reference_symbol", "VIX", serde_json::json!({"value": [26.0, 33.0, 38.5]})),
            row("ref:SPY", "reference_symbol", "SPY", serde_json::json!({"value": [510.0, 500.0, 492.0, 480.0]})),
        ]),
    );

    let analysis = pipeline.analyze(&strategy(), Some("AAPL")).await.unwrap();
    assert_eq!(analysis.signal, Signal::Sell);
    assert!(analysis.confidence > dec!(0.4));

    let risk = analysis.risk.unwrap();
    assert_eq!(risk.stop_loss_price, dec!(155.55));
    assert_eq!(risk.take_profit_price, Some(dec!(144.875)));
}

#[tokio::test]
async fn empty_cache_yields_low_confidence_hold() {
    let pipeline = pipeline(panel(), cache(vec![]));
    let analysis = pipeline.analyze(&strategy(), None).await.unwrap();

    assert_eq!(analysis.signal, Signal::Hold);
    assert_eq!(analysis.confidence, dec!(0.3));
    assert!(analysis.risk.is_none());
    assert!(!analysis.degraded);
}

#[tokio::test]
async fn failing_analysts_trip_their_breakers() {
    let failing = Arc::new(FailingAnalyst::new("sentiment"));
    let analysts: Vec<Arc<dyn Analyst>> = vec![
        Arc::new(ScenarioMockAnalyst::technical()),
        failing.clone(),
    ];
    let pipeline = pipeline(analysts, cache(bullish_market()));

    for _ in 0..3 {
        let analysis = pipeline.analyze(&strategy(), None).await.unwrap();
        assert!(analysis.degraded);
        assert_eq!(analysis.signal, Signal::Buy);
    }

    assert_eq!(failing.calls(), 2);
    let states = pipeline.breaker_states();
    assert!(states.contains(&("sentiment".to_string(), BreakerState::Open)));
    assert!(states.contains(&("technical".to_string(), BreakerState::Closed)));
}

#[tokio::test]
async fn only_failures_is_an_error() {
    let pipeline = pipeline(
        vec![Arc::new(FailingAnalyst::new("macro")) as Arc<dyn Analyst>],
        cache(bullish_market()),
    );
    let err = pipeline.analyze(&strategy(), None).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::NoSuccessfulAnalysts {
            failed: 1,
            skipped: 0
        }
    ));
}
