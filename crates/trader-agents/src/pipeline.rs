use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};
use trader_cache::CacheReader;
use trader_models::analysis::ANALYSIS_SCHEMA_VERSION;
use trader_models::{
    AgentsConfig, Analysis, AnalystOutcome, AnalystReport, AnalystRequest, AnalystResponse,
    BreakerConfig, Strategy,
};
use uuid::Uuid;

use crate::aggregate::{aggregate, risk_levels};
use crate::analyst::Analyst;
use crate::breaker::{BreakerState, CircuitBreaker};
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Budget for every analyst call of one analysis.
    pub total_timeout: Duration,
    pub min_confidence: Decimal,
    /// Added to every market snapshot.
    pub reference_symbols: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(agents: &AgentsConfig, reference_symbols: &[String]) -> Self {
        Self {
            total_timeout: Duration::from_secs(agents.total_timeout_seconds),
            min_confidence: agents.min_confidence,
            reference_symbols: reference_symbols.to_vec(),
        }
    }
}

struct Slot {
    analyst: Arc<dyn Analyst>,
    breaker: Arc<CircuitBreaker>,
}

/// Runs one analysis: snapshot the cache, fan out to analysts, aggregate.
pub struct AnalysisPipeline {
    slots: Vec<Slot>,
    cache: Arc<CacheReader>,
    settings: PipelineSettings,
}

impl AnalysisPipeline {
    pub fn new(
        analysts: Vec<Arc<dyn Analyst>>,
        cache: Arc<CacheReader>,
        settings: PipelineSettings,
        breaker: &BreakerConfig,
    ) -> Self {
        let cooldown = Duration::from_secs(breaker.cooldown_seconds);
        let slots = analysts
            .into_iter()
            .map(|analyst| Slot {
                breaker: Arc::new(CircuitBreaker::new(
                    analyst.name(),
                    breaker.failure_threshold,
                    cooldown,
                )),
                analyst,
            })
            .collect();

        Self {
            slots,
            cache,
            settings,
        }
    }

    pub fn analyst_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.analyst.name().to_string())
            .collect()
    }

    pub fn breaker_states(&self) -> Vec<(String, BreakerState)> {
        self.slots
            .iter()
            .map(|s| (s.analyst.name().to_string(), s.breaker.state()))
            .collect()
    }

    pub fn cache(&self) -> &CacheReader {
        &self.cache
    }

    /// Analyse `symbol` (default: the strategy's first symbol).
    pub async fn analyze(
        &self,
        strategy: &Strategy,
        symbol: Option<&str>,
    ) -> Result<Analysis, AgentError> {
        let start = Instant::now();
        let symbol = resolve_symbol(strategy, symbol)?;
        info!(strategy = %strategy.name(), symbol = %symbol, "Starting analysis");

        let mut degraded = false;
        let market_data = match self
            .cache
            .market_snapshot(&symbol, &self.settings.reference_symbols)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Market data unavailable, analysing without it");
                degraded = true;
                serde_json::json!({})
            }
        };
        let reference_price = match self.cache.latest_price(&symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No reference price");
                None
            }
        };

        let deadline = tokio::time::Instant::now() + self.settings.total_timeout;
        let timeout_secs = self.settings.total_timeout.as_secs();

        // Tasks live in a JoinSet so dropping this future aborts them. Each
        // task carries its breaker permit and settles it where the call ends.
        let mut tasks: JoinSet<(usize, Result<AnalystResponse, AgentError>, Duration)> =
            JoinSet::new();
        let mut task_slots: HashMap<task::Id, usize> = HashMap::new();
        let mut outcomes: Vec<(usize, AnalystReport, Option<AnalystResponse>)> = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            let analyst = Arc::clone(&slot.analyst);
            if !strategy.config.wants_analyst(analyst.domain()) {
                continue;
            }
            let Some(permit) = slot.breaker.try_acquire() else {
                warn!(analyst = %analyst.name(), "Circuit breaker open, skipping analyst");
                outcomes.push((index, skipped_report(analyst.as_ref()), None));
                continue;
            };

            let request = AnalystRequest {
                request_id: Uuid::new_v4(),
                strategy: strategy.config.clone(),
                symbol: symbol.clone(),
                domain: analyst.domain().to_string(),
                market_data: market_data.clone(),
            };

            let handle = tasks.spawn(async move {
                let analyst_start = Instant::now();
                let result = tokio::time::timeout_at(deadline, analyst.analyze(&request))
                    .await
                    .unwrap_or(Err(AgentError::Timeout(timeout_secs)));
                match &result {
                    Ok(_) => permit.success(),
                    Err(_) => permit.failure(),
                }
                (index, result, analyst_start.elapsed())
            });
            task_slots.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (index, Ok(response), elapsed))) => {
                    let name = self.slots[index].analyst.name().to_string();
                    let domain = self.slots[index].analyst.domain().to_string();
                    info!(
                        analyst = %name,
                        signal = %response.signal,
                        confidence = %response.confidence,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Analyst succeeded"
                    );
                    let report = AnalystReport {
                        analyst_name: name,
                        domain,
                        outcome: AnalystOutcome::Succeeded,
                        signal: Some(response.signal),
                        confidence: response.confidence,
                        reasoning: response.reasoning.clone(),
                        data_sources_used: response.data_sources_consulted.clone(),
                        elapsed_ms: elapsed.as_millis() as u64,
                    };
                    outcomes.push((index, report, Some(response)));
                }
                Ok((_, (index, Err(e), elapsed))) => {
                    let slot = &self.slots[index];
                    let name = slot.analyst.name().to_string();
                    warn!(analyst = %name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "Analyst failed");
                    let report = failed_report(
                        name,
                        slot.analyst.domain().to_string(),
                        format!("Analyst failed: {e}"),
                        elapsed,
                    );
                    outcomes.push((index, report, None));
                }
                Err(e) => {
                    let Some(&index) = task_slots.get(&e.id()) else {
                        error!(error = %e, "Untracked analyst task failed");
                        continue;
                    };
                    let slot = &self.slots[index];
                    let name = slot.analyst.name().to_string();
                    error!(analyst = %name, error = %e, "Analyst task panicked");
                    // The permit was dropped unsettled during unwinding.
                    slot.breaker.record_failure();
                    let report = failed_report(
                        name,
                        slot.analyst.domain().to_string(),
                        format!("Analyst task panicked: {e}"),
                        Duration::ZERO,
                    );
                    outcomes.push((index, report, None));
                }
            }
        }

        outcomes.sort_by_key(|(index, _, _)| *index);
        let mut reports: Vec<AnalystReport> = Vec::with_capacity(outcomes.len());
        let mut responses: Vec<AnalystResponse> = Vec::new();
        for (_, report, response) in outcomes {
            reports.push(report);
            responses.extend(response);
        }

        let failed = count_outcome(&reports, AnalystOutcome::Failed);
        let skipped = count_outcome(&reports, AnalystOutcome::Skipped);
        let consensus = aggregate(&responses, self.settings.min_confidence)
            .ok_or(AgentError::NoSuccessfulAnalysts { failed, skipped })?;

        let risk = reference_price.map(|p| risk_levels(consensus.signal, p, &strategy.config.risk_params));
        let analysis = Analysis {
            id: Uuid::new_v4(),
            schema_version: ANALYSIS_SCHEMA_VERSION,
            strategy_id: strategy.id,
            strategy_name: strategy.name().to_string(),
            symbol,
            signal: consensus.signal,
            confidence: consensus.confidence,
            reasoning: consensus.reasoning,
            risk,
            analyst_reports: reports,
            degraded: degraded || failed > 0 || skipped > 0,
            created_at: Utc::now(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            strategy = %analysis.strategy_name,
            symbol = %analysis.symbol,
            signal = %analysis.signal,
            confidence = %analysis.confidence,
            degraded = analysis.degraded,
            elapsed_ms = analysis.processing_time_ms,
            "Analysis complete"
        );

        Ok(analysis)
    }
}

fn resolve_symbol(strategy: &Strategy, requested: Option<&str>) -> Result<String, AgentError> {
    let unknown = |symbol: &str| AgentError::UnknownSymbol {
        strategy: strategy.name().to_string(),
        symbol: symbol.to_string(),
    };
    match requested {
        Some(symbol) if strategy.config.has_symbol(symbol) => Ok(symbol.to_string()),
        Some(symbol) => Err(unknown(symbol)),
        None => strategy
            .config
            .symbols
            .first()
            .cloned()
            .ok_or_else(|| unknown("")),
    }
}

fn skipped_report(analyst: &dyn Analyst) -> AnalystReport {
    AnalystReport {
        analyst_name: analyst.name().to_string(),
        domain: analyst.domain().to_string(),
        outcome: AnalystOutcome::Skipped,
        signal: None,
        confidence: Decimal::ZERO,
        reasoning: "Circuit breaker open".to_string(),
        data_sources_used: vec![],
        elapsed_ms: 0,
    }
}

fn failed_report(name: String, domain: String, reasoning: String, elapsed: Duration) -> AnalystReport {
    AnalystReport {
        analyst_name: name,
        domain,
        outcome: AnalystOutcome::Failed,
        signal: None,
        confidence: Decimal::ZERO,
        reasoning,
        data_sources_used: vec![],
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

fn count_outcome(reports: &[AnalystReport], outcome: AnalystOutcome) -> usize {
    reports.iter().filter(|r| r.outcome == outcome).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::tests::MockAnalyst;
    use rust_decimal_macros::dec;
    use trader_cache::MarketDataReader;
    use trader_models::{Interval, RiskParams, Signal, StrategyConfig};

    fn strategy(analysts: &[&str]) -> Strategy {
        Strategy::new(StrategyConfig {
            name: "aapl-dip".to_string(),
            description: String::new(),
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            interval: Interval::OneHour,
            risk_params: RiskParams {
                stop_loss: dec!(0.02),
                take_profit: Some(dec!(0.04)),
                max_position_size: dec!(0.1),
                max_daily_loss: None,
            },
            analysts: analysts.iter().map(|a| a.to_string()).collect(),
            schema_version: 1,
        })
    }

    fn shared(analyst: MockAnalyst) -> Arc<dyn Analyst> {
        Arc::new(analyst)
    }

    fn settings(timeout: Duration) -> PipelineSettings {
        PipelineSettings {
            total_timeout: timeout,
            min_confidence: dec!(0.5),
            reference_symbols: vec![],
        }
    }

    fn empty_cache() -> Arc<CacheReader> {
        let sqlite = MarketDataReader::open_in_memory().unwrap();
        Arc::new(CacheReader::new(sqlite, 100, Duration::from_secs(60)))
    }

    fn pipeline(analysts: Vec<Arc<dyn Analyst>>, cache: Arc<CacheReader>) -> AnalysisPipeline {
        AnalysisPipeline::new(
            analysts,
            cache,
            settings(Duration::from_secs(5)),
            &BreakerConfig {
                failure_threshold: 2,
                cooldown_seconds: 300,
            },
        )
    }

    #[tokio::test]
    async fn all_succeed() {
        let pipeline = pipeline(
            vec![
                shared(MockAnalyst::new("technical", Signal::Buy, dec!(0.8))),
                shared(MockAnalyst::new("macro", Signal::Buy, dec!(0.7))),
            ],
            empty_cache(),
        );

        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        assert_eq!(analysis.symbol, "AAPL");
        assert_eq!(analysis.signal, Signal::Buy);
        assert_eq!(analysis.confidence, dec!(0.75));
        assert_eq!(analysis.analyst_reports.len(), 2);
        assert!(!analysis.degraded);
        // No quote cached.
        assert!(analysis.risk.is_none());
    }

    #[tokio::test]
    async fn failures_degrade_but_do_not_abort() {
        let pipeline = pipeline(
            vec![
                shared(MockAnalyst::new("technical", Signal::Sell, dec!(0.9))),
                shared(MockAnalyst::failing("sentiment")),
            ],
            empty_cache(),
        );

        let analysis = pipeline.analyze(&strategy(&[]), Some("MSFT")).await.unwrap();
        assert_eq!(analysis.symbol, "MSFT");
        assert_eq!(analysis.signal, Signal::Sell);
        assert!(analysis.degraded);
        let failed = analysis
            .analyst_reports
            .iter()
            .find(|r| r.analyst_name == "sentiment")
            .unwrap();
        assert_eq!(failed.outcome, AnalystOutcome::Failed);
        assert!(failed.reasoning.contains("Mock failure"));
    }

    #[tokio::test]
    async fn strategy_selects_analysts() {
        let technical = Arc::new(MockAnalyst::new("technical", Signal::Buy, dec!(0.8)));
        let macro_analyst = Arc::new(MockAnalyst::new("macro", Signal::Sell, dec!(0.9)));
        let pipeline = pipeline(
            vec![
                technical.clone() as Arc<dyn Analyst>,
                macro_analyst.clone() as Arc<dyn Analyst>,
            ],
            empty_cache(),
        );

        let analysis = pipeline
            .analyze(&strategy(&["technical"]), None)
            .await
            .unwrap();
        assert_eq!(analysis.analyst_reports.len(), 1);
        assert_eq!(technical.calls(), 1);
        assert_eq!(macro_analyst.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected() {
        let pipeline = pipeline(
            vec![shared(MockAnalyst::new("technical", Signal::Buy, dec!(0.8)))],
            empty_cache(),
        );
        let err = pipeline.analyze(&strategy(&[]), Some("TSLA")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownSymbol { symbol, .. } if symbol == "TSLA"));
    }

    #[tokio::test]
    async fn no_successes_is_an_error() {
        let pipeline = pipeline(
            vec![
                shared(MockAnalyst::failing("technical")),
                shared(MockAnalyst::failing("macro")),
            ],
            empty_cache(),
        );
        let err = pipeline.analyze(&strategy(&[]), None).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::NoSuccessfulAnalysts { failed: 2, skipped: 0 }
        ));
    }

    #[tokio::test]
    async fn open_breaker_skips_analyst() {
        let flaky = Arc::new(MockAnalyst::failing("sentiment"));
        let pipeline = pipeline(
            vec![
                shared(MockAnalyst::new("technical", Signal::Buy, dec!(0.8))),
                flaky.clone() as Arc<dyn Analyst>,
            ],
            empty_cache(),
        );

        for _ in 0..2 {
            pipeline.analyze(&strategy(&[]), None).await.unwrap();
        }
        assert_eq!(flaky.calls(), 2);

        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        assert_eq!(flaky.calls(), 2);
        let skipped = analysis
            .analyst_reports
            .iter()
            .find(|r| r.analyst_name == "sentiment")
            .unwrap();
        assert_eq!(skipped.outcome, AnalystOutcome::Skipped);
        assert!(pipeline
            .breaker_states()
            .contains(&("sentiment".to_string(), BreakerState::Open)));
    }

    #[tokio::test]
    async fn slow_analyst_times_out() {
        let pipeline = AnalysisPipeline::new(
            vec![
                shared(MockAnalyst::new("technical", Signal::Hold, dec!(0.6))),
                shared(MockAnalyst::slow("macro", Duration::from_secs(5))),
            ],
            empty_cache(),
            settings(Duration::from_millis(100)),
            &BreakerConfig::default(),
        );

        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        assert_eq!(analysis.signal, Signal::Hold);
        let slow = analysis
            .analyst_reports
            .iter()
            .find(|r| r.analyst_name == "macro")
            .unwrap();
        assert_eq!(slow.outcome, AnalystOutcome::Failed);
        assert!(slow.reasoning.contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_analysis_releases_half_open_trial() {
        let macro_analyst = Arc::new(MockAnalyst::slow("macro", Duration::from_millis(200)));
        let pipeline = AnalysisPipeline::new(
            vec![
                shared(MockAnalyst::new("technical", Signal::Buy, dec!(0.8))),
                macro_analyst.clone() as Arc<dyn Analyst>,
            ],
            empty_cache(),
            settings(Duration::from_secs(5)),
            &BreakerConfig {
                failure_threshold: 1,
                cooldown_seconds: 0,
            },
        );
        pipeline.slots[1].breaker.record_failure();
        assert_eq!(pipeline.slots[1].breaker.state(), BreakerState::HalfOpen);

        // The caller gives up while the macro trial is still running.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), pipeline.analyze(&strategy(&[]), None))
                .await;
        assert!(cancelled.is_err());
        assert_eq!(macro_analyst.calls(), 1);
        // Let the runtime reap the aborted task.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        assert_eq!(macro_analyst.calls(), 2);
        let macro_report = analysis
            .analyst_reports
            .iter()
            .find(|r| r.analyst_name == "macro")
            .unwrap();
        assert_eq!(macro_report.outcome, AnalystOutcome::Succeeded);
        assert!(pipeline
            .breaker_states()
            .contains(&("macro".to_string(), BreakerState::Closed)));
    }

    #[tokio::test]
    async fn cancelled_analysis_aborts_analyst_tasks() {
        let slow = Arc::new(MockAnalyst::slow("macro", Duration::from_millis(100)));
        let pipeline = pipeline(vec![slow.clone() as Arc<dyn Analyst>], empty_cache());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), pipeline.analyze(&strategy(&[]), None))
                .await;
        assert!(cancelled.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // An aborted task drops its analyst future, and with it the request.
        assert_eq!(Arc::strong_count(&slow), 2);
    }

    #[tokio::test]
    async fn reports_follow_analyst_order() {
        let pipeline = pipeline(
            vec![
                shared(MockAnalyst::slow("technical", Duration::from_millis(50))),
                shared(MockAnalyst::new("macro", Signal::Buy, dec!(0.7))),
                shared(MockAnalyst::failing("sentiment")),
            ],
            empty_cache(),
        );
        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        let names: Vec<&str> = analysis
            .analyst_reports
            .iter()
            .map(|r| r.analyst_name.as_str())
            .collect();
        assert_eq!(names, ["technical", "macro", "sentiment"]);
    }

    #[tokio::test]
    async fn unavailable_cache_degrades() {
        let pipeline = pipeline(
            vec![shared(MockAnalyst::new("technical", Signal::Buy, dec!(0.9)))],
            Arc::new(CacheReader::unavailable()),
        );
        let analysis = pipeline.analyze(&strategy(&[]), None).await.unwrap();
        assert!(analysis.degraded);
        assert_eq!(analysis.signal, Signal::Buy);
    }
}
