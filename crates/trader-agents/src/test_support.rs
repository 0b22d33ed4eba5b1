//! Rule-based analysts for tests and demos.
//!
//! `ScenarioMockAnalyst` reads `market_data` and applies the scoring rules
//! written into the domain prompts, so pipeline tests see the signals a well
//! behaved model would produce without calling the CLI.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use trader_models::cache_schema::key_patterns;
use trader_models::{AnalystRequest, AnalystResponse, Signal};

use crate::analyst::Analyst;
use crate::error::AgentError;

pub struct ScenarioMockAnalyst {
    pub name: String,
    pub domain: String,
}

impl ScenarioMockAnalyst {
    pub fn new(name: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn technical() -> Self {
        Self::new("technical", "technical")
    }

    pub fn macro_analyst() -> Self {
        Self::new("macro", "macro")
    }

    pub fn sentiment() -> Self {
        Self::new("sentiment", "sentiment")
    }

    pub fn risk() -> Self {
        Self::new("risk", "risk")
    }

    /// One analyst per known domain.
    pub fn full_panel() -> Vec<Self> {
        vec![
            Self::technical(),
            Self::macro_analyst(),
            Self::sentiment(),
            Self::risk(),
        ]
    }
}

/// Analyst that always fails, counting its calls.
pub struct FailingAnalyst {
    pub name: String,
    pub domain: String,
    calls: AtomicUsize,
}

impl FailingAnalyst {
    pub fn new(domain: &str) -> Self {
        Self {
            name: domain.to_string(),
            domain: domain.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyst for FailingAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self, _request: &AnalystRequest) -> Result<AnalystResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::Cli(format!("{} is unavailable", self.name)))
    }
}

/// Accumulates score adjustments and the reasoning behind them.
struct Scorecard {
    score: f64,
    notes: Vec<String>,
    warnings: Vec<String>,
    sources: Vec<String>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            score: 0.50,
            notes: Vec::new(),
            warnings: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn adjust(&mut self, delta: f64, note: String) {
        self.score += delta;
        self.notes.push(note);
    }

    /// Map the bullishness score to a signal the way the prompts describe.
    fn verdict(&self) -> (Signal, f64) {
        if self.sources.is_empty() {
            return (Signal::Hold, 0.30);
        }
        let score = self.score.clamp(0.0, 1.0);
        if score >= 0.60 {
            (Signal::Buy, score)
        } else if score <= 0.40 {
            (Signal::Sell, 1.0 - score)
        } else {
            (Signal::Hold, 0.50)
        }
    }
}

fn last_value(data: &serde_json::Value, key: &str, field: &str) -> Option<f64> {
    series(data, key, field).last().copied()
}

fn series(data: &serde_json::Value, key: &str, field: &str) -> Vec<f64> {
    data.get(key)
        .and_then(|obj| obj.get(field))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect())
        .unwrap_or_default()
}

fn closes(data: &serde_json::Value, key: &str) -> Vec<f64> {
    data.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|bar| bar.get("close").and_then(|c| c.as_f64()))
                .collect()
        })
        .unwrap_or_default()
}

fn quote_price(data: &serde_json::Value, symbol: &str) -> Option<f64> {
    let price = data.get(key_patterns::quote(symbol))?.get("price")?;
    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.parse().ok()))
}

/// Length of the run of same-direction moves ending at the last value.
/// Positive for rises, negative for falls.
fn trailing_run(values: &[f64]) -> i32 {
    let mut run = 0i32;
    for pair in values.windows(2).rev() {
        let step: i32 = if pair[1] > pair[0] {
            1
        } else if pair[1] < pair[0] {
            -1
        } else {
            break;
        };
        if run != 0 && step.signum() != run.signum() {
            break;
        }
        run += step;
    }
    run
}

fn score_technical(request: &AnalystRequest, card: &mut Scorecard) {
    let data = &request.market_data;
    let symbol = &request.symbol;

    let rsi_key = key_patterns::indicator("rsi_14", symbol);
    if let Some(rsi) = last_value(data, &rsi_key, "value") {
        card.sources.push(rsi_key);
        if rsi < 30.0 {
            card.adjust(0.15, format!("RSI {rsi:.0} oversold (+0.15)"));
        } else if rsi > 70.0 {
            card.adjust(-0.15, format!("RSI {rsi:.0} overbought (-0.15)"));
            card.warnings.push("Overbought".to_string());
        } else {
            card.notes.push(format!("RSI {rsi:.0} neutral"));
        }
    }

    let sma_key = key_patterns::indicator("sma_20", symbol);
    let ema_key = key_patterns::indicator("ema_20", symbol);
    if let (Some(ema), Some(sma)) = (
        last_value(data, &ema_key, "value"),
        last_value(data, &sma_key, "value"),
    ) {
        card.sources.push(ema_key);
        card.sources.push(sma_key);
        if ema > sma {
            card.adjust(0.10, "EMA-20 above SMA-20 (+0.10)".to_string());
        } else if ema < sma {
            card.adjust(-0.10, "EMA-20 below SMA-20 (-0.10)".to_string());
        }
    }

    let macd_key = key_patterns::indicator("macd", symbol);
    if let (Some(macd), Some(signal)) = (
        last_value(data, &macd_key, "macd_line"),
        last_value(data, &macd_key, "signal_line"),
    ) {
        card.sources.push(macd_key);
        if macd > signal {
            card.adjust(0.08, "MACD above signal (+0.08)".to_string());
        } else {
            card.adjust(-0.08, "MACD below signal (-0.08)".to_string());
        }
    }

    let bb_key = key_patterns::indicator("bollinger_bands", symbol);
    if let Some(pb) = last_value(data, &bb_key, "percent_b") {
        card.sources.push(bb_key);
        if pb < 0.0 {
            card.adjust(0.15, format!("%B {pb:.2} below lower band (+0.15)"));
        } else if pb > 1.0 {
            card.adjust(-0.15, format!("%B {pb:.2} above upper band (-0.15)"));
        }
    }

    let bars_key = key_patterns::bars(symbol, request.strategy.interval.as_str());
    let bar_closes = closes(data, &bars_key);
    if !bar_closes.is_empty() {
        card.sources.push(bars_key);
        let run = trailing_run(&bar_closes);
        if run >= 3 {
            card.adjust(0.10, format!("{run} consecutive higher closes (+0.10)"));
        } else if run <= -3 {
            card.adjust(-0.10, format!("{} consecutive lower closes (-0.10)", -run));
        }
    }
}

fn score_macro(request: &AnalystRequest, card: &mut Scorecard) {
    let data = &request.market_data;

    let vix_key = key_patterns::reference_symbol("VIX");
    let vix = last_value(data, &vix_key, "value");
    if let Some(vix) = vix {
        card.sources.push(vix_key);
        if vix < 15.0 {
            card.adjust(0.05, format!("VIX {vix:.1} calm (+0.05)"));
        } else if vix > 35.0 {
            card.adjust(-0.20, format!("VIX {vix:.1} extreme fear (-0.20)"));
            card.warnings.push("Extreme volatility".to_string());
        } else if vix >= 25.0 {
            card.adjust(-0.10, format!("VIX {vix:.1} elevated (-0.10)"));
        }
    }

    let spy_key = key_patterns::reference_symbol("SPY");
    let spy = series(data, &spy_key, "value");
    let run = trailing_run(&spy);
    if !spy.is_empty() {
        card.sources.push(spy_key);
        if run >= 3 {
            card.adjust(0.10, format!("SPY {run} consecutive up (+0.10)"));
        } else if run <= -3 {
            card.adjust(-0.10, format!("SPY {} consecutive down (-0.10)", -run));
        }
    }

    if vix.is_some_and(|v| v > 30.0) && run < 0 {
        card.adjust(-0.05, "High VIX with falling SPY (-0.05)".to_string());
    }
}

fn score_sentiment(request: &AnalystRequest, card: &mut Scorecard) -> Option<(Signal, f64)> {
    let data = &request.market_data;
    let symbol = &request.symbol;

    let mut total = 0.0f64;
    let mut weight = 0.0f64;
    let mut present = 0;

    let news_key = format!("sentiment:news:{symbol}");
    if let Some(news) = data.get(&news_key) {
        if let Some(score) = news.get("score").and_then(|v| v.as_f64()) {
            let count = news.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
            let w = if count >= 5 { 2.0 } else { 1.0 };
            total += score * w;
            weight += w;
            present += 1;
            card.sources.push(news_key);
            card.notes.push(format!("News {score:+.2} (weight {w})"));
        }
    }

    let social_key = format!("sentiment:social:{symbol}");
    if let Some(score) = data
        .get(&social_key)
        .and_then(|v| v.get("score"))
        .and_then(|v| v.as_f64())
    {
        total += score;
        weight += 1.0;
        present += 1;
        card.sources.push(social_key);
        card.notes.push(format!("Social {score:+.2}"));
    }

    if present == 0 {
        return None;
    }

    let average = total / weight;
    let signal = if average > 0.3 {
        Signal::Buy
    } else if average < -0.3 {
        Signal::Sell
    } else {
        Signal::Hold
    };
    let mut confidence = (0.50 + average.abs() / 2.0).min(0.90);
    if present == 1 {
        confidence -= 0.10;
    }
    if average > 0.8 {
        confidence = confidence.min(0.60);
        card.warnings.push("Euphoric sentiment".to_string());
    }
    card.notes.push(format!("Average {average:+.2}"));
    Some((signal, confidence))
}

fn score_risk(request: &AnalystRequest, card: &mut Scorecard) -> Option<(Signal, f64)> {
    let data = &request.market_data;
    let symbol = &request.symbol;
    let params = &request.strategy.risk_params;
    let stop_loss: f64 = params.stop_loss.to_string().parse().unwrap_or(0.0);

    let atr_key = key_patterns::indicator("atr_14", symbol);
    let atr = last_value(data, &atr_key, "value")?;
    let price = quote_price(data, symbol)?;
    if price <= 0.0 {
        return None;
    }
    card.sources.push(atr_key);
    card.sources.push(key_patterns::quote(symbol));

    let atr_pct = atr / price;
    let mut confidence = if atr_pct > stop_loss {
        card.warnings.push("stop inside noise".to_string());
        card.notes.push(format!(
            "ATR {:.2}% exceeds stop {:.2}%",
            atr_pct * 100.0,
            stop_loss * 100.0
        ));
        0.70
    } else {
        card.notes.push(format!("ATR {:.2}% within stop", atr_pct * 100.0));
        0.40
    };

    if let Some(tp) = params.take_profit {
        let tp: f64 = tp.to_string().parse().unwrap_or(0.0);
        if stop_loss > 0.0 && tp / stop_loss < 1.5 {
            card.warnings.push("poor reward to risk".to_string());
            confidence += 0.10;
        }
    }

    let bar_closes = closes(data, &key_patterns::bars(symbol, request.strategy.interval.as_str()));
    if let [.., prev, last] = bar_closes.as_slice() {
        if *prev > 0.0 && (prev - last) / prev > 3.0 * stop_loss {
            card.notes.push("Last bar fell more than 3x the stop".to_string());
            return Some((Signal::Sell, 0.70));
        }
    }

    Some((Signal::Hold, confidence))
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::new(50, 2))
}

#[async_trait]
impl Analyst for ScenarioMockAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalystResponse, AgentError> {
        let mut card = Scorecard::new();
        let (signal, confidence) = match self.domain.as_str() {
            "technical" => {
                score_technical(request, &mut card);
                card.verdict()
            }
            "macro" => {
                score_macro(request, &mut card);
                card.verdict()
            }
            "sentiment" => score_sentiment(request, &mut card).unwrap_or((Signal::Hold, 0.30)),
            "risk" => score_risk(request, &mut card).unwrap_or((Signal::Hold, 0.30)),
            _ => return Err(AgentError::UnknownDomain(self.domain.clone())),
        };

        let reasoning = if card.notes.is_empty() {
            "No usable market data".to_string()
        } else {
            card.notes.join(". ")
        };

        Ok(AnalystResponse {
            request_id: request.request_id,
            analyst_name: self.name.clone(),
            domain: self.domain.clone(),
            signal,
            confidence: to_decimal(confidence),
            reasoning,
            analysis: serde_json::json!({ "warnings": card.warnings }),
            data_sources_consulted: card.sources,
        })
    }
}
