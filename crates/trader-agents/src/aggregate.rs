//! Deterministic consensus over analyst responses.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use trader_models::{AnalystResponse, RiskLevels, RiskParams, Signal};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consensus {
    pub signal: Signal,
    pub confidence: Decimal,
    pub reasoning: String,
}

/// Confidence-weighted vote across successful responses.
///
/// Returns None for an empty slice. Ties between the heaviest signals resolve
/// to hold, and a buy or sell below `min_confidence` is downgraded to hold.
pub fn aggregate(responses: &[AnalystResponse], min_confidence: Decimal) -> Option<Consensus> {
    if responses.is_empty() {
        return None;
    }

    let mut weights: HashMap<Signal, Decimal> = HashMap::new();
    for response in responses {
        *weights.entry(response.signal).or_insert(Decimal::ZERO) += response.confidence;
    }
    let weight_of = |signal: Signal| weights.get(&signal).copied().unwrap_or(Decimal::ZERO);

    let total: Decimal = weights.values().copied().sum();
    let top = weights.values().copied().max().unwrap_or(Decimal::ZERO);
    let leaders: Vec<Signal> = [Signal::Buy, Signal::Sell, Signal::Hold]
        .into_iter()
        .filter(|s| weights.contains_key(s) && weight_of(*s) == top)
        .collect();
    let mut signal = match leaders.as_slice() {
        [only] => *only,
        _ => Signal::Hold,
    };

    let count = Decimal::from(responses.len() as u64);
    let mean = total / count;
    let confidence = if total.is_zero() {
        Decimal::ZERO
    } else {
        (weight_of(signal) / total * mean).round_dp(4)
    };

    let mut reasoning = format!(
        "{signal} from {} analyst(s); weights buy {:.2}, sell {:.2}, hold {:.2}",
        responses.len(),
        weight_of(Signal::Buy),
        weight_of(Signal::Sell),
        weight_of(Signal::Hold),
    );
    if leaders.len() > 1 {
        reasoning.push_str("; tied signals resolve to hold");
    }
    if signal != Signal::Hold && confidence < min_confidence {
        reasoning.push_str(&format!(
            "; {signal} confidence {confidence} below minimum {min_confidence}, downgraded to hold"
        ));
        signal = Signal::Hold;
    }
    for response in responses {
        reasoning.push_str(&format!(
            "\n- {} ({} {}): {}",
            response.analyst_name, response.signal, response.confidence, response.reasoning
        ));
    }

    Some(Consensus {
        signal,
        confidence,
        reasoning,
    })
}

/// Stop and target prices for `signal` around `reference_price`.
///
/// Hold uses the long orientation. Short targets are floored at zero.
pub fn risk_levels(signal: Signal, reference_price: Decimal, params: &RiskParams) -> RiskLevels {
    let (stop_loss_price, take_profit_price) = match signal {
        Signal::Buy | Signal::Hold => (
            reference_price * (Decimal::ONE - params.stop_loss),
            params
                .take_profit
                .map(|tp| reference_price * (Decimal::ONE + tp)),
        ),
        Signal::Sell => (
            reference_price * (Decimal::ONE + params.stop_loss),
            params
                .take_profit
                .map(|tp| (reference_price * (Decimal::ONE - tp)).max(Decimal::ZERO)),
        ),
    };

    RiskLevels {
        reference_price,
        stop_loss_price: stop_loss_price.round_dp(4),
        take_profit_price: take_profit_price.map(|p| p.round_dp(4)),
        max_position_size: params.max_position_size,
    }
}
