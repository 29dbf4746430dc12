//! Indicator heuristics combined with the intra-agent weighted vote.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use quorum_models::action::Action;
use quorum_models::signal::Signal;
use tracing::{debug, info};

use crate::agent::{Agent, AgentCore, StepReport};
use crate::aggregator::{aggregate, WeightedVote};
use crate::error::AgentError;
use crate::observation::{gather_observations, ObservationData, ObservationSource, HEALTH_KEY};
use crate::scorer::magnitude_factor;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

const RSI_WEIGHT: f64 = 0.3;
const MACD_WEIGHT: f64 = 0.3;
const MA_CROSS_WEIGHT: f64 = 0.2;
const MOMENTUM_WEIGHT: f64 = 0.2;

/// Confidence of a heuristic that sees nothing actionable.
const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// One heuristic's opinion, kept for the reasoning string.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicVote {
    pub name: &'static str,
    pub vote: WeightedVote,
}

fn directional(value: f64) -> Action {
    if value > 0.0 {
        Action::Buy
    } else if value < 0.0 {
        Action::Sell
    } else {
        Action::Hold
    }
}

/// RSI: below 30 is oversold (BUY), above 70 overbought (SELL).
pub fn rsi_vote(rsi: f64) -> WeightedVote {
    if rsi < RSI_OVERSOLD {
        let depth = (RSI_OVERSOLD - rsi) / RSI_OVERSOLD;
        WeightedVote::new(Action::Buy, 0.5 + 0.5 * depth, RSI_WEIGHT)
    } else if rsi > RSI_OVERBOUGHT {
        let depth = (rsi - RSI_OVERBOUGHT) / (100.0 - RSI_OVERBOUGHT);
        WeightedVote::new(Action::Sell, 0.5 + 0.5 * depth, RSI_WEIGHT)
    } else {
        WeightedVote::new(Action::Hold, NEUTRAL_CONFIDENCE, RSI_WEIGHT)
    }
}

/// MACD line against its signal line; separation relative to their size.
pub fn macd_vote(macd: f64, signal: f64) -> WeightedVote {
    let diff = macd - signal;
    let scale = macd.abs() + signal.abs();
    let separation = if scale > 0.0 { diff.abs() / scale } else { 0.0 };
    WeightedVote::new(directional(diff), 0.5 + 0.4 * separation.min(1.0), MACD_WEIGHT)
}

/// Fast moving average above the slow one is bullish.
pub fn ma_cross_vote(fast: f64, slow: f64) -> WeightedVote {
    if slow <= 0.0 {
        return WeightedVote::new(Action::Hold, NEUTRAL_CONFIDENCE, MA_CROSS_WEIGHT);
    }
    let gap = (fast - slow) / slow;
    WeightedVote::new(
        directional(gap),
        0.5 + (gap.abs() * 10.0).min(0.4),
        MA_CROSS_WEIGHT,
    )
}

/// Momentum in percent; strength follows the same saturating curve as magnitude.
pub fn momentum_vote(momentum_pct: f64) -> WeightedVote {
    WeightedVote::new(
        directional(momentum_pct),
        0.5 + 0.4 * magnitude_factor(momentum_pct.abs()),
        MOMENTUM_WEIGHT,
    )
}

/// Every heuristic the readings allow.
pub fn heuristic_votes(readings: &BTreeMap<String, f64>) -> Vec<HeuristicVote> {
    let get = |key: &str| readings.get(key).copied().filter(|v| v.is_finite());
    let mut votes = Vec::new();
    if let Some(rsi) = get("rsi") {
        votes.push(HeuristicVote {
            name: "rsi",
            vote: rsi_vote(rsi),
        });
    }
    if let (Some(macd), Some(signal)) = (get("macd"), get("macd_signal")) {
        votes.push(HeuristicVote {
            name: "macd",
            vote: macd_vote(macd, signal),
        });
    }
    if let (Some(fast), Some(slow)) = (get("sma_fast"), get("sma_slow")) {
        votes.push(HeuristicVote {
            name: "ma_cross",
            vote: ma_cross_vote(fast, slow),
        });
    }
    if let Some(momentum) = get("momentum") {
        votes.push(HeuristicVote {
            name: "momentum",
            vote: momentum_vote(momentum),
        });
    }
    votes
}

pub struct TechnicalAgent {
    core: AgentCore,
    sources: Vec<Arc<dyn ObservationSource>>,
    symbols: Vec<String>,
}

impl TechnicalAgent {
    pub fn new(
        core: AgentCore,
        sources: Vec<Arc<dyn ObservationSource>>,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            core,
            sources,
            symbols,
        }
    }

    fn signal_for(&self, symbol: &str, readings: &BTreeMap<String, f64>, health: f64) -> Option<Signal> {
        let votes = heuristic_votes(readings);
        if votes.is_empty() {
            debug!(agent = %self.core.name, symbol, "No usable indicator readings");
            return None;
        }
        let weighted: Vec<WeightedVote> = votes.iter().map(|h| h.vote).collect();
        let result = aggregate(&weighted);
        let detail = votes
            .iter()
            .map(|h| format!("{}={} {:.2}", h.name, h.vote.action, h.vote.confidence))
            .collect::<Vec<_>>()
            .join(", ");
        Some(Signal::new(
            &self.core.name,
            symbol,
            result.action,
            result.confidence * health,
            format!("{} [{}]", result.describe(), detail),
            self.core.now(),
        ))
    }
}

#[async_trait]
impl Agent for TechnicalAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn step(&mut self) -> Result<StepReport, AgentError> {
        let gathered =
            gather_observations(&self.core.name, &self.sources, &self.symbols, &self.core.beliefs)
                .await?;
        let health = self.core.beliefs.number(HEALTH_KEY).unwrap_or(1.0);

        let mut signals = Vec::new();
        for symbol in &self.symbols {
            // Observations arrive sorted by source, so later sources win on clashes.
            let mut readings = BTreeMap::new();
            for observation in gathered.observations.iter().filter(|o| &o.symbol == symbol) {
                if let ObservationData::Indicators { readings: r } = &observation.data {
                    readings.extend(r.iter().map(|(k, v)| (k.clone(), *v)));
                }
            }
            for (name, value) in &readings {
                self.core
                    .beliefs
                    .update(format!("indicator.{symbol}.{name}"), *value, health, &self.core.name);
            }
            if let Some(signal) = self.signal_for(symbol, &readings, health) {
                signals.push(signal);
            }
        }

        for signal in &signals {
            self.core.publish_signal(signal).await?;
        }
        info!(agent = %self.core.name, signals = signals.len(), outcome = ?gathered.outcome, "Technical step complete");
        Ok(StepReport::new(signals.len(), gathered.outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, MessageBus};
    use crate::observation::Observation;
    use crate::test_support::ScriptedSource;
    use chrono::Utc;
    use quorum_models::clock::{Clock, FixedClock};
    use quorum_models::signal::SignalMessage;

    fn readings(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn rsi_zones() {
        assert_eq!(rsi_vote(20.0).action, Action::Buy);
        assert_eq!(rsi_vote(85.0).action, Action::Sell);
        assert_eq!(rsi_vote(50.0).action, Action::Hold);
        assert!(rsi_vote(10.0).confidence > rsi_vote(25.0).confidence);
        assert!(rsi_vote(0.0).confidence <= 1.0);
    }

    #[test]
    fn crosses_and_momentum_follow_direction() {
        assert_eq!(macd_vote(1.2, 0.8).action, Action::Buy);
        assert_eq!(macd_vote(-0.5, 0.1).action, Action::Sell);
        assert_eq!(ma_cross_vote(101.0, 100.0).action, Action::Buy);
        assert_eq!(ma_cross_vote(100.0, 0.0).action, Action::Hold);
        assert_eq!(momentum_vote(-2.0).action, Action::Sell);
        assert!(momentum_vote(5.0).confidence <= 0.9);
    }

    #[test]
    fn only_available_heuristics_vote() {
        let votes = heuristic_votes(&readings(&[("rsi", 25.0), ("macd", 1.0)]));
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].name, "rsi");

        let votes = heuristic_votes(&readings(&[("rsi", f64::NAN)]));
        assert!(votes.is_empty());
    }

    #[tokio::test]
    async fn bullish_readings_emit_buy() {
        let bus = Arc::new(InMemoryBus::default());
        let mut sub = bus.subscribe("signals.technical");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let now = clock.now();
        let source = ScriptedSource::new("ta_feed").always(move |symbol| {
            Ok(Observation {
                symbol: symbol.to_string(),
                source: "ta_feed".to_string(),
                observed_at: now,
                data: ObservationData::Indicators {
                    readings: readings(&[
                        ("rsi", 24.0),
                        ("macd", 1.4),
                        ("macd_signal", 0.9),
                        ("sma_fast", 102.0),
                        ("sma_slow", 100.0),
                        ("momentum", 1.5),
                    ]),
                },
            })
        });

        let mut agent = TechnicalAgent::new(
            AgentCore::new("technical", bus.clone() as Arc<dyn MessageBus>, clock),
            vec![Arc::new(source)],
            vec!["ETH-USD".to_string()],
        );
        let report = agent.step().await.unwrap();
        assert_eq!(report.published, 1);

        let msg: SignalMessage = serde_json::from_value(sub.recv().await.unwrap().payload).unwrap();
        assert_eq!(msg.signal, "BUY");
        assert!(msg.confidence > 0.5);
        assert!(msg.reasoning.unwrap().contains("rsi=BUY"));
        assert_eq!(agent.core().beliefs.number("indicator.ETH-USD.rsi"), Some(24.0));
    }
}
