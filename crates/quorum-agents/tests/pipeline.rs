//! End-to-end decision pipeline: scored candidates and indicator readings
//! through the agents, the coordinator and the risk gate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quorum_agents::bus::topics;
use quorum_agents::test_support::{FixedClock, ScriptedAdvisor, ScriptedSource, StaticPortfolio};
use quorum_agents::{
    aggregate, Agent, AgentCore, Coordinator, InMemoryBus, MessageBus, Observation,
    ObservationData, ObservationSource, OpportunityAgent, RiskAgent, RiskGate, SignalScorer,
    TechnicalAgent, WeightedVote,
};
use quorum_models::action::Action;
use quorum_models::candidate::{Candidate, RiskTier};
use quorum_models::clock::Clock;
use quorum_models::config::{AdvisoryConfig, RiskLimits, ScorerConfig};
use quorum_models::decision::Decision;
use quorum_models::portfolio::{PortfolioSnapshot, RiskSnapshot};
use quorum_models::risk::{ProposedTrade, RiskRule, RiskVerdict, VerdictKind, VerdictSource};
use rust_decimal_macros::dec;

const SYMBOL: &str = "BTC-USD";

fn candidate(magnitude: f64, volume: f64, now: DateTime<Utc>) -> Candidate {
    Candidate {
        symbol: SYMBOL.to_string(),
        action: Action::Buy,
        magnitude_pct: magnitude,
        volume_usd: volume,
        risk_tier: RiskTier::Low,
        latency_ms: 50,
        expires_at: now + chrono::Duration::seconds(300),
        source: "coinbase->kraken".to_string(),
    }
}

fn venues(now: DateTime<Utc>) -> Arc<dyn ObservationSource> {
    Arc::new(ScriptedSource::new("venues").always(move |symbol| {
        Ok(Observation {
            symbol: symbol.to_string(),
            source: "venues".to_string(),
            observed_at: now,
            data: ObservationData::Opportunities {
                candidates: vec![candidate(2.5, 40_000_000.0, now)],
            },
        })
    }))
}

fn indicators(now: DateTime<Utc>) -> Arc<dyn ObservationSource> {
    Arc::new(ScriptedSource::new("ta_feed").always(move |symbol| {
        let readings: BTreeMap<String, f64> = [
            ("rsi", 26.0),
            ("macd", 1.1),
            ("macd_signal", 0.7),
            ("sma_fast", 101.5),
            ("sma_slow", 100.0),
            ("momentum", 1.2),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Ok(Observation {
            symbol: symbol.to_string(),
            source: "ta_feed".to_string(),
            observed_at: now,
            data: ObservationData::Indicators { readings },
        })
    }))
}

fn tape(now: DateTime<Utc>) -> Arc<dyn ObservationSource> {
    Arc::new(ScriptedSource::new("tape").always(move |symbol| {
        Ok(Observation {
            symbol: symbol.to_string(),
            source: "tape".to_string(),
            observed_at: now,
            data: ObservationData::Market {
                volatility: Some(0.02),
                regime: Some("trending".to_string()),
                price: Some(40_000.0),
            },
        })
    }))
}

#[tokio::test]
async fn agents_coordinator_and_risk_gate_produce_one_verdict() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let now = clock.now();
    let bus = Arc::new(InMemoryBus::default());
    let shared: Arc<dyn MessageBus> = bus.clone();
    let mut verdicts = bus.subscribe(topics::RISK_VERDICTS);
    let mut decisions = bus.subscribe(topics::DECISIONS);

    let mut coordinator = Coordinator::new(
        AgentCore::new("coordinator", shared.clone(), clock.clone()),
        vec![
            ("signals.arbitrage".to_string(), 1.0),
            ("signals.technical".to_string(), 1.0),
        ],
        Duration::from_secs(60),
    );
    let mut risk = RiskAgent::new(
        AgentCore::new("risk", shared.clone(), clock.clone()),
        vec![tape(now)],
        vec![SYMBOL.to_string()],
        Arc::new(StaticPortfolio::new(PortfolioSnapshot::empty(dec!(100000), now))),
        Arc::new(RiskGate::new(RiskLimits::default())),
        1_000.0,
        Duration::from_secs(60),
    );
    let mut arbitrage = OpportunityAgent::new(
        AgentCore::new("arbitrage", shared.clone(), clock.clone()),
        vec![venues(now)],
        vec![SYMBOL.to_string()],
        ScorerConfig::default(),
        0.3,
    );
    let mut technical = TechnicalAgent::new(
        AgentCore::new("technical", shared.clone(), clock.clone()),
        vec![indicators(now)],
        vec![SYMBOL.to_string()],
    );

    assert_eq!(arbitrage.step().await.unwrap().published, 1);
    assert_eq!(technical.step().await.unwrap().published, 1);
    assert_eq!(coordinator.step().await.unwrap().published, 1);

    let decision: Decision = serde_json::from_value(decisions.try_recv().unwrap().payload).unwrap();
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.based_on.len(), 2);
    assert!(decision.confidence > 0.6);

    assert_eq!(risk.step().await.unwrap().published, 1);
    let verdict: RiskVerdict = serde_json::from_value(verdicts.try_recv().unwrap().payload).unwrap();
    assert_eq!(verdict.symbol, SYMBOL);
    assert!(verdict.approved);
    assert_eq!(verdict.source, VerdictSource::Deterministic);
    assert!((verdict.requested_size - 1_000.0 * decision.confidence).abs() < 1e-9);
    // 2% volatility, 2x multiplier below 40k.
    assert!((verdict.stop_loss.unwrap() - 38_400.0).abs() < 1e-6);
}

#[test]
fn scored_candidates_feed_the_weighted_vote() {
    let now = Utc::now();
    let scorer = SignalScorer::with_clock(ScorerConfig::default(), Arc::new(FixedClock::new(now)));
    let ranked = scorer.rank(&[
        candidate(0.2, 50_000.0, now),
        candidate(3.0, 80_000_000.0, now),
    ]);
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].normalized_score > ranked[1].normalized_score);

    let votes: Vec<WeightedVote> = ranked
        .iter()
        .map(|c| WeightedVote::new(c.action, c.confidence, c.normalized_score))
        .collect();
    let result = aggregate(&votes);
    assert_eq!(result.action, Action::Buy);
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);
}

fn snapshot() -> RiskSnapshot {
    RiskSnapshot {
        portfolio_value: 100_000.0,
        current_exposure: 8_000.0,
        open_positions: 2,
        volatility: Some(0.02),
        limits_utilization: 0.16,
        ..RiskSnapshot::default()
    }
}

fn trade(size: f64, confidence: f64) -> ProposedTrade {
    ProposedTrade {
        symbol: SYMBOL.to_string(),
        action: Action::Buy,
        size,
        confidence,
        entry_price: Some(40_000.0),
    }
}

#[tokio::test]
async fn deterministic_gate_is_idempotent() {
    let gate = RiskGate::new(RiskLimits::default());
    let state = snapshot();
    for proposal in [trade(1_000.0, 0.9), trade(5_000.0, 0.9), trade(1_000.0, 0.5)] {
        let first = gate.evaluate(&proposal, &state).await;
        let second = gate.evaluate(&proposal, &state).await;
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn kelly_resize_including_zero_edge() {
    let gate = RiskGate::new(RiskLimits::default());

    let resized = gate.evaluate(&trade(5_000.0, 0.9), &snapshot()).await;
    assert_eq!(resized.kind, VerdictKind::Resize);
    assert_eq!(resized.rule, RiskRule::KellyResize);
    assert!(resized.recommended_size < 5_000.0);

    let no_edge = gate.evaluate(&trade(1_000.0, 0.5), &snapshot()).await;
    assert_eq!(no_edge.kind, VerdictKind::Resize);
    assert_eq!(no_edge.rule, RiskRule::KellyResize);
    assert!(no_edge.approved);
    assert_eq!(no_edge.recommended_size, 0.0);
}

#[tokio::test]
async fn advisor_outage_falls_back_within_bounded_time() {
    let advisor = Arc::new(ScriptedAdvisor::failing().with_delay(Duration::from_millis(5)));
    let config = AdvisoryConfig {
        enabled: true,
        max_retries: 2,
        ..AdvisoryConfig::default()
    };
    let gate = RiskGate::with_advisor(RiskLimits::default(), advisor.clone(), &config)
        .with_attempt_timeout(Duration::from_millis(100));

    let deterministic = gate.evaluate_deterministic(&trade(1_000.0, 0.9), &snapshot());
    let verdict = gate.evaluate(&trade(1_000.0, 0.9), &snapshot()).await;
    assert_eq!(verdict, deterministic);
    assert_eq!(advisor.calls(), 3);
}
