//! Scores opportunity candidates and emits BUY for the best one that clears
//! the minimum score.

use std::sync::Arc;

use async_trait::async_trait;
use quorum_models::action::Action;
use quorum_models::candidate::{Candidate, ScoredCandidate};
use quorum_models::config::ScorerConfig;
use quorum_models::signal::Signal;
use tracing::info;

use crate::agent::{Agent, AgentCore, StepReport};
use crate::error::AgentError;
use crate::observation::{gather_observations, ObservationData, ObservationSource};
use crate::scorer::SignalScorer;

/// Confidence of a HOLD when no candidate was observed at all.
const NO_CANDIDATE_HOLD_CONFIDENCE: f64 = 0.5;

pub struct OpportunityAgent {
    core: AgentCore,
    sources: Vec<Arc<dyn ObservationSource>>,
    symbols: Vec<String>,
    scorer: SignalScorer,
    min_score: f64,
}

impl OpportunityAgent {
    pub fn new(
        core: AgentCore,
        sources: Vec<Arc<dyn ObservationSource>>,
        symbols: Vec<String>,
        scorer_config: ScorerConfig,
        min_score: f64,
    ) -> Self {
        let scorer = SignalScorer::with_clock(scorer_config, Arc::clone(&core.clock));
        Self {
            core,
            sources,
            symbols,
            scorer,
            min_score,
        }
    }

    /// Signal for one symbol from its scored candidates.
    fn decide(&self, symbol: &str, ranked: &[ScoredCandidate], health: f64) -> Signal {
        let now = self.core.now();
        match ranked.first() {
            Some(best) if best.normalized_score >= self.min_score => Signal::new(
                &self.core.name,
                symbol,
                best.action,
                best.confidence * health,
                format!(
                    "{} via {}: score {:.3} >= {:.2} ({} candidates)",
                    best.action,
                    best.source,
                    best.normalized_score,
                    self.min_score,
                    ranked.len()
                ),
                now,
            ),
            Some(best) => Signal::new(
                &self.core.name,
                symbol,
                Action::Hold,
                (1.0 - best.normalized_score) * health,
                format!(
                    "Best candidate via {} scores {:.3}, below {:.2}",
                    best.source, best.normalized_score, self.min_score
                ),
                now,
            ),
            None => Signal::new(
                &self.core.name,
                symbol,
                Action::Hold,
                NO_CANDIDATE_HOLD_CONFIDENCE * health,
                "No live candidates",
                now,
            ),
        }
    }
}

#[async_trait]
impl Agent for OpportunityAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn step(&mut self) -> Result<StepReport, AgentError> {
        let gathered =
            gather_observations(&self.core.name, &self.sources, &self.symbols, &self.core.beliefs)
                .await?;
        let health = self
            .core
            .beliefs
            .number(crate::observation::HEALTH_KEY)
            .unwrap_or(1.0);

        let mut signals = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let candidates: Vec<Candidate> = gathered
                .observations
                .iter()
                .filter(|o| &o.symbol == symbol)
                .filter_map(|o| match &o.data {
                    ObservationData::Opportunities { candidates } => Some(candidates.clone()),
                    _ => None,
                })
                .flatten()
                .collect();

            let ranked = self.scorer.rank(&candidates);
            if let Some(best) = ranked.first() {
                self.core.beliefs.update(
                    format!("opportunity.{symbol}.best_score"),
                    best.normalized_score,
                    best.confidence,
                    &best.source,
                );
            }
            signals.push(self.decide(symbol, &ranked, health));
        }

        for signal in &signals {
            self.core.publish_signal(signal).await?;
        }
        info!(agent = %self.core.name, signals = signals.len(), outcome = ?gathered.outcome, "Opportunity step complete");
        Ok(StepReport::new(signals.len(), gathered.outcome))
    }
}
