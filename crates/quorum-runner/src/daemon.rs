use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quorum_agents::bus::{publish_json, topics};
use quorum_agents::{
    Agent, AgentCore, AgentError, Coordinator, MessageBus, ObservationSource, OpportunityAgent,
    PortfolioSource, RiskAgent, RiskGate, StepReport, TechnicalAgent,
};
use quorum_models::clock::Clock;
use quorum_models::config::{AgentConfig, AgentKind, QuorumConfig, RunnerConfig};
use quorum_store::EquityLedger;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::agent_symbols;
use crate::error::RunnerError;
use crate::sources::{JsonFileSource, LedgerPortfolio};

/// Name the coordinator runs under.
pub const COORDINATOR_NAME: &str = "coordinator";

/// Share of the cycle timeout the risk agent may spend on the advisor.
const ADVISORY_SHARE_OF_CYCLE: f64 = 0.75;

/// The agent daemon. Runs every agent on its own periodic loop plus a
/// heartbeat task, until cancelled.
pub struct Runner {
    settings: RunnerConfig,
    agents: Vec<Box<dyn Agent>>,
    bus: Arc<dyn MessageBus>,
    cancel: CancellationToken,
}

impl Runner {
    /// Build every enabled agent and the coordinator from configuration.
    pub fn from_config(
        config: &QuorumConfig,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunnerError> {
        config.validate()?;

        let gate = Arc::new(RiskGate::from_config(config));
        let advisory_budget = Duration::from_secs(config.runner.cycle_timeout_seconds)
            .mul_f64(ADVISORY_SHARE_OF_CYCLE);
        let mut agents: Vec<Box<dyn Agent>> = Vec::new();
        for agent in config.agents.iter().filter(|a| a.enabled) {
            let core = AgentCore::new(&agent.name, Arc::clone(&bus), Arc::clone(&clock));
            let sources = build_sources(agent);
            let symbols = agent_symbols(agent, config);
            let built: Box<dyn Agent> = match agent.kind {
                AgentKind::Opportunity => Box::new(OpportunityAgent::new(
                    core,
                    sources,
                    symbols,
                    config.scorer.clone(),
                    agent.min_score,
                )),
                AgentKind::Technical => Box::new(TechnicalAgent::new(core, sources, symbols)),
                AgentKind::Risk => Box::new(RiskAgent::new(
                    core,
                    sources,
                    symbols,
                    open_portfolio(agent, &config.runner, Arc::clone(&clock))?,
                    Arc::clone(&gate),
                    config.coordinator.base_position_size,
                    Duration::from_secs(config.coordinator.cycle_window_seconds),
                )
                .with_advisory_budget(advisory_budget)),
            };
            tracing::info!(agent = %agent.name, kind = ?agent.kind, "Agent configured");
            agents.push(built);
        }

        let coordinator = Coordinator::from_config(
            AgentCore::new(COORDINATOR_NAME, Arc::clone(&bus), clock),
            config,
        );
        agents.push(Box::new(coordinator));

        Ok(Self::with_agents(config.runner.clone(), agents, bus))
    }

    /// Runner over an explicit set of agents.
    pub fn with_agents(
        settings: RunnerConfig,
        agents: Vec<Box<dyn Agent>>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            settings,
            agents,
            bus,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// Run until cancelled. Each agent's `shutdown` has run when this returns.
    pub async fn run(self) -> Result<(), RunnerError> {
        tracing::info!(agents = self.agents.len(), "Quorum runner starting");

        let interval = Duration::from_secs(self.settings.evaluation_interval_seconds);
        let cycle_timeout = Duration::from_secs(self.settings.cycle_timeout_seconds);
        let heartbeat_interval = Duration::from_secs(self.settings.heartbeat_interval_seconds);
        let cores: Vec<AgentCore> = self.agents.iter().map(|a| a.core().clone()).collect();

        let mut join_set = tokio::task::JoinSet::new();
        for agent in self.agents {
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                agent_loop(agent, interval, cycle_timeout, cancel).await;
            });
        }
        {
            let bus = Arc::clone(&self.bus);
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                heartbeat_loop(cores, bus, heartbeat_interval, cancel).await;
            });
        }

        tracing::info!("All runner tasks started");

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Runner task panicked");
            }
        }

        tracing::info!("Quorum runner stopped");
        Ok(())
    }
}

fn build_sources(agent: &AgentConfig) -> Vec<Arc<dyn ObservationSource>> {
    agent
        .sources
        .iter()
        .map(|s| Arc::new(JsonFileSource::new(&s.name, &s.path)) as Arc<dyn ObservationSource>)
        .collect()
}

fn open_portfolio(
    agent: &AgentConfig,
    runner: &RunnerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn PortfolioSource>, RunnerError> {
    if let Some(parent) = Path::new(&runner.ledger_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let ledger = EquityLedger::open(&runner.ledger_path).map_err(|e| RunnerError::Build {
        agent: agent.name.clone(),
        reason: format!("ledger {}: {e}", runner.ledger_path),
    })?;
    Ok(Arc::new(LedgerPortfolio::new(&runner.portfolio_path, ledger, clock)))
}

/// One tick, bounded by `timeout`. A tick that overruns is dropped before
/// it publishes anything.
pub async fn run_tick(agent: &mut dyn Agent, timeout: Duration) -> Result<StepReport, AgentError> {
    let name = agent.name().to_string();
    match tokio::time::timeout(timeout, agent.step()).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::CycleTimeout {
            agent: name,
            seconds: timeout.as_secs(),
        }),
    }
}

async fn agent_loop(
    mut agent: Box<dyn Agent>,
    interval: Duration,
    cycle_timeout: Duration,
    cancel: CancellationToken,
) {
    let name = agent.name().to_string();
    if let Err(e) = agent.initialize().await {
        tracing::error!(agent = %name, error = %e, "Agent failed to initialize");
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(agent = %name, "Agent loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                match run_tick(agent.as_mut(), cycle_timeout).await {
                    Ok(report) => tracing::debug!(
                        agent = %name,
                        published = report.published,
                        outcome = ?report.outcome,
                        "Tick complete"
                    ),
                    Err(e) => tracing::warn!(agent = %name, error = %e, "Tick failed"),
                }
            }
        }
    }

    if let Err(e) = agent.shutdown().await {
        tracing::warn!(agent = %name, error = %e, "Agent shutdown failed");
    }
}

async fn heartbeat_loop(
    cores: Vec<AgentCore>,
    bus: Arc<dyn MessageBus>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Heartbeat loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                for core in &cores {
                    if let Err(e) = publish_json(bus.as_ref(), topics::HEARTBEAT, &core.heartbeat()).await {
                        tracing::warn!(agent = %core.name, error = %e, "Heartbeat publish failed");
                    }
                }
            }
        }
    }
}
