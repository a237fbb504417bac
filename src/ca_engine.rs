//! Simulation Engine
//!
//! Drives both architectures through `total_periods` periods:
//!
//! ```text
//! Init -> (PeriodUpdate(n) -> PeriodAttack(n)) x total_periods -> Aggregate -> Done
//! ```
//!
//! Both architectures see the same attack rate but draw their own arrivals,
//! so their outcomes are not correlated. All randomness comes from one seeded
//! [`StdRng`]; the call order inside a period is fixed (centralized update,
//! distributed update, centralized attack, distributed attack) so a seed
//! reproduces a run.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use thiserror::Error;

use crate::ca_architecture::{CaArchitecture, IssueError, RiskReport, UpdateReport};
use crate::ca_attack::AttackProcess;
use crate::ca_centralized::CentralizedSystem;
use crate::ca_certs::CertificateProvider;
use crate::ca_config::{ConfigError, SimulationConfig};
use crate::ca_distributed::DistributedSystem;
use crate::ca_interface::{Architecture, Event, EventSink, NoOpSink, Period};
use crate::ca_storage::RunNamespace;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("setting up nodes: {0}")]
    Setup(#[from] IssueError),
}

/// Where the engine is in its run; [`SimulationEngine::step`] executes the
/// current phase and moves to the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Init,
    PeriodUpdate(Period),
    PeriodAttack(Period),
    Aggregate,
    Done,
}

/// Running totals of one architecture
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArchitectureTotals {
    pub update_cost: f64,
    pub risk_cost: f64,
    /// Periods in which any certificate leaked
    pub compromised_periods: u32,
    pub issued: usize,
    pub skipped: usize,
}

impl ArchitectureTotals {
    fn add_update(&mut self, update: &UpdateReport) {
        self.update_cost += update.cost;
        self.issued += update.issued;
        self.skipped += update.skipped;
    }

    fn add_risk(&mut self, risk: &RiskReport) {
        self.risk_cost += risk.risk;
        if risk.breach_at.is_some() {
            self.compromised_periods += 1;
        }
    }
}

/// Per-architecture outcome of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArchitectureReport {
    /// Update cost per unit time: `total_update / (periods × T)`
    pub unit_update: f64,
    /// Risk cost per period: `total_risk / periods`
    pub unit_risk: f64,
    pub unit_total: f64,
    pub total_update: f64,
    pub total_risk: f64,
    pub compromised_periods: u32,
    pub issued: usize,
    pub skipped: usize,
}

impl ArchitectureReport {
    fn from_totals(totals: &ArchitectureTotals, periods: Period, period_length: f64) -> Self {
        let (unit_update, unit_risk) = if periods == 0 {
            (0.0, 0.0)
        } else {
            (
                totals.update_cost / (periods as f64 * period_length),
                totals.risk_cost / periods as f64,
            )
        };
        Self {
            unit_update,
            unit_risk,
            unit_total: unit_update + unit_risk,
            total_update: totals.update_cost,
            total_risk: totals.risk_cost,
            compromised_periods: totals.compromised_periods,
            issued: totals.issued,
            skipped: totals.skipped,
        }
    }
}

/// Simulation result
#[derive(Debug, Clone)]
pub struct SimResult {
    /// Seed used for the simulation
    pub seed_used: [u8; 32],

    pub run_id: String,

    /// Number of periods completed
    pub periods_completed: Period,

    pub centralized: ArchitectureReport,
    pub distributed: ArchitectureReport,
}

/// Draw a fresh seed when none is given
pub fn resolve_seed(seed: Option<[u8; 32]>) -> [u8; 32] {
    seed.unwrap_or_else(|| {
        let mut seed = [0u8; 32];
        StdRng::from_entropy().fill_bytes(&mut seed);
        seed
    })
}

/// Runs both architectures for one configuration
pub struct SimulationEngine<P: CertificateProvider> {
    config: SimulationConfig,
    process: AttackProcess,
    centralized: CentralizedSystem<P>,
    distributed: DistributedSystem<P>,

    rng: StdRng,
    seed: [u8; 32],
    run_id: String,
    phase: EnginePhase,
    periods_completed: Period,

    centralized_totals: ArchitectureTotals,
    distributed_totals: ArchitectureTotals,

    sink: Box<dyn EventSink>,
}

impl<P: CertificateProvider + Clone> SimulationEngine<P> {
    /// Validate `config` and open both architectures' nodes in `namespace`
    pub fn new(
        config: SimulationConfig,
        provider: P,
        namespace: &RunNamespace,
        seed: Option<[u8; 32]>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let centralized = CentralizedSystem::new(config.clone(), provider.clone(), namespace)
            .map_err(IssueError::from)?;
        let distributed = DistributedSystem::new(config.clone(), provider, namespace)?;
        let seed = resolve_seed(seed);

        Ok(Self {
            process: AttackProcess::new(config.poisson_lambda()),
            config,
            centralized,
            distributed,
            rng: StdRng::from_seed(seed),
            seed,
            run_id: namespace.run_id().to_string(),
            phase: EnginePhase::Init,
            periods_completed: 0,
            centralized_totals: ArchitectureTotals::default(),
            distributed_totals: ArchitectureTotals::default(),
            sink: Box::new(NoOpSink),
        })
    }
}

impl<P: CertificateProvider> SimulationEngine<P> {
    /// Replace the default no-op event sink
    pub fn with_event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn totals(&self, architecture: Architecture) -> &ArchitectureTotals {
        match architecture {
            Architecture::Centralized => &self.centralized_totals,
            Architecture::Distributed => &self.distributed_totals,
        }
    }

    /// Execute the current phase; returns the phase that runs next
    pub fn step(&mut self) -> EnginePhase {
        let next = match self.phase {
            EnginePhase::Init => {
                log::info!(
                    "run {}: M={} K={} T={} p={} periods={} seed={}",
                    self.run_id,
                    self.config.nodes,
                    self.config.threshold(),
                    self.config.period,
                    self.config.attack_rate,
                    self.config.total_periods,
                    hex::encode(self.seed)
                );
                if self.config.total_periods == 0 {
                    EnginePhase::Aggregate
                } else {
                    EnginePhase::PeriodUpdate(1)
                }
            }
            EnginePhase::PeriodUpdate(period) => {
                self.update_phase(period);
                EnginePhase::PeriodAttack(period)
            }
            EnginePhase::PeriodAttack(period) => {
                self.attack_phase(period);
                self.periods_completed = period;
                if period < self.config.total_periods {
                    EnginePhase::PeriodUpdate(period + 1)
                } else {
                    EnginePhase::Aggregate
                }
            }
            EnginePhase::Aggregate => {
                let result = self.report();
                log::info!(
                    "run {} done: centralized total={:.4}, distributed total={:.4}",
                    self.run_id,
                    result.centralized.unit_total,
                    result.distributed.unit_total
                );
                EnginePhase::Done
            }
            EnginePhase::Done => EnginePhase::Done,
        };
        log::trace!("run {}: {:?} -> {:?}", self.run_id, self.phase, next);
        self.phase = next;
        next
    }

    /// Step until [`EnginePhase::Done`]
    pub fn run(mut self) -> SimResult {
        while self.phase != EnginePhase::Done {
            self.step();
        }
        self.report()
    }

    /// Snapshot of the results so far
    pub fn report(&self) -> SimResult {
        let periods = self.periods_completed;
        let period_length = self.config.period;
        SimResult {
            seed_used: self.seed,
            run_id: self.run_id.clone(),
            periods_completed: periods,
            centralized: ArchitectureReport::from_totals(
                &self.centralized_totals,
                periods,
                period_length,
            ),
            distributed: ArchitectureReport::from_totals(
                &self.distributed_totals,
                periods,
                period_length,
            ),
        }
    }

    fn update_phase(&mut self, period: Period) {
        let centralized = self
            .centralized
            .update_all(period, &mut self.rng, self.sink.as_mut());
        self.centralized_totals.add_update(&centralized);

        let distributed = self
            .distributed
            .update_all(period, &mut self.rng, self.sink.as_mut());
        self.distributed_totals.add_update(&distributed);

        log::debug!(
            "period {}: update centralized={:.4} ({} skipped), distributed={:.4} ({} skipped)",
            period,
            centralized.cost,
            centralized.skipped,
            distributed.cost,
            distributed.skipped
        );
    }

    fn attack_phase(&mut self, period: Period) {
        let centralized =
            self.centralized
                .attack(&self.process, period, &mut self.rng, self.sink.as_mut());
        self.centralized_totals.add_risk(&centralized);

        let distributed =
            self.distributed
                .attack(&self.process, period, &mut self.rng, self.sink.as_mut());
        self.distributed_totals.add_risk(&distributed);

        // update cost is fixed by configuration, so it can be restated here
        for (architecture, update_cost, risk_cost) in [
            (
                Architecture::Centralized,
                self.config.update_weight
                    * (self.config.certs_per_node() * self.config.nodes) as f64,
                centralized.risk,
            ),
            (
                Architecture::Distributed,
                self.config.update_weight * (self.config.total_certs * self.config.nodes) as f64,
                distributed.risk,
            ),
        ] {
            self.sink.log(
                period,
                Event::PeriodClosed {
                    architecture,
                    update_cost,
                    risk_cost,
                },
            );
        }
    }
}
