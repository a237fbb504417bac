//! Experiment Runner
//!
//! Runs one fresh [`SimulationEngine`] per sweep value, each against its own
//! storage namespace and its own seed, and collects the results in input
//! order. The base seed makes the whole sweep reproducible: run `i` uses
//! `blake3(base_seed || run_id)`.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ca_certs::CertificateProvider;
use crate::ca_config::{ConfigError, SimulationConfig};
use crate::ca_engine::{resolve_seed, EngineError, SimResult, SimulationEngine};
use crate::ca_interface::{LoggingEventSink, StorageError};
use crate::ca_storage::StorageMode;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SweepError {
    #[error("invalid choice {0:?}; expected 1-5 or T, V1, V2, p, M")]
    UnknownVariable(String),

    #[error("no sweep values given")]
    Empty,

    #[error("empty sweep entry at position {0}")]
    EmptyEntry(usize),

    #[error("cannot parse sweep value {0:?}")]
    Unparsable(String),

    #[error("node count must be a positive integer, got {0}")]
    InvalidNodeCount(f64),
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("value {value} of {variable}: {source}")]
    Config {
        variable: String,
        value: f64,
        source: ConfigError,
    },

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Largest node count a sweep accepts
pub const MAX_SWEPT_NODES: f64 = u32::MAX as f64;

/// Parameter a sweep varies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepVariable {
    T,
    V1,
    V2,
    #[serde(rename = "p")]
    P,
    M,
}

impl SweepVariable {
    pub const ALL: [SweepVariable; 5] = [
        SweepVariable::T,
        SweepVariable::V1,
        SweepVariable::V2,
        SweepVariable::P,
        SweepVariable::M,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SweepVariable::T => "T",
            SweepVariable::V1 => "V1",
            SweepVariable::V2 => "V2",
            SweepVariable::P => "p",
            SweepVariable::M => "M",
        }
    }

    /// Menu entry `1..=5`; `None` for anything else
    pub fn from_menu(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(SweepVariable::T),
            "2" => Some(SweepVariable::V1),
            "3" => Some(SweepVariable::V2),
            "4" => Some(SweepVariable::P),
            "5" => Some(SweepVariable::M),
            _ => None,
        }
    }

    /// Copy of `base` with this field set to `value`
    ///
    /// `value` must already be checked by [`SweepVariable::check`].
    pub fn apply(&self, base: &SimulationConfig, value: f64) -> SimulationConfig {
        let mut config = base.clone();
        match self {
            SweepVariable::T => config.period = value,
            SweepVariable::V1 => config.risk_weight = value,
            SweepVariable::V2 => config.update_weight = value,
            SweepVariable::P => config.attack_rate = value,
            SweepVariable::M => config.nodes = value as usize,
        }
        config
    }

    pub fn value_of(&self, config: &SimulationConfig) -> f64 {
        match self {
            SweepVariable::T => config.period,
            SweepVariable::V1 => config.risk_weight,
            SweepVariable::V2 => config.update_weight,
            SweepVariable::P => config.attack_rate,
            SweepVariable::M => config.nodes as f64,
        }
    }

    /// Reject values this variable cannot take
    pub fn check(&self, value: f64) -> Result<(), SweepError> {
        if !value.is_finite() {
            return Err(SweepError::Unparsable(value.to_string()));
        }
        if *self == SweepVariable::M
            && (value < 1.0 || value.fract() != 0.0 || value > MAX_SWEPT_NODES)
        {
            return Err(SweepError::InvalidNodeCount(value));
        }
        Ok(())
    }
}

impl fmt::Display for SweepVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SweepVariable {
    type Err = SweepError;

    /// Accepts a menu number or a variable name (case-insensitive)
    fn from_str(s: &str) -> Result<Self, SweepError> {
        if let Some(var) = SweepVariable::from_menu(s) {
            return Ok(var);
        }
        SweepVariable::ALL
            .into_iter()
            .find(|var| var.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SweepError::UnknownVariable(s.to_string()))
    }
}

/// Parse comma-separated sweep values such as `"10, 30, 60"`
///
/// Any empty or non-numeric entry rejects the whole list.
pub fn parse_sweep_values(variable: SweepVariable, input: &str) -> Result<Vec<f64>, SweepError> {
    if input.trim().is_empty() {
        return Err(SweepError::Empty);
    }
    input
        .split(',')
        .enumerate()
        .map(|(i, entry)| {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(SweepError::EmptyEntry(i));
            }
            let value: f64 = entry
                .parse()
                .map_err(|_| SweepError::Unparsable(entry.to_string()))?;
            variable.check(value)?;
            Ok(value)
        })
        .collect()
}

/// Swept parameter and its values; no variable means a single run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    #[serde(default)]
    pub variable: Option<SweepVariable>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl Sweep {
    /// The "no sweep" sentinel: one run of the base configuration
    pub fn single() -> Self {
        Self::default()
    }

    pub fn over(variable: SweepVariable, values: Vec<f64>) -> Self {
        Self {
            variable: Some(variable),
            values,
        }
    }

    /// Configurations to run, in order, each paired with its table label
    fn configs(&self, base: &SimulationConfig) -> Result<Vec<(String, SimulationConfig)>, SweepError> {
        match self.variable {
            None => Ok(vec![("single".to_string(), base.clone())]),
            Some(_) if self.values.is_empty() => Err(SweepError::Empty),
            Some(variable) => self
                .values
                .iter()
                .map(|&value| {
                    variable.check(value)?;
                    Ok((format!("{}_{}", variable, value), variable.apply(base, value)))
                })
                .collect(),
        }
    }
}

/// One row of the comparison table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentResult {
    #[serde(rename = "T")]
    pub period: f64,
    #[serde(rename = "M")]
    pub nodes: usize,
    #[serde(rename = "p")]
    pub attack_rate: f64,
    #[serde(rename = "V1")]
    pub risk_weight: f64,
    #[serde(rename = "V2")]
    pub update_weight: f64,
    #[serde(rename = "C_Risk")]
    pub centralized_risk: f64,
    #[serde(rename = "C_Total")]
    pub centralized_total: f64,
    #[serde(rename = "D_Risk")]
    pub distributed_risk: f64,
    #[serde(rename = "D_Total")]
    pub distributed_total: f64,

    pub centralized_update: f64,
    pub distributed_update: f64,
    pub centralized_skipped: usize,
    pub distributed_skipped: usize,
    pub run_id: String,
    pub seed: String,
}

impl ExperimentResult {
    fn new(config: &SimulationConfig, result: &SimResult) -> Self {
        Self {
            period: config.period,
            nodes: config.nodes,
            attack_rate: config.attack_rate,
            risk_weight: config.risk_weight,
            update_weight: config.update_weight,
            centralized_risk: result.centralized.unit_risk,
            centralized_total: result.centralized.unit_total,
            distributed_risk: result.distributed.unit_risk,
            distributed_total: result.distributed.unit_total,
            centralized_update: result.centralized.unit_update,
            distributed_update: result.distributed.unit_update,
            centralized_skipped: result.centralized.skipped,
            distributed_skipped: result.distributed.skipped,
            run_id: result.run_id.clone(),
            seed: hex::encode(result.seed_used),
        }
    }

    /// Value of the swept column; `T` when nothing was swept
    pub fn swept_value(&self, variable: Option<SweepVariable>) -> f64 {
        match variable.unwrap_or(SweepVariable::T) {
            SweepVariable::T => self.period,
            SweepVariable::V1 => self.risk_weight,
            SweepVariable::V2 => self.update_weight,
            SweepVariable::P => self.attack_rate,
            SweepVariable::M => self.nodes as f64,
        }
    }
}

/// Per-run seed derived from the sweep's base seed
pub fn derive_seed(base: &[u8; 32], run_id: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(base);
    hasher.update(run_id.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Runs a sweep of simulations and collects the comparison rows
pub struct ExperimentRunner<P: CertificateProvider + Clone> {
    base: SimulationConfig,
    provider: P,
    storage: StorageMode,
    seed: Option<[u8; 32]>,
    log_events: bool,
}

impl<P: CertificateProvider + Clone> ExperimentRunner<P> {
    pub fn new(base: SimulationConfig, provider: P) -> Self {
        Self {
            base,
            provider,
            storage: StorageMode::Memory,
            seed: None,
            log_events: false,
        }
    }

    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Fix the base seed; otherwise one is drawn from entropy per sweep
    pub fn with_seed(mut self, seed: [u8; 32]) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Forward simulation events to the `log` facade
    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn base(&self) -> &SimulationConfig {
        &self.base
    }

    /// Run every value of `sweep`; results keep the order of the values
    ///
    /// Every configuration is validated before the first run starts.
    pub fn run(&self, sweep: &Sweep) -> Result<Vec<ExperimentResult>, ExperimentError> {
        let configs = sweep.configs(&self.base)?;
        let variable = sweep.variable.map_or("base", |v| v.name());
        for (label, config) in &configs {
            config.validate().map_err(|source| ExperimentError::Config {
                variable: variable.to_string(),
                value: sweep
                    .variable
                    .map_or(config.period, |v| v.value_of(config)),
                source,
            })?;
            log::trace!("{} validated", label);
        }

        let base_seed = resolve_seed(self.seed);
        log::info!(
            "sweep over {} with {} run(s), base seed {}",
            variable,
            configs.len(),
            hex::encode(base_seed)
        );

        let mut used: HashMap<String, usize> = HashMap::new();
        let mut results = Vec::with_capacity(configs.len());
        for (label, config) in configs {
            let run_id = unique_run_id(&mut used, &format!("{}_{}", config.period, label));
            let namespace = self.storage.namespace(&run_id)?;
            let seed = derive_seed(&base_seed, namespace.run_id());

            let mut engine =
                SimulationEngine::new(config.clone(), self.provider.clone(), &namespace, Some(seed))?;
            if self.log_events {
                engine = engine.with_event_sink(Box::new(LoggingEventSink));
            }
            let result = engine.run();
            results.push(ExperimentResult::new(&config, &result));
        }
        Ok(results)
    }
}

/// Suffix repeated run ids so duplicate sweep values get separate namespaces
fn unique_run_id(used: &mut HashMap<String, usize>, run_id: &str) -> String {
    let seen = used.entry(run_id.to_string()).or_insert(0);
    *seen += 1;
    if *seen == 1 {
        run_id.to_string()
    } else {
        format!("{}_{}", run_id, seen)
    }
}

/// Swept value column: integers as is, large values with one decimal
fn format_swept(variable: SweepVariable, value: f64) -> String {
    if variable == SweepVariable::M {
        format!("{}", value as usize)
    } else if value > 100.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.4}", value)
    }
}

/// Comparison table: swept value, C risk, C total, D risk, D total
pub fn format_table(variable: Option<SweepVariable>, results: &[ExperimentResult]) -> String {
    let label = variable.map_or("Experiment", |v| v.name());
    let mut out = String::new();
    let header = format!(
        "{:<10} | {:<12} | {:<12} || {:<12} | {:<12}",
        label, "Cent. Risk", "Cent. Total", "Dist. Risk", "Dist. Total"
    );
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", "-".repeat(header.len()));
    for row in results {
        let swept = match variable {
            Some(v) => format_swept(v, row.swept_value(Some(v))),
            None => "Single".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<10} | {:<12.4} | {:<12.4} || {:<12.4} | {:<12.4}",
            swept,
            row.centralized_risk,
            row.centralized_total,
            row.distributed_risk,
            row.distributed_total
        );
    }
    out
}

pub fn print_table(variable: Option<SweepVariable>, results: &[ExperimentResult]) {
    print!("{}", format_table(variable, results));
}
