//! # dpki-sim - Centralized vs Threshold CA Cost Simulator
//!
//! Compares the operational cost and the security risk of a centralized
//! certificate authority against a threshold-distributed one. Every simulated
//! period rotates all keys and reissues all certificates (update cost), then a
//! Poisson attacker may compromise nodes until the next rotation (risk cost).
//!
//! ## Core Components
//!
//! - **ca_field / ca_shamir**: modular arithmetic over the P-256 group order
//!   and k-of-n Shamir sharing of the root key scalar
//! - **ca_certs**: certificate operations behind the `CertificateProvider`
//!   trait, implemented with `rcgen`
//! - **ca_centralized / ca_distributed**: the two architectures
//! - **ca_attack**: per-node Poisson compromise timelines
//! - **ca_engine**: the period state machine and cost accounting
//! - **ca_experiment**: parameter sweeps and the comparison table
//!
//! ```no_run
//! use dpki_sim::{ExperimentRunner, RcgenProvider, SimulationConfig, Sweep, SweepVariable};
//!
//! let runner = ExperimentRunner::new(SimulationConfig::default(), RcgenProvider::new());
//! let sweep = Sweep::over(SweepVariable::T, vec![10.0, 30.0, 60.0]);
//! let results = runner.run(&sweep).unwrap();
//! dpki_sim::ca_experiment::print_table(sweep.variable, &results);
//! ```

// Primitives
pub mod ca_field;
pub mod ca_shamir;
pub mod ca_certs;

// Shared types and storage
pub mod ca_interface;
pub mod ca_memory_backend;
pub mod ca_file_backend;
pub mod ca_storage;
pub mod ca_config;

// Simulation
pub mod ca_attack;
pub mod ca_architecture;
pub mod ca_centralized;
pub mod ca_distributed;
pub mod ca_engine;
pub mod ca_experiment;

// Re-export commonly used types
pub use ca_certs::{CertificateProvider, RcgenProvider};
pub use ca_config::{ConfigError, SimulationConfig};
pub use ca_engine::{EnginePhase, SimResult, SimulationEngine};
pub use ca_experiment::{
    parse_sweep_values, ExperimentError, ExperimentResult, ExperimentRunner, Sweep, SweepVariable,
};
pub use ca_interface::{Event, EventSink, NoOpSink, NodeStore};
pub use ca_shamir::{Share, ShareError, ThresholdScheme};
pub use ca_storage::StorageMode;
