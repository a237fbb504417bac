//! Architecture Model
//!
//! Common interface of the two CA designs. A period is processed in two
//! phases: [`CaArchitecture::update_all`] rotates keys and reissues every
//! certificate (fixed update cost), then [`CaArchitecture::attack`] draws the
//! attacker's timeline and prices the leaked certificate-time (risk cost).

use rand::Rng;
use thiserror::Error;

use crate::ca_attack::AttackProcess;
use crate::ca_certs::CertError;
use crate::ca_interface::{Architecture, EventSink, Period, PeriodTime, StorageError};
use crate::ca_shamir::ShareError;

/// Failure of a single rotation or issuance step
///
/// These never abort a period: the step is reported and skipped.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Cert(#[from] CertError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error("missing stored artifact {0}")]
    Missing(&'static str),
}

/// Outcome of one update phase
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateReport {
    /// V2-weighted update cost; fixed by configuration
    pub cost: f64,
    /// Certificates signed this period
    pub issued: usize,
    /// Certificates skipped after a failure
    pub skipped: usize,
}

/// Outcome of one attack phase
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskReport {
    /// V1-weighted leaked certificate-time
    pub risk: f64,
    /// Distinct nodes with at least one arrival
    pub compromised_nodes: usize,
    /// Time from which certificates leaked, if any did
    pub breach_at: Option<PeriodTime>,
}

/// One CA design driven by the simulation engine
pub trait CaArchitecture {
    fn architecture(&self) -> Architecture;

    /// Rotate every root key and reissue every certificate
    fn update_all<R: Rng + ?Sized>(
        &mut self,
        period: Period,
        rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> UpdateReport;

    /// Draw the attacker's arrivals for one period and price the leakage
    fn attack<R: Rng + ?Sized>(
        &self,
        process: &AttackProcess,
        period: Period,
        rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> RiskReport;
}
