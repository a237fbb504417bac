// Shared types and seams for the CA cost simulator
//
// Node identities, the structured event channel, and the per-node
// key-value storage abstraction used by both architectures.

use std::fmt;

use thiserror::Error;

/// Node identity. Distributed shares use 1-based ids (share index == node id),
/// centralized nodes are numbered from 0.
pub type NodeId = usize;

/// Simulated period number (1-based)
pub type Period = u32;

/// Normalized time inside a period, in (0, 1]
pub type PeriodTime = f64;

/// The two CA designs under comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Architecture {
    Centralized,
    Distributed,
}

impl Architecture {
    /// Directory/namespace component for this architecture
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Centralized => "centralized",
            Architecture::Distributed => "distributed",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event Logging System
// ============================================================================

/// Events emitted by the simulation for debugging and analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Root key regenerated and CA certificate re-created
    KeyRotated {
        architecture: Architecture,
        node: NodeId,
    },
    /// Leaf certificate issued and stored
    CertificateIssued {
        architecture: Architecture,
        cert_id: usize,
    },
    /// Quorum could not supply K shares, certificate skipped
    QuorumFailure {
        cert_id: usize,
        needed: usize,
        available: usize,
    },
    /// A cryptographic or storage step failed, certificate (or node) skipped
    IssuanceFailed {
        architecture: Architecture,
        node: NodeId,
        cert_id: Option<usize>,
        reason: String,
    },
    /// First attack arrival at a node inside the period
    NodeCompromised {
        architecture: Architecture,
        node: NodeId,
        at: PeriodTime,
    },
    /// K-th distinct distributed node compromised, root secret reconstructible
    ThresholdReached { at: PeriodTime, threshold: usize },
    /// Period accounting closed for one architecture
    PeriodClosed {
        architecture: Architecture,
        update_cost: f64,
        risk_cost: f64,
    },
}

/// Trait for consuming events from the simulation
pub trait EventSink {
    fn log(&mut self, period: Period, event: Event);
}

/// No-op event sink (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _period: Period, _event: Event) {}
}

/// Forwards events to the `log` facade
///
/// Failures are already reported with `warn!` where they happen, so they are
/// only traced here.
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn log(&mut self, period: Period, event: Event) {
        match event {
            Event::ThresholdReached { at, threshold } => log::debug!(
                "period {}: threshold {} reached at {:.4}",
                period,
                threshold,
                at
            ),
            Event::NodeCompromised {
                architecture,
                node,
                at,
            } => log::debug!(
                "period {}: {} node {} compromised at {:.4}",
                period,
                architecture,
                node,
                at
            ),
            Event::PeriodClosed {
                architecture,
                update_cost,
                risk_cost,
            } => log::debug!(
                "period {}: {} update={:.4} risk={:.4}",
                period,
                architecture,
                update_cost,
                risk_cost
            ),
            other => log::trace!("period {}: {:?}", period, other),
        }
    }
}

/// Keeps every event in memory, tagged with its period
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<(Period, Event)>,
}

impl EventSink for CollectingSink {
    fn log(&mut self, period: Period, event: Event) {
        self.events.push((period, event));
    }
}

// ============================================================================
// Node Storage
// ============================================================================

/// Errors raised by node storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Namespaced key-value area owned by a single node
///
/// Keys are relative, `/`-separated names such as `certs/user_3.pem`.
pub trait NodeStore {
    /// Fetch the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`; returns whether it existed
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;

    /// All keys currently held by this node
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Reject keys that could escape a node's namespace
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
