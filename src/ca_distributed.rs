//! Distributed Threshold CA
//!
//! One logical root key, re-generated every period and split into `M` shares
//! with threshold `K`. A fixed quorum (nodes `1..=K`) rebuilds the key to sign
//! each certificate, and every signed certificate is replicated to all `M`
//! nodes.
//!
//! ## Compromise model
//! Arrivals from all nodes are merged and scanned in time order. The system
//! falls when the `K`-th *distinct* node is hit; from then on every
//! certificate leaks until the next rotation. Repeat arrivals at an already
//! compromised node do not move the count.

use hashbrown::HashSet;
use rand::Rng;

use crate::ca_architecture::{CaArchitecture, IssueError, RiskReport, UpdateReport};
use crate::ca_attack::{AttackProcess, CompromiseEvent};
use crate::ca_certs::CertificateProvider;
use crate::ca_config::SimulationConfig;
use crate::ca_interface::{
    Architecture, Event, EventSink, NodeId, NodeStore, Period, PeriodTime, StorageError,
};
use crate::ca_shamir::{Share, ShareError, ThresholdScheme};
use crate::ca_storage::RunNamespace;

const ROOT_CERT: &str = "root_cert.pem";
const ROOT_PUBLIC_KEY: &str = "root_public_key.bin";
const SHARE: &str = "share.json";
const ROOT_SUBJECT: &str = "Distributed Threshold CA";

/// Node id used in events about the shared root (nodes are numbered from 1)
pub const AUTHORITY: NodeId = 0;

/// Time at which the `k`-th distinct node appears in time-ordered `events`
pub fn threshold_breach(events: &[CompromiseEvent], k: usize) -> Option<PeriodTime> {
    let mut compromised = HashSet::new();
    for event in events {
        compromised.insert(event.node);
        if compromised.len() >= k {
            return Some(event.timestamp);
        }
    }
    None
}

/// Distributed architecture: threshold-shared root, fully replicated storage
pub struct DistributedSystem<P: CertificateProvider> {
    config: SimulationConfig,
    provider: P,
    scheme: ThresholdScheme,
    authority: Box<dyn NodeStore>,
    /// `nodes[i]` belongs to node id `i + 1`
    nodes: Vec<Box<dyn NodeStore>>,
}

impl<P: CertificateProvider> DistributedSystem<P> {
    /// Open the authority area and node stores `node_1 ..= node_M`
    ///
    /// `config` must be validated; `K > M` is rejected here as well.
    pub fn new(
        config: SimulationConfig,
        provider: P,
        namespace: &RunNamespace,
    ) -> Result<Self, IssueError> {
        let scheme = ThresholdScheme::new(config.nodes, config.threshold())?;
        let authority = namespace.open_authority()?;
        let nodes = (1..=config.nodes)
            .map(|node| namespace.open_node(Architecture::Distributed, node))
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(Self {
            config,
            provider,
            scheme,
            authority,
            nodes,
        })
    }

    /// Signing quorum: the first `K` node ids
    pub fn quorum(&self) -> Vec<NodeId> {
        (1..=self.scheme.k).collect()
    }

    pub fn threshold(&self) -> usize {
        self.scheme.k
    }

    pub fn node_store(&self, node: NodeId) -> Option<&dyn NodeStore> {
        node.checked_sub(1)
            .and_then(|i| self.nodes.get(i))
            .map(|store| store.as_ref())
    }

    pub fn node_store_mut(&mut self, node: NodeId) -> Option<&mut (dyn NodeStore + 'static)> {
        let i = node.checked_sub(1)?;
        self.nodes.get_mut(i).map(|store| store.as_mut())
    }

    /// New root key and certificate; shares go to the nodes, the key is dropped
    pub fn initialize_ca<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), IssueError> {
        let key = self.provider.generate_keypair()?;
        let cert = self.provider.self_sign(&key, ROOT_SUBJECT)?;
        self.authority
            .put(ROOT_CERT, &self.provider.serialize_cert(&cert))?;
        self.authority
            .put(ROOT_PUBLIC_KEY, &self.provider.public_key(&key))?;

        let secret = self.provider.key_to_integer(&key)?;
        drop(key);
        let shares = self.scheme.split(&secret, rng)?;
        drop(secret);

        for share in &shares {
            self.nodes[share.index as usize - 1].put(SHARE, &share.to_record())?;
        }
        Ok(())
    }

    /// Shares held by the quorum members; unreadable shares are left out
    fn collect_shares(&self, quorum: &[NodeId]) -> Vec<Share> {
        let mut shares = Vec::with_capacity(quorum.len());
        for &node in quorum {
            let Some(store) = self.node_store(node) else {
                continue;
            };
            match store.get(SHARE) {
                Ok(Some(bytes)) => match Share::from_record(&bytes) {
                    Ok(share) => shares.push(share),
                    Err(e) => log::warn!("node {}: unreadable share: {}", node, e),
                },
                Ok(None) => log::debug!("node {}: no share stored", node),
                Err(e) => log::warn!("node {}: share lookup failed: {}", node, e),
            }
        }
        shares
    }

    /// Threshold-sign `request` with the shares of `quorum`
    ///
    /// Fails with [`ShareError::InsufficientShares`] before any reconstruction
    /// when the quorum cannot supply `K` shares.
    pub fn sign_request(
        &self,
        request: &P::Request,
        quorum: &[NodeId],
    ) -> Result<P::Cert, IssueError> {
        let shares = self.collect_shares(quorum);
        let secret = self.scheme.reconstruct(&shares)?;

        let public_key = self
            .authority
            .get(ROOT_PUBLIC_KEY)?
            .ok_or(IssueError::Missing(ROOT_PUBLIC_KEY))?;
        let key = self.provider.integer_to_key(&secret, &public_key)?;
        drop(secret);

        let cert_bytes = self.authority.get(ROOT_CERT)?.ok_or(IssueError::Missing(ROOT_CERT))?;
        let root = self.provider.load_cert(&cert_bytes)?;
        Ok(self.provider.sign_request(&root, &key, request)?)
    }

    /// Copy a signed certificate into every node's storage
    fn replicate(&mut self, cert: &P::Cert, cert_id: usize, period: Period, sink: &mut dyn EventSink) {
        let bytes = self.provider.serialize_cert(cert);
        let key = format!("certs/user_{}.pem", cert_id);
        for (i, store) in self.nodes.iter_mut().enumerate() {
            if let Err(e) = store.put(&key, &bytes) {
                let node = i + 1;
                log::warn!("replicating user_{} to node {} failed: {}", cert_id, node, e);
                sink.log(
                    period,
                    Event::IssuanceFailed {
                        architecture: Architecture::Distributed,
                        node,
                        cert_id: Some(cert_id),
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn issue(&self, cert_id: usize, quorum: &[NodeId]) -> Result<P::Cert, IssueError> {
        let user_key = self.provider.generate_keypair()?;
        let request = self
            .provider
            .create_request(&user_key, &format!("User_{}", cert_id))?;
        self.sign_request(&request, quorum)
    }
}

impl<P: CertificateProvider> CaArchitecture for DistributedSystem<P> {
    fn architecture(&self) -> Architecture {
        Architecture::Distributed
    }

    fn update_all<R: Rng + ?Sized>(
        &mut self,
        period: Period,
        rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> UpdateReport {
        let total_certs = self.config.total_certs;
        let mut report = UpdateReport {
            // replication dominates: every certificate lands on every node
            cost: self.config.update_weight * (total_certs * self.config.nodes) as f64,
            ..Default::default()
        };

        if let Err(e) = self.initialize_ca(rng) {
            log::warn!("distributed root rotation failed in period {}: {}", period, e);
            sink.log(
                period,
                Event::IssuanceFailed {
                    architecture: Architecture::Distributed,
                    node: AUTHORITY,
                    cert_id: None,
                    reason: e.to_string(),
                },
            );
            report.skipped = total_certs;
            return report;
        }
        sink.log(
            period,
            Event::KeyRotated {
                architecture: Architecture::Distributed,
                node: AUTHORITY,
            },
        );

        let quorum = self.quorum();
        for cert_id in 0..total_certs {
            match self.issue(cert_id, &quorum) {
                Ok(cert) => {
                    self.replicate(&cert, cert_id, period, sink);
                    report.issued += 1;
                    sink.log(
                        period,
                        Event::CertificateIssued {
                            architecture: Architecture::Distributed,
                            cert_id,
                        },
                    );
                }
                Err(IssueError::Share(ShareError::InsufficientShares { needed, got })) => {
                    log::warn!(
                        "quorum failure: user_{} not signed in period {} ({} of {} shares)",
                        cert_id,
                        period,
                        got,
                        needed
                    );
                    sink.log(
                        period,
                        Event::QuorumFailure {
                            cert_id,
                            needed,
                            available: got,
                        },
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    log::warn!("user_{} not signed in period {}: {}", cert_id, period, e);
                    sink.log(
                        period,
                        Event::IssuanceFailed {
                            architecture: Architecture::Distributed,
                            node: AUTHORITY,
                            cert_id: Some(cert_id),
                            reason: e.to_string(),
                        },
                    );
                    report.skipped += 1;
                }
            }
        }

        report
    }

    fn attack<R: Rng + ?Sized>(
        &self,
        process: &AttackProcess,
        period: Period,
        rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> RiskReport {
        let k = self.scheme.k;
        let events = process.period_events(1..=self.config.nodes, rng);
        let breach_at = threshold_breach(&events, k);

        // distinct nodes hit before the breach (or all period without one)
        let cutoff = breach_at.unwrap_or(f64::INFINITY);
        let mut seen = HashSet::new();
        for event in events.iter().take_while(|e| e.timestamp <= cutoff) {
            if seen.insert(event.node) {
                sink.log(
                    period,
                    Event::NodeCompromised {
                        architecture: Architecture::Distributed,
                        node: event.node,
                        at: event.timestamp,
                    },
                );
            }
        }

        let mut report = RiskReport {
            compromised_nodes: seen.len(),
            breach_at,
            ..Default::default()
        };
        if let Some(at) = breach_at {
            sink.log(period, Event::ThresholdReached { at, threshold: k });
            report.risk = self.config.risk_weight * (1.0 - at) * self.config.total_certs as f64;
        }
        report
    }
}
