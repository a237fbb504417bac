//! Centralized CA
//!
//! `M` independent CA instances, each with its own root key and
//! `certs_per_node` leaf certificates. There is no shared secret: a compromised
//! node leaks only its own certificates, from its first attack arrival until
//! the next rotation.

use rand::Rng;

use crate::ca_architecture::{CaArchitecture, IssueError, RiskReport, UpdateReport};
use crate::ca_attack::AttackProcess;
use crate::ca_certs::CertificateProvider;
use crate::ca_config::SimulationConfig;
use crate::ca_interface::{Architecture, Event, EventSink, NodeId, NodeStore, Period, StorageError};
use crate::ca_storage::RunNamespace;

const ROOT_KEY: &str = "root_key.pem";
const ROOT_CERT: &str = "root_cert.pem";
const ROOT_SUBJECT: &str = "Centralized Root CA";

/// Centralized architecture: one self-contained CA per node
pub struct CentralizedSystem<P: CertificateProvider> {
    config: SimulationConfig,
    provider: P,
    nodes: Vec<Box<dyn NodeStore>>,
}

impl<P: CertificateProvider> CentralizedSystem<P> {
    /// Open node stores `node_0 .. node_{M-1}` in `namespace`
    pub fn new(
        config: SimulationConfig,
        provider: P,
        namespace: &RunNamespace,
    ) -> Result<Self, StorageError> {
        let nodes = (0..config.nodes)
            .map(|node| namespace.open_node(Architecture::Centralized, node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            provider,
            nodes,
        })
    }

    pub fn node_store(&self, node: NodeId) -> Option<&dyn NodeStore> {
        self.nodes.get(node).map(|store| store.as_ref())
    }

    /// Regenerate the node's root key and self-signed CA certificate
    fn rotate_root(&mut self, node: NodeId) -> Result<(), IssueError> {
        let key = self.provider.generate_keypair()?;
        let cert = self.provider.self_sign(&key, ROOT_SUBJECT)?;

        let store = &mut self.nodes[node];
        store.put(ROOT_KEY, &self.provider.serialize_key(&key))?;
        store.put(ROOT_CERT, &self.provider.serialize_cert(&cert))?;
        Ok(())
    }

    /// Load the node's issuer material back from its store
    fn load_issuer(&self, node: NodeId) -> Result<(P::Key, P::Cert), IssueError> {
        let store = &self.nodes[node];
        let key_bytes = zeroize::Zeroizing::new(store.get(ROOT_KEY)?.ok_or(IssueError::Missing(ROOT_KEY))?);
        let cert_bytes = store.get(ROOT_CERT)?.ok_or(IssueError::Missing(ROOT_CERT))?;
        Ok((
            self.provider.load_key(&key_bytes)?,
            self.provider.load_cert(&cert_bytes)?,
        ))
    }

    /// Generate a user key, request and signed certificate, and store it
    fn issue_leaf(
        &mut self,
        node: NodeId,
        issuer_key: &P::Key,
        issuer_cert: &P::Cert,
        cert_id: usize,
    ) -> Result<(), IssueError> {
        let user_key = self.provider.generate_keypair()?;
        let request = self
            .provider
            .create_request(&user_key, &format!("User_{}", cert_id))?;
        let cert = self.provider.sign_request(issuer_cert, issuer_key, &request)?;

        self.nodes[node].put(
            &format!("user_{}.pem", cert_id),
            &self.provider.serialize_cert(&cert),
        )?;
        Ok(())
    }
}

fn report_failure(
    sink: &mut dyn EventSink,
    period: Period,
    node: NodeId,
    cert_id: Option<usize>,
    err: &IssueError,
) {
    log::warn!(
        "centralized node {} cert {:?} failed in period {}: {}",
        node,
        cert_id,
        period,
        err
    );
    sink.log(
        period,
        Event::IssuanceFailed {
            architecture: Architecture::Centralized,
            node,
            cert_id,
            reason: err.to_string(),
        },
    );
}

impl<P: CertificateProvider> CaArchitecture for CentralizedSystem<P> {
    fn architecture(&self) -> Architecture {
        Architecture::Centralized
    }

    fn update_all<R: Rng + ?Sized>(
        &mut self,
        period: Period,
        _rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> UpdateReport {
        let certs_per_node = self.config.certs_per_node();
        let mut report = UpdateReport {
            cost: self.config.update_weight * (certs_per_node * self.config.nodes) as f64,
            ..Default::default()
        };

        for node in 0..self.config.nodes {
            if let Err(e) = self.rotate_root(node) {
                report_failure(sink, period, node, None, &e);
                report.skipped += certs_per_node;
                continue;
            }
            sink.log(
                period,
                Event::KeyRotated {
                    architecture: Architecture::Centralized,
                    node,
                },
            );

            let (issuer_key, issuer_cert) = match self.load_issuer(node) {
                Ok(issuer) => issuer,
                Err(e) => {
                    report_failure(sink, period, node, None, &e);
                    report.skipped += certs_per_node;
                    continue;
                }
            };

            for j in 0..certs_per_node {
                let cert_id = node * certs_per_node + j;
                match self.issue_leaf(node, &issuer_key, &issuer_cert, cert_id) {
                    Ok(()) => {
                        report.issued += 1;
                        sink.log(
                            period,
                            Event::CertificateIssued {
                                architecture: Architecture::Centralized,
                                cert_id,
                            },
                        );
                    }
                    Err(e) => {
                        report_failure(sink, period, node, Some(cert_id), &e);
                        report.skipped += 1;
                    }
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
        let certs_per_node = self.config.certs_per_node() as f64;
        let mut leakage = 0.0;
        let mut report = RiskReport::default();

        for node in 0..self.config.nodes {
            let Some(at) = process.first_arrival(rng) else {
                continue;
            };
            leakage += (1.0 - at) * certs_per_node;
            report.compromised_nodes += 1;
            report.breach_at = Some(report.breach_at.map_or(at, |b: f64| b.min(at)));
            sink.log(
                period,
                Event::NodeCompromised {
                    architecture: Architecture::Centralized,
                    node,
                    at,
                },
            );
        }

        report.risk = self.config.risk_weight * leakage;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca_certs::RcgenProvider;
    use crate::ca_interface::{CollectingSink, NoOpSink};
    use crate::ca_storage::StorageMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            nodes: 3,
            total_certs: 6,
            total_periods: 1,
            ..Default::default()
        }
    }

    fn system(config: SimulationConfig) -> CentralizedSystem<RcgenProvider> {
        let ns = StorageMode::Memory.namespace("test").unwrap();
        CentralizedSystem::new(config, RcgenProvider::new(), &ns).unwrap()
    }

    #[test]
    fn test_update_issues_and_stores_certificates() {
        let mut system = system(small_config());
        let mut rng = StdRng::from_seed([1; 32]);
        let mut sink = CollectingSink::default();

        let report = system.update_all(1, &mut rng, &mut sink);
        assert_eq!(report.issued, 6);
        assert_eq!(report.skipped, 0);
        assert!((report.cost - 0.1 * 6.0).abs() < 1e-12);

        // node 1 owns user_2 and user_3
        let keys = system.node_store(1).unwrap().keys().unwrap();
        assert!(keys.contains(&"root_key.pem".to_string()));
        assert!(keys.contains(&"root_cert.pem".to_string()));
        assert!(keys.contains(&"user_2.pem".to_string()));
        assert!(keys.contains(&"user_3.pem".to_string()));

        let rotations = sink
            .events
            .iter()
            .filter(|(_, e)| matches!(e, Event::KeyRotated { .. }))
            .count();
        assert_eq!(rotations, 3);
    }

    #[test]
    fn test_rotation_replaces_root_key() {
        let mut system = system(small_config());
        let mut rng = StdRng::from_seed([2; 32]);

        system.update_all(1, &mut rng, &mut NoOpSink);
        let first = system.node_store(0).unwrap().get(ROOT_KEY).unwrap();
        system.update_all(2, &mut rng, &mut NoOpSink);
        let second = system.node_store(0).unwrap().get(ROOT_KEY).unwrap();

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_rate_means_zero_risk() {
        let system = system(small_config());
        let mut rng = StdRng::from_seed([3; 32]);
        let process = AttackProcess::new(0.0);

        for period in 1..=50 {
            let report = system.attack(&process, period, &mut rng, &mut NoOpSink);
            assert_eq!(report.risk, 0.0);
            assert_eq!(report.compromised_nodes, 0);
            assert_eq!(report.breach_at, None);
        }
    }

    #[test]
    fn test_quiet_period_means_zero_risk() {
        let config = SimulationConfig {
            nodes: 6,
            ..small_config()
        };
        let system = system(config);
        let process = AttackProcess::new(0.2);
        let mut rng = StdRng::from_seed([7; 32]);

        let mut quiet = 0;
        let mut hit = 0;
        for period in 1..=200 {
            let mut replay = rng.clone();
            let report = system.attack(&process, period, &mut rng, &mut NoOpSink);

            let arrivals: Vec<f64> = (0..6)
                .filter_map(|_| process.first_arrival(&mut replay))
                .collect();
            assert_eq!(report.compromised_nodes, arrivals.len());
            if arrivals.is_empty() {
                assert_eq!(report.risk, 0.0);
                assert_eq!(report.breach_at, None);
                quiet += 1;
            } else {
                assert!(report.risk > 0.0);
                hit += 1;
            }
        }
        assert!(quiet > 0);
        assert!(hit > 0);
    }

    #[test]
    fn test_risk_is_additive_per_node() {
        let config = SimulationConfig {
            nodes: 6,
            total_certs: 60,
            risk_weight: 2.0,
            ..Default::default()
        };
        let system = system(config);
        let process = AttackProcess::new(1.5);

        // replay the same draws to rebuild the expected leakage node by node
        let seed = [4; 32];
        let mut sink = CollectingSink::default();
        let report = system.attack(&process, 1, &mut StdRng::from_seed(seed), &mut sink);

        let mut rng = StdRng::from_seed(seed);
        let expected: f64 = (0..6)
            .filter_map(|_| process.first_arrival(&mut rng))
            .map(|at| (1.0 - at) * 10.0)
            .sum::<f64>()
            * 2.0;

        assert!((report.risk - expected).abs() < 1e-9);
        assert_eq!(report.compromised_nodes, sink.events.len());
    }
}
