/// Simulation Configuration
///
/// Parameters of one simulated experiment and the quantities derived from
/// them. Field names on the wire (YAML scenarios, result dumps) are the short
/// names `M, T, p, V1, V2`.

use thiserror::Error;

/// Errors from validating a configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("node count M must be at least 1")]
    NoNodes,

    #[error("rotation period T must be positive and finite, got {0}")]
    InvalidPeriod(f64),

    #[error("attack rate p must be non-negative and finite, got {0}")]
    InvalidAttackRate(f64),

    /// λ = p × T overflows, so arrivals cannot be drawn
    #[error("attack intensity p×T is not finite (p={p}, T={period})")]
    InvalidAttackIntensity { p: f64, period: f64 },

    #[error("cost weight {name} must be finite, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("total_certs must be at least 1")]
    NoCertificates,

    #[error("total_periods must be at least 1")]
    NoPeriods,

    /// K = max(2, M/3) exceeds M, so the root secret could never be rebuilt
    #[error("threshold K={k} exceeds node count M={m}; reconstruction is impossible")]
    ThresholdExceedsNodes { k: usize, m: usize },
}

/// Configuration for one simulation run
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of CA nodes (M)
    #[serde(rename = "M")]
    pub nodes: usize,

    /// Key rotation period in seconds (T)
    #[serde(rename = "T")]
    pub period: f64,

    /// Per-node attack rate in events per second (p)
    #[serde(rename = "p")]
    pub attack_rate: f64,

    /// Weight of leaked certificate-time (V1)
    #[serde(rename = "V1")]
    pub risk_weight: f64,

    /// Weight of a certificate update (V2)
    #[serde(rename = "V2")]
    pub update_weight: f64,

    /// Certificates managed by the whole system
    pub total_certs: usize,

    /// Number of simulated periods
    pub total_periods: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 6,
            period: 30.0,
            attack_rate: 0.001,
            risk_weight: 75.0,
            update_weight: 0.1,
            total_certs: 60,
            total_periods: 100,
        }
    }
}

impl SimulationConfig {
    /// Reconstruction threshold K = max(2, floor(M/3))
    pub fn threshold(&self) -> usize {
        (self.nodes / 3).max(2)
    }

    /// Certificates owned by each centralized node, floor(total_certs / M)
    pub fn certs_per_node(&self) -> usize {
        if self.nodes == 0 {
            return 0;
        }
        self.total_certs / self.nodes
    }

    /// Attack arrivals per normalized period, λ = p × T
    pub fn poisson_lambda(&self) -> f64 {
        self.attack_rate * self.period
    }

    /// Check every invariant a run relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(ConfigError::InvalidPeriod(self.period));
        }
        if !(self.attack_rate.is_finite() && self.attack_rate >= 0.0) {
            return Err(ConfigError::InvalidAttackRate(self.attack_rate));
        }
        if !self.poisson_lambda().is_finite() {
            return Err(ConfigError::InvalidAttackIntensity {
                p: self.attack_rate,
                period: self.period,
            });
        }
        for (name, value) in [("V1", self.risk_weight), ("V2", self.update_weight)] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if self.total_certs == 0 {
            return Err(ConfigError::NoCertificates);
        }
        if self.total_periods == 0 {
            return Err(ConfigError::NoPeriods);
        }

        let k = self.threshold();
        if k > self.nodes {
            return Err(ConfigError::ThresholdExceedsNodes { k, m: self.nodes });
        }

        if self.certs_per_node() == 0 {
            log::warn!(
                "total_certs={} < M={}: centralized nodes hold no certificates",
                self.total_certs,
                self.nodes
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.threshold(), 2);
        assert_eq!(config.certs_per_node(), 10);
        assert!((config.poisson_lambda() - 0.03).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_derivation() {
        let with_nodes = |nodes| SimulationConfig {
            nodes,
            ..Default::default()
        };
        assert_eq!(with_nodes(3).threshold(), 2);
        assert_eq!(with_nodes(8).threshold(), 2);
        assert_eq!(with_nodes(9).threshold(), 3);
        assert_eq!(with_nodes(50).threshold(), 16);
        assert_eq!(with_nodes(500).threshold(), 166);
    }

    #[test]
    fn test_certs_per_node_floors() {
        let config = SimulationConfig {
            nodes: 7,
            total_certs: 60,
            ..Default::default()
        };
        assert_eq!(config.certs_per_node(), 8);
    }

    #[test]
    fn test_threshold_above_node_count_rejected() {
        let config = SimulationConfig {
            nodes: 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdExceedsNodes { k: 2, m: 1 })
        );

        let config = SimulationConfig {
            nodes: 2,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = SimulationConfig::default();

        let cases = [
            SimulationConfig { nodes: 0, ..base.clone() },
            SimulationConfig { period: 0.0, ..base.clone() },
            SimulationConfig { period: f64::NAN, ..base.clone() },
            SimulationConfig { attack_rate: -0.1, ..base.clone() },
            SimulationConfig { risk_weight: f64::INFINITY, ..base.clone() },
            SimulationConfig { total_certs: 0, ..base.clone() },
            SimulationConfig { total_periods: 0, ..base.clone() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_overflowing_attack_intensity_rejected() {
        let config = SimulationConfig {
            attack_rate: 1e300,
            period: 1e10,
            ..Default::default()
        };
        assert!(config.attack_rate.is_finite() && config.period.is_finite());
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidAttackIntensity {
                p: 1e300,
                period: 1e10
            })
        );

        // large but finite λ is a valid (certain) compromise
        let config = SimulationConfig {
            attack_rate: 1.0,
            period: 1e10,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_field_names() {
        let config: SimulationConfig =
            serde_yaml::from_str("M: 12\nT: 60\np: 0.01\nV1: 10\n").unwrap();
        assert_eq!(config.nodes, 12);
        assert_eq!(config.period, 60.0);
        assert_eq!(config.attack_rate, 0.01);
        assert_eq!(config.risk_weight, 10.0);
        // omitted fields fall back to defaults
        assert_eq!(config.update_weight, 0.1);
        assert_eq!(config.total_periods, 100);
    }
}
