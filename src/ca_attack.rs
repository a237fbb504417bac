//! Attack Process
//!
//! Per-node compromise timing inside one normalized period `(0, 1]`.
//! Arrivals form a homogeneous Poisson process with rate `λ = p × T`, drawn
//! as exponential inter-arrival gaps accumulated on a time cursor; the first
//! arrival past `1.0` ends the timeline and is discarded.
//!
//! Timelines are lazy and never memoized: each call to
//! [`AttackProcess::arrivals`] draws a fresh sequence from the caller's RNG, so
//! a fixed seed and a fixed call order (period, then node) reproduce a run.

use std::iter::FusedIterator;

use rand::Rng;

use crate::ca_interface::{NodeId, PeriodTime};

/// One attack arrival at a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompromiseEvent {
    pub timestamp: PeriodTime,
    pub node: NodeId,
}

/// Poisson attack generator over the unit interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackProcess {
    lambda: f64,
}

impl AttackProcess {
    /// Arrival rate per normalized period (λ = p × T)
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Lazy arrival times of one node in one period
    pub fn arrivals<'r, R: Rng + ?Sized>(&self, rng: &'r mut R) -> Arrivals<'r, R> {
        Arrivals {
            rng,
            lambda: self.lambda,
            cursor: 0.0,
            // λ = 0 means the attacker never shows up
            done: !(self.lambda.is_finite() && self.lambda > 0.0),
        }
    }

    /// First arrival of a node's timeline; the rest of the timeline is still drawn
    pub fn first_arrival<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<PeriodTime> {
        let mut arrivals = self.arrivals(rng);
        let first = arrivals.next();
        arrivals.for_each(drop);
        first
    }

    /// Every arrival at nodes `nodes`, sorted ascending by timestamp
    pub fn period_events<R, I>(&self, nodes: I, rng: &mut R) -> Vec<CompromiseEvent>
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = NodeId>,
    {
        let mut events = Vec::new();
        for node in nodes {
            events.extend(
                self.arrivals(rng)
                    .map(|timestamp| CompromiseEvent { timestamp, node }),
            );
        }
        // stable sort keeps node order for equal timestamps
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        events
    }
}

/// Iterator over arrival times in `(0, 1]`
pub struct Arrivals<'r, R: ?Sized> {
    rng: &'r mut R,
    lambda: f64,
    cursor: f64,
    done: bool,
}

impl<R: Rng + ?Sized> Iterator for Arrivals<'_, R> {
    type Item = PeriodTime;

    fn next(&mut self) -> Option<PeriodTime> {
        if self.done {
            return None;
        }

        // exponential gap with mean 1/λ by inversion; 1 - u lies in (0, 1]
        let u: f64 = self.rng.gen();
        self.cursor += -(1.0 - u).ln() / self.lambda;

        if self.cursor > 1.0 {
            self.done = true;
            return None;
        }
        Some(self.cursor)
    }
}

impl<R: Rng + ?Sized> FusedIterator for Arrivals<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_rate_never_arrives() {
        let mut rng = StdRng::from_seed([1; 32]);
        let process = AttackProcess::new(0.0);

        assert_eq!(process.arrivals(&mut rng).count(), 0);
        assert_eq!(process.first_arrival(&mut rng), None);
        assert!(process.period_events(0..10, &mut rng).is_empty());
    }

    #[test]
    fn test_arrivals_are_increasing_and_in_window() {
        let mut rng = StdRng::from_seed([2; 32]);
        let process = AttackProcess::new(25.0);

        for _ in 0..100 {
            let times: Vec<f64> = process.arrivals(&mut rng).collect();
            assert!(times.iter().all(|&t| t >= 0.0 && t <= 1.0));
            assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_mean_arrival_count_matches_lambda() {
        let mut rng = StdRng::from_seed([3; 32]);
        let process = AttackProcess::new(4.0);

        let trials = 20_000;
        let total: usize = (0..trials).map(|_| process.arrivals(&mut rng).count()).sum();
        let mean = total as f64 / trials as f64;
        assert!((mean - 4.0).abs() < 0.1, "mean arrivals {}", mean);
    }

    #[test]
    fn test_first_arrival_probability() {
        // P(at least one arrival) = 1 - e^{-λ}
        let mut rng = StdRng::from_seed([4; 32]);
        let process = AttackProcess::new(0.5);

        let trials = 20_000;
        let hits = (0..trials)
            .filter(|_| process.first_arrival(&mut rng).is_some())
            .count();
        let expected = 1.0 - (-0.5f64).exp();
        let observed = hits as f64 / trials as f64;
        assert!((observed - expected).abs() < 0.02, "observed {}", observed);
    }

    #[test]
    fn test_timelines_are_reproducible() {
        let process = AttackProcess::new(3.0);
        let a: Vec<f64> = process.arrivals(&mut StdRng::from_seed([5; 32])).collect();
        let b: Vec<f64> = process.arrivals(&mut StdRng::from_seed([5; 32])).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_period_events_sorted_across_nodes() {
        let mut rng = StdRng::from_seed([6; 32]);
        let process = AttackProcess::new(2.0);

        let events = process.period_events(1..=6, &mut rng);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(events.iter().all(|e| (1..=6).contains(&e.node)));
    }
}
