//! Correlated Geometric Brownian Motion
//!
//! Advances `n` asset prices on the grid `dt = T / num_steps` with the
//! Itô-corrected log-normal update
//!
//! ```text
//! S_i(t+dt) = S_i(t) · exp((mu_i − ½·cov_ii)·dt + (L·z)_i·sqrt(dt))
//! ```
//!
//! Prices are never clamped; a non-finite or underflowed price fails the
//! run instead.

use crate::error::{NumericalError, Result};
use crate::params::{MarketParameters, SimulationConfig};
use crate::random::RandomPathGenerator;

/// `num_steps + 1` price vectors, the first one being `S0`.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePath {
    steps: Vec<Vec<f64>>,
}

impl PricePath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.steps.first().map_or(0, Vec::len)
    }

    pub fn steps(&self) -> &[Vec<f64>] {
        &self.steps
    }

    pub fn at(&self, step: usize) -> &[f64] {
        &self.steps[step]
    }

    pub fn terminal(&self) -> &[f64] {
        self.steps.last().map_or(&[], Vec::as_slice)
    }
}

/// Precomputed per-step drift and diffusion scale for one market and grid.
#[derive(Debug, Clone)]
pub struct GbmPathSimulator<'a> {
    market: &'a MarketParameters,
    num_steps: usize,
    drift: Vec<f64>,
    sqrt_dt: f64,
}

impl<'a> GbmPathSimulator<'a> {
    /// Assumes `config` has already been validated.
    pub fn new(market: &'a MarketParameters, config: &SimulationConfig) -> Self {
        let dt = config.dt();
        let drift = market
            .drifts()
            .iter()
            .enumerate()
            .map(|(i, mu)| (mu - 0.5 * market.variance(i)) * dt)
            .collect();

        Self {
            market,
            num_steps: config.num_steps(),
            drift,
            sqrt_dt: dt.sqrt(),
        }
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Per-step log drift `(mu_i − ½·cov_ii)·dt`.
    pub fn drift(&self) -> &[f64] {
        &self.drift
    }

    /// Simulates one path. `trial` and `seed` only label a failure.
    pub fn simulate(
        &self,
        rng: &mut RandomPathGenerator<'_>,
        trial: usize,
        seed: u64,
    ) -> Result<PricePath> {
        let n = self.market.num_assets();
        let mut steps = Vec::with_capacity(self.num_steps + 1);
        let mut prices = self.market.initial_prices().to_vec();
        let mut shock = vec![0.0; n];
        steps.push(prices.clone());

        for step in 1..=self.num_steps {
            rng.correlated_draw(&mut shock);
            for i in 0..n {
                let next = prices[i] * (self.drift[i] + shock[i] * self.sqrt_dt).exp();
                if !next.is_finite() || next <= 0.0 {
                    return Err(NumericalError::NonFinite {
                        trial,
                        step,
                        seed,
                        value: next,
                    }
                    .into());
                }
                prices[i] = next;
            }
            steps.push(prices.clone());
        }

        Ok(PricePath { steps })
    }
}
