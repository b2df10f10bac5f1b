//! Validated simulation inputs.
//!
//! Everything here is checked once at construction so the simulation loops
//! never have to re-validate shapes or ranges.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::metrics::{VarConvention, DEFAULT_VAR_CONVENTION};
use crate::random::CholeskyFactor;

/// Annual risk-free rate used for the Sharpe ratio when none is given.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.04;

/// Upper bound on `steps_per_year · horizon_years`. Every step of every
/// path is kept in memory.
pub const MAX_STEPS: usize = 10_000_000;

/// Market description for `n` correlated assets.
#[derive(Debug, Clone)]
pub struct MarketParameters {
    initial_prices: Vec<f64>,
    drifts: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    weights: Vec<f64>,
    cholesky: CholeskyFactor,
}

impl MarketParameters {
    /// Builds the market from an annual covariance matrix.
    ///
    /// Fails with a `ConfigError` on shape or range problems and with a
    /// `NumericalError` if `covariance` has no Cholesky factor.
    pub fn new(
        initial_prices: Vec<f64>,
        drifts: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        let n = initial_prices.len();
        if n == 0 {
            return Err(ConfigError::invalid("initial_prices", "at least one asset is required").into());
        }
        if drifts.len() != n {
            return Err(ConfigError::dimension_mismatch("drifts", n, drifts.len()).into());
        }
        if weights.len() != n {
            return Err(ConfigError::dimension_mismatch("weights", n, weights.len()).into());
        }
        check_square("covariance", &covariance, n)?;

        for (i, &s0) in initial_prices.iter().enumerate() {
            if !s0.is_finite() || s0 <= 0.0 {
                return Err(ConfigError::invalid(
                    "initial_prices",
                    format!("price of asset {i} must be positive and finite, got {s0}"),
                )
                .into());
            }
        }
        if let Some(mu) = drifts.iter().find(|mu| !mu.is_finite()) {
            return Err(ConfigError::invalid("drifts", format!("non-finite drift {mu}")).into());
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(ConfigError::invalid("weights", format!("non-finite weight {w}")).into());
        }
        check_symmetric("covariance", &covariance)?;

        let cholesky = CholeskyFactor::decompose(&covariance)?;

        Ok(Self {
            initial_prices,
            drifts,
            covariance,
            weights,
            cholesky,
        })
    }

    /// Builds the market from per-asset volatilities and a correlation
    /// matrix: `cov[i][j] = sigma[i] * sigma[j] * corr[i][j]`.
    pub fn from_volatilities(
        initial_prices: Vec<f64>,
        drifts: Vec<f64>,
        volatilities: &[f64],
        correlation: &[Vec<f64>],
        weights: Vec<f64>,
    ) -> Result<Self> {
        let n = initial_prices.len();
        if volatilities.len() != n {
            return Err(ConfigError::dimension_mismatch("volatilities", n, volatilities.len()).into());
        }
        check_square("correlation", correlation, n)?;
        if let Some(sigma) = volatilities.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(ConfigError::invalid(
                "volatilities",
                format!("volatility must be non-negative and finite, got {sigma}"),
            )
            .into());
        }
        for (i, row) in correlation.iter().enumerate() {
            if row[i] != 1.0 {
                return Err(ConfigError::invalid(
                    "correlation",
                    format!("diagonal entry {i} must be 1, got {}", row[i]),
                )
                .into());
            }
            if let Some(rho) = row.iter().find(|rho| !rho.is_finite() || rho.abs() > 1.0) {
                return Err(ConfigError::invalid(
                    "correlation",
                    format!("entry {rho} in row {i} is outside [-1, 1]"),
                )
                .into());
            }
        }
        check_symmetric("correlation", correlation)?;

        let covariance = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| volatilities[i] * volatilities[j] * correlation[i][j])
                    .collect()
            })
            .collect();

        Self::new(initial_prices, drifts, covariance, weights)
    }

    /// Single-asset market with annual drift `mu` and volatility `sigma`.
    pub fn single_asset(initial_price: f64, mu: f64, sigma: f64) -> Result<Self> {
        Self::from_volatilities(vec![initial_price], vec![mu], &[sigma], &[vec![1.0]], vec![1.0])
    }

    pub fn num_assets(&self) -> usize {
        self.initial_prices.len()
    }

    pub fn initial_prices(&self) -> &[f64] {
        &self.initial_prices
    }

    pub fn drifts(&self) -> &[f64] {
        &self.drifts
    }

    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn cholesky(&self) -> &CholeskyFactor {
        &self.cholesky
    }

    /// Annual variance of asset `i` (the diagonal of the covariance).
    pub fn variance(&self, i: usize) -> f64 {
        self.covariance[i][i]
    }

    /// Portfolio value at t = 0: `w · S0`.
    pub fn initial_portfolio_value(&self) -> f64 {
        self.weights
            .iter()
            .zip(&self.initial_prices)
            .map(|(w, s)| w * s)
            .sum()
    }

    /// Closed-form expected terminal portfolio value `Σ wᵢ·S0ᵢ·exp(μᵢ·T)`.
    pub fn expected_portfolio_value(&self, horizon_years: f64) -> f64 {
        self.weights
            .iter()
            .zip(&self.initial_prices)
            .zip(&self.drifts)
            .map(|((w, s), mu)| w * s * (mu * horizon_years).exp())
            .sum()
    }
}

fn check_square(what: &'static str, matrix: &[Vec<f64>], n: usize) -> Result<()> {
    if matrix.len() != n {
        return Err(ConfigError::dimension_mismatch(what, n, matrix.len()).into());
    }
    for row in matrix {
        if row.len() != n {
            return Err(ConfigError::dimension_mismatch(what, n, row.len()).into());
        }
        if let Some(x) = row.iter().find(|x| !x.is_finite()) {
            return Err(ConfigError::invalid(what, format!("non-finite entry {x}")).into());
        }
    }
    Ok(())
}

fn check_symmetric(what: &'static str, matrix: &[Vec<f64>]) -> Result<()> {
    let n = matrix.len();
    for row in 0..n {
        for col in 0..row {
            let upper = matrix[col][row];
            let lower = matrix[row][col];
            let scale = upper.abs().max(lower.abs()).max(1.0);
            if (upper - lower).abs() > 1e-12 * scale {
                return Err(ConfigError::NotSymmetric {
                    what,
                    row,
                    col,
                    upper,
                    lower,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Time grid, trial count and seed of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Horizon in years.
    pub horizon_years: f64,
    pub steps_per_year: usize,
    pub num_simulations: usize,
    pub seed: u64,
    /// Annual rate the Sharpe ratio is measured against.
    pub risk_free_rate: f64,
    pub var_convention: VarConvention,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_years: 1.0,
            steps_per_year: 252,
            num_simulations: 2000,
            seed: 42,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            var_convention: DEFAULT_VAR_CONVENTION,
        }
    }
}

impl SimulationConfig {
    pub fn new(horizon_years: f64, steps_per_year: usize, num_simulations: usize, seed: u64) -> Self {
        Self {
            horizon_years,
            steps_per_year,
            num_simulations,
            seed,
            ..Self::default()
        }
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn with_var_convention(mut self, convention: VarConvention) -> Self {
        self.var_convention = convention;
        self
    }

    /// Checks the invariants every run relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.horizon_years.is_finite() || self.horizon_years <= 0.0 {
            return Err(ConfigError::invalid(
                "horizon_years",
                format!("must be positive and finite, got {}", self.horizon_years),
            )
            .into());
        }
        if self.steps_per_year < 1 {
            return Err(ConfigError::invalid("steps_per_year", "must be at least 1").into());
        }
        if self.num_simulations < 1 {
            return Err(ConfigError::invalid("num_simulations", "must be at least 1").into());
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::invalid("risk_free_rate", "must be finite").into());
        }
        let exact_steps = self.steps_per_year as f64 * self.horizon_years;
        if exact_steps > MAX_STEPS as f64 {
            return Err(ConfigError::invalid(
                "horizon_years",
                format!(
                    "{} years at {} steps per year exceeds the limit of {} steps",
                    self.horizon_years, self.steps_per_year, MAX_STEPS
                ),
            )
            .into());
        }
        if self.num_steps() < 1 {
            return Err(ConfigError::invalid(
                "horizon_years",
                format!(
                    "{} years at {} steps per year rounds to zero steps",
                    self.horizon_years, self.steps_per_year
                ),
            )
            .into());
        }
        Ok(())
    }

    /// Number of discrete steps, `round(steps_per_year · T)`.
    pub fn num_steps(&self) -> usize {
        (self.steps_per_year as f64 * self.horizon_years).round() as usize
    }

    /// Step length in years, `T / num_steps`.
    pub fn dt(&self) -> f64 {
        self.horizon_years / self.num_steps() as f64
    }
}
