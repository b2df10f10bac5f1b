//! Driver settings.
//!
//! Settings come from an optional TOML file plus `MCRISK__*` environment
//! overrides (for example `MCRISK__PORTFOLIO__SIMULATION__SEED=7`). Any
//! section or key left out falls back to the defaults below.

use std::path::Path;

use serde::Deserialize;

use crate::cashflow::{ContributionSchedule, WithdrawalSchedule};
use crate::error::{SettingsError, SimError};
use crate::metrics::VarConvention;
use crate::params::{MarketParameters, SimulationConfig};

/// Root of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub portfolio: PortfolioSettings,
    pub retirement: RetirementSettings,
    pub risk_analysis: RiskAnalysisSettings,
}

/// Correlated multi-asset portfolio described by a covariance matrix.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortfolioSettings {
    pub asset_names: Vec<String>,
    pub initial_prices: Vec<f64>,
    pub drifts: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub simulation: SimulationConfig,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            asset_names: vec!["Asset_A".into(), "Asset_B".into(), "Asset_C".into()],
            initial_prices: vec![100.0, 50.0, 20.0],
            drifts: vec![0.08, 0.06, 0.12],
            covariance: vec![
                vec![0.04, 0.006, 0.01],
                vec![0.006, 0.0225, 0.008],
                vec![0.01, 0.008, 0.09],
            ],
            weights: vec![0.5, 0.3, 0.2],
            simulation: SimulationConfig::new(1.0, 252, 2000, 42),
        }
    }
}

impl PortfolioSettings {
    pub fn market(&self) -> Result<MarketParameters, SimError> {
        MarketParameters::new(
            self.initial_prices.clone(),
            self.drifts.clone(),
            self.covariance.clone(),
            self.weights.clone(),
        )
    }
}

/// Savings that accumulate until retirement and are then drawn down.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetirementSettings {
    /// Expected nominal annual return.
    pub mu: f64,
    /// Annual volatility.
    pub sigma: f64,
    /// Annual inflation applied to withdrawals.
    pub inflation: f64,
    pub years_to_retirement: usize,
    pub retirement_years: usize,
    pub initial_portfolio: f64,
    pub annual_contribution: f64,
    /// Desired yearly withdrawal in today's money.
    pub withdrawal_real: f64,
    pub num_simulations: usize,
    pub seed: u64,
    pub risk_free_rate: f64,
}

impl Default for RetirementSettings {
    fn default() -> Self {
        Self {
            mu: 0.06,
            sigma: 0.12,
            inflation: 0.02,
            years_to_retirement: 20,
            retirement_years: 30,
            initial_portfolio: 200_000.0,
            annual_contribution: 10_000.0,
            withdrawal_real: 40_000.0,
            num_simulations: 5000,
            seed: 42,
            risk_free_rate: crate::params::DEFAULT_RISK_FREE_RATE,
        }
    }
}

impl RetirementSettings {
    pub fn market(&self) -> Result<MarketParameters, SimError> {
        MarketParameters::single_asset(1.0, self.mu, self.sigma)
    }

    pub fn contribution(&self) -> ContributionSchedule {
        ContributionSchedule {
            amount: self.annual_contribution,
            periods: self.years_to_retirement,
        }
    }

    pub fn withdrawal(&self) -> WithdrawalSchedule {
        WithdrawalSchedule {
            real_amount: self.withdrawal_real,
            inflation: self.inflation,
        }
    }

    /// One period per year over the whole accumulation and retirement span.
    pub fn simulation(&self) -> SimulationConfig {
        let years = self.years_to_retirement + self.retirement_years;
        SimulationConfig::new(years as f64, 1, self.num_simulations, self.seed)
            .with_risk_free_rate(self.risk_free_rate)
    }
}

/// Portfolio described by volatilities and a correlation matrix, starting
/// from a fixed total value split equally across assets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskAnalysisSettings {
    pub initial_value: f64,
    pub drifts: Vec<f64>,
    pub volatilities: Vec<f64>,
    pub correlation: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub simulation: SimulationConfig,
}

impl Default for RiskAnalysisSettings {
    fn default() -> Self {
        Self {
            initial_value: 100.0,
            drifts: vec![0.10, 0.07, 0.12],
            volatilities: vec![0.18, 0.10, 0.22],
            correlation: vec![
                vec![1.0, 0.2, 0.1],
                vec![0.2, 1.0, 0.25],
                vec![0.1, 0.25, 1.0],
            ],
            weights: vec![0.4, 0.3, 0.3],
            simulation: SimulationConfig::new(1.0, 252, 500, 42)
                .with_var_convention(VarConvention::MeanRelative),
        }
    }
}

impl RiskAnalysisSettings {
    pub fn market(&self) -> Result<MarketParameters, SimError> {
        let n = self.drifts.len().max(1);
        MarketParameters::from_volatilities(
            vec![self.initial_value / n as f64; self.drifts.len()],
            self.drifts.clone(),
            &self.volatilities,
            &self.correlation,
            self.weights.clone(),
        )
    }
}

impl Settings {
    /// Checks that every section describes a valid market and time grid.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |section: &'static str| move |source: SimError| SettingsError::Invalid { section, source };

        self.portfolio.market().map_err(invalid("portfolio"))?;
        self.portfolio.simulation.validate().map_err(invalid("portfolio"))?;

        self.retirement.market().map_err(invalid("retirement"))?;
        self.retirement.simulation().validate().map_err(invalid("retirement"))?;

        self.risk_analysis.market().map_err(invalid("risk_analysis"))?;
        self.risk_analysis.simulation.validate().map_err(invalid("risk_analysis"))?;

        Ok(())
    }
}

/// `MCRISK__SECTION__KEY` overrides, e.g. `MCRISK__RETIREMENT__SEED`.
fn environment() -> config::Environment {
    config::Environment::with_prefix("MCRISK")
        .separator("__")
        .try_parsing(true)
}

/// Loads settings from `path` (if given) and the environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    load_with_environment(path, environment())
}

fn load_with_environment(path: Option<&Path>, env: config::Environment) -> Result<Settings, SettingsError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
