//! Risk metrics over a population of simulated outcomes.
//!
//! ## Metrics
//! - Mean, median, population standard deviation (divides by N)
//! - Percentiles P1, P5, P95 (linear interpolation between order statistics)
//! - Value at Risk at 95% under a named [`VarConvention`]
//! - Expected Shortfall (CVaR) at 95%: `mean − mean(outcomes ≤ P5)`
//! - Sharpe ratio of the terminal distribution
//! - Maximum drawdown over attached paths
//! - Success rate and ruin timing for cash-flow populations

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NumericalError, Result};

/// How VaR95 is measured against the 5th percentile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarConvention {
    /// `mean − P5`; consistent with the CVaR definition.
    #[default]
    MeanRelative,
    /// `max(0, initial − P5)`; a pure loss from the starting value.
    InitialRelative,
}

/// Convention used unless a run asks for another one.
pub const DEFAULT_VAR_CONVENTION: VarConvention = VarConvention::MeanRelative;

impl VarConvention {
    pub fn all() -> Vec<Self> {
        vec![Self::MeanRelative, Self::InitialRelative]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanRelative => "mean − P5",
            Self::InitialRelative => "initial − P5",
        }
    }

    /// VaR from the population mean, the start value and P5.
    pub fn value_at_risk(&self, mean: f64, initial: f64, p5: f64) -> f64 {
        match self {
            Self::MeanRelative => mean - p5,
            Self::InitialRelative => (initial - p5).max(0.0),
        }
    }
}

/// Percentile `p` (0–100) of an ascending slice, interpolating linearly
/// between the two nearest order statistics.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with divisor N.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// `max_t (1 − value_t / running_max_t)` over one path.
///
/// Steps where the running maximum is not positive carry no meaningful
/// drawdown and are skipped; `None` if no step qualifies.
pub fn max_drawdown(values: &[f64]) -> Option<f64> {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: Option<f64> = None;

    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            let dd = 1.0 - v / peak;
            worst = Some(worst.map_or(dd, |w| w.max(dd)));
        }
    }

    worst
}

/// Ruin information attached to a cash-flow population.
#[derive(Debug, Clone)]
pub struct RuinRecord {
    /// Ruin period per trial, `None` for trials that never ruined.
    pub periods: Vec<Option<usize>>,
    /// Number of periods before withdrawals start.
    pub withdrawal_start: usize,
    /// Total number of simulated periods.
    pub total_periods: usize,
}

/// Terminal outcomes of a run, one per trial, in trial order.
#[derive(Debug, Clone)]
pub struct OutcomePopulation<'a> {
    outcomes: Vec<f64>,
    paths: Vec<&'a [f64]>,
    ruin: Option<RuinRecord>,
}

impl<'a> OutcomePopulation<'a> {
    pub fn new(outcomes: Vec<f64>) -> Self {
        Self {
            outcomes,
            paths: Vec::new(),
            ruin: None,
        }
    }

    /// Attaches the per-trial value paths used for drawdown.
    pub fn with_paths(mut self, paths: Vec<&'a [f64]>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_ruin(mut self, ruin: RuinRecord) -> Self {
        self.ruin = Some(ruin);
        self
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[f64] {
        &self.outcomes
    }
}

/// Ruin timing among ruined trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuinTiming {
    /// No trial ruined, so there is no earliest or median ruin period.
    NotApplicable,
    Observed { earliest: usize, median: f64 },
}

impl RuinTiming {
    pub fn earliest(&self) -> Option<usize> {
        match self {
            Self::NotApplicable => None,
            Self::Observed { earliest, .. } => Some(*earliest),
        }
    }

    pub fn median(&self) -> Option<f64> {
        match self {
            Self::NotApplicable => None,
            Self::Observed { median, .. } => Some(*median),
        }
    }
}

impl fmt::Display for RuinTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => write!(f, "n/a"),
            Self::Observed { earliest, median } => {
                write!(f, "earliest period {earliest}, median period {median:.1}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuinStatistics {
    pub ruined: usize,
    /// `1 − ruined / N`.
    pub success_rate: f64,
    pub timing: RuinTiming,
    /// Ruin counts by period since withdrawals began (index 0 = first
    /// withdrawal period).
    pub by_withdrawal_period: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskReport {
    pub runs: usize,
    pub initial_value: f64,

    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p1: f64,
    pub p5: f64,
    pub p95: f64,

    pub var_convention: VarConvention,
    pub var_95: f64,
    pub cvar_95: f64,

    /// Fraction of trials ending below the initial value.
    pub probability_of_loss: f64,
    /// `None` when the initial value is not positive or the outcomes have
    /// zero dispersion.
    pub sharpe_ratio: Option<f64>,
    /// Worst drawdown over all attached paths.
    pub max_drawdown: Option<f64>,
    pub mean_max_drawdown: Option<f64>,

    pub ruin: Option<RuinStatistics>,
}

impl RiskReport {
    pub fn print(&self) {
        print!("{self}");
    }

    /// 1-based retirement year paired with the number of trials ruined in
    /// it, skipping years without ruin.
    pub fn ruin_by_withdrawal_year(&self) -> Vec<(usize, usize)> {
        self.ruin
            .iter()
            .flat_map(|r| r.by_withdrawal_period.iter().enumerate())
            .filter(|(_, &count)| count > 0)
            .map(|(k, &count)| (k + 1, count))
            .collect()
    }
}

const LABEL_WIDTH: usize = 25;

fn row(f: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "  {:<width$}{}", format!("{label}:"), value, width = LABEL_WIDTH)
}

impl fmt::Display for RiskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        row(f, "Runs", self.runs)?;
        row(f, "Initial value", format!("{:.2}", self.initial_value))?;
        row(f, "Mean final value", format!("{:.2}", self.mean))?;
        row(f, "Median final value", format!("{:.2}", self.median))?;
        row(f, "Std of final values", format!("{:.2}", self.std_dev))?;
        row(f, "1st percentile (P1)", format!("{:.2}", self.p1))?;
        row(f, "5th percentile (P5)", format!("{:.2}", self.p5))?;
        row(f, "95th percentile (P95)", format!("{:.2}", self.p95))?;
        row(
            f,
            &format!("VaR 95% ({})", self.var_convention.name()),
            format!("{:.2}", self.var_95),
        )?;
        row(f, "CVaR 95%", format!("{:.2}", self.cvar_95))?;
        row(f, "Probability of loss", format!("{:.2}%", self.probability_of_loss * 100.0))?;
        match self.sharpe_ratio {
            Some(s) => row(f, "Sharpe ratio", format!("{:.2}", s))?,
            None => row(f, "Sharpe ratio", "n/a")?,
        }
        match (self.max_drawdown, self.mean_max_drawdown) {
            (Some(worst), Some(avg)) => {
                row(f, "Max drawdown (worst)", format!("{:.2}%", worst * 100.0))?;
                row(f, "Max drawdown (mean)", format!("{:.2}%", avg * 100.0))?;
            }
            _ => row(f, "Max drawdown", "n/a")?,
        }
        if let Some(ruin) = &self.ruin {
            row(f, "Success rate", format!("{:.2}%", ruin.success_rate * 100.0))?;
            row(f, "Ruined simulations", ruin.ruined)?;
            row(f, "Ruin timing", ruin.timing)?;
        }
        Ok(())
    }
}

/// Reduces an [`OutcomePopulation`] to a [`RiskReport`].
#[derive(Debug, Clone)]
pub struct RiskMetricsCalculator {
    pub initial_value: f64,
    pub horizon_years: f64,
    pub risk_free_rate: f64,
    pub var_convention: VarConvention,
}

impl RiskMetricsCalculator {
    pub fn new(initial_value: f64, horizon_years: f64, risk_free_rate: f64) -> Self {
        Self {
            initial_value,
            horizon_years,
            risk_free_rate,
            var_convention: DEFAULT_VAR_CONVENTION,
        }
    }

    pub fn with_var_convention(mut self, convention: VarConvention) -> Self {
        self.var_convention = convention;
        self
    }

    pub fn compute(&self, population: &OutcomePopulation<'_>) -> Result<RiskReport> {
        let outcomes = population.outcomes();
        if outcomes.is_empty() {
            return Err(ConfigError::empty("risk metrics need at least one outcome").into());
        }
        if let Some((index, &value)) = outcomes.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(NumericalError::NonFiniteOutcome { index, value }.into());
        }

        let n = outcomes.len();
        let mut sorted = outcomes.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = mean(&sorted).unwrap_or_default();
        let std_dev = population_std(&sorted).unwrap_or_default();
        let median = percentile(&sorted, 50.0).unwrap_or_default();
        let p1 = percentile(&sorted, 1.0).unwrap_or_default();
        let p5 = percentile(&sorted, 5.0).unwrap_or_default();
        let p95 = percentile(&sorted, 95.0).unwrap_or_default();

        let var_95 = self.var_convention.value_at_risk(mean, self.initial_value, p5);
        let tail: Vec<f64> = sorted.iter().copied().take_while(|&v| v <= p5).collect();
        let cvar_95 = mean - self::mean(&tail).unwrap_or(p5);

        let losses = sorted.iter().filter(|&&v| v < self.initial_value).count();
        let probability_of_loss = losses as f64 / n as f64;

        let sharpe_ratio = self.sharpe(mean, std_dev);

        let drawdowns: Vec<f64> = population.paths.iter().filter_map(|p| max_drawdown(p)).collect();
        let max_drawdown = drawdowns.iter().copied().reduce(f64::max);
        let mean_max_drawdown = self::mean(&drawdowns);

        let ruin = population.ruin.as_ref().map(|r| ruin_statistics(r, n));

        Ok(RiskReport {
            runs: n,
            initial_value: self.initial_value,
            mean,
            median,
            std_dev,
            p1,
            p5,
            p95,
            var_convention: self.var_convention,
            var_95,
            cvar_95,
            probability_of_loss,
            sharpe_ratio,
            max_drawdown,
            mean_max_drawdown,
            ruin,
        })
    }

    /// Horizon return and volatility relative to the initial value,
    /// annualized by `T` and `sqrt(T)`.
    fn sharpe(&self, mean: f64, std_dev: f64) -> Option<f64> {
        if self.initial_value <= 0.0 || std_dev <= 0.0 || self.horizon_years <= 0.0 {
            return None;
        }
        let annual_return = (mean / self.initial_value - 1.0) / self.horizon_years;
        let annual_vol = (std_dev / self.initial_value) / self.horizon_years.sqrt();
        Some((annual_return - self.risk_free_rate) / annual_vol)
    }
}

fn ruin_statistics(record: &RuinRecord, n: usize) -> RuinStatistics {
    let mut periods: Vec<usize> = record.periods.iter().flatten().copied().collect();
    periods.sort_unstable();

    let withdrawal_periods = record.total_periods.saturating_sub(record.withdrawal_start);
    let mut by_withdrawal_period = vec![0; withdrawal_periods];
    for &p in &periods {
        let k = p.saturating_sub(record.withdrawal_start + 1);
        if let Some(slot) = by_withdrawal_period.get_mut(k) {
            *slot += 1;
        }
    }

    let timing = match periods.first() {
        None => RuinTiming::NotApplicable,
        Some(&earliest) => {
            let as_f64: Vec<f64> = periods.iter().map(|&p| p as f64).collect();
            RuinTiming::Observed {
                earliest,
                median: percentile(&as_f64, 50.0).unwrap_or(earliest as f64),
            }
        }
    };

    RuinStatistics {
        ruined: periods.len(),
        success_rate: 1.0 - periods.len() as f64 / n as f64,
        timing,
        by_withdrawal_period,
    }
}
