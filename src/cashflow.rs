//! Accumulation / decumulation simulation with ruin detection.
//!
//! ## Phases
//! 1. `Accumulating`: market return on the balance, then the contribution
//! 2. `Withdrawing`: inflation-adjusted withdrawal first, then the market
//!    return on what is left
//! 3. `Ruined`: entered when a withdrawal leaves the balance at or below
//!    zero; the balance is frozen and no more returns are drawn
//!
//! Withdrawing before growing is the conservative ordering; swapping the two
//! changes ruin probabilities materially.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NumericalError, Result};
use crate::params::{MarketParameters, SimulationConfig};
use crate::random::RandomPathGenerator;

/// Fixed nominal contribution paid at the end of each accumulation period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSchedule {
    pub amount: f64,
    /// Periods before withdrawals start.
    pub periods: usize,
}

/// Withdrawal expressed in today's money, inflated every period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalSchedule {
    pub real_amount: f64,
    /// Inflation rate per period.
    pub inflation: f64,
}

impl WithdrawalSchedule {
    /// Nominal withdrawal `k` periods after withdrawals began.
    pub fn nominal_amount(&self, k: usize) -> f64 {
        self.real_amount * (1.0 + self.inflation).powi(k as i32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Withdrawing,
    Ruined,
}

/// Mutable state of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct CashFlowState {
    pub balance: f64,
    /// Number of periods already simulated.
    pub period: usize,
    pub phase: Phase,
    pub ruin_period: Option<usize>,
}

/// Result of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct CashFlowOutcome {
    pub final_balance: f64,
    pub ruined: bool,
    /// 1-based period in which the balance first fell to or below zero.
    pub ruin_period: Option<usize>,
    /// Balance at the start and after every period.
    pub balances: Vec<f64>,
}

#[derive(Debug)]
pub struct CashFlowSimulator<'a> {
    initial_balance: f64,
    contribution: &'a ContributionSchedule,
    withdrawal: &'a WithdrawalSchedule,
    num_periods: usize,
    period_drift: f64,
    sqrt_dt: f64,
}

impl<'a> CashFlowSimulator<'a> {
    /// Validates the schedules against a single-asset market and the time
    /// grid of `config` (which must already be valid).
    pub fn new(
        initial_balance: f64,
        contribution: &'a ContributionSchedule,
        withdrawal: &'a WithdrawalSchedule,
        market: &MarketParameters,
        config: &SimulationConfig,
    ) -> Result<Self> {
        if market.num_assets() != 1 {
            return Err(ConfigError::dimension_mismatch("cash-flow market assets", 1, market.num_assets()).into());
        }
        if !initial_balance.is_finite() {
            return Err(ConfigError::invalid("initial_balance", format!("must be finite, got {initial_balance}")).into());
        }
        if !contribution.amount.is_finite() {
            return Err(ConfigError::invalid("contribution.amount", "must be finite").into());
        }
        if !withdrawal.real_amount.is_finite() || withdrawal.real_amount < 0.0 {
            return Err(ConfigError::invalid(
                "withdrawal.real_amount",
                format!("must be non-negative and finite, got {}", withdrawal.real_amount),
            )
            .into());
        }
        if !withdrawal.inflation.is_finite() || withdrawal.inflation <= -1.0 {
            return Err(ConfigError::invalid(
                "withdrawal.inflation",
                format!("must be finite and above -1, got {}", withdrawal.inflation),
            )
            .into());
        }

        let num_periods = config.num_steps();
        if contribution.periods > num_periods {
            return Err(ConfigError::invalid(
                "contribution.periods",
                format!("{} exceeds the {} simulated periods", contribution.periods, num_periods),
            )
            .into());
        }

        let dt = config.dt();
        Ok(Self {
            initial_balance,
            contribution,
            withdrawal,
            num_periods,
            period_drift: market.drifts()[0] * dt,
            sqrt_dt: dt.sqrt(),
        })
    }

    pub fn num_periods(&self) -> usize {
        self.num_periods
    }

    pub fn initial_state(&self) -> CashFlowState {
        CashFlowState {
            balance: self.initial_balance,
            period: 0,
            phase: self.phase_for(1),
            ruin_period: None,
        }
    }

    fn phase_for(&self, period: usize) -> Phase {
        if period <= self.contribution.periods {
            Phase::Accumulating
        } else {
            Phase::Withdrawing
        }
    }

    /// One period return `r = mu·dt + sigma·sqrt(dt)·z`.
    fn draw_return(&self, rng: &mut RandomPathGenerator<'_>) -> f64 {
        let mut shock = [0.0];
        rng.correlated_draw(&mut shock);
        self.period_drift + shock[0] * self.sqrt_dt
    }

    /// Withdrawal half of a decumulation period. Returns `false` and moves
    /// the state to `Ruined` if the balance is exhausted.
    pub fn withdraw(&self, state: &mut CashFlowState, period: usize) -> bool {
        let k = period.saturating_sub(self.contribution.periods + 1);
        state.balance -= self.withdrawal.nominal_amount(k);
        if state.balance <= 0.0 {
            state.phase = Phase::Ruined;
            state.ruin_period = Some(period);
            return false;
        }
        true
    }

    /// Growth half of a period: applies one market return to the balance.
    pub fn grow(&self, state: &mut CashFlowState, rng: &mut RandomPathGenerator<'_>) {
        let r = self.draw_return(rng);
        state.balance *= 1.0 + r;
    }

    /// Advances `state` by one period.
    pub fn step(&self, state: &mut CashFlowState, rng: &mut RandomPathGenerator<'_>) {
        let period = state.period + 1;
        match state.phase {
            Phase::Ruined => {}
            Phase::Accumulating => {
                self.grow(state, rng);
                state.balance += self.contribution.amount;
            }
            Phase::Withdrawing => {
                if self.withdraw(state, period) {
                    self.grow(state, rng);
                }
            }
        }
        state.period = period;
        if state.phase != Phase::Ruined {
            state.phase = self.phase_for(period + 1);
        }
    }

    /// Runs one full trial. `trial` and `seed` only label a failure.
    pub fn simulate(
        &self,
        rng: &mut RandomPathGenerator<'_>,
        trial: usize,
        seed: u64,
    ) -> Result<CashFlowOutcome> {
        let mut state = self.initial_state();
        let mut balances = Vec::with_capacity(self.num_periods + 1);
        balances.push(state.balance);

        while state.period < self.num_periods {
            self.step(&mut state, rng);
            if !state.balance.is_finite() {
                return Err(NumericalError::NonFinite {
                    trial,
                    step: state.period,
                    seed,
                    value: state.balance,
                }
                .into());
            }
            balances.push(state.balance);
        }

        Ok(CashFlowOutcome {
            final_balance: state.balance,
            ruined: state.phase == Phase::Ruined,
            ruin_period: state.ruin_period,
            balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::trial_seed;

    fn market(mu: f64, sigma: f64) -> MarketParameters {
        MarketParameters::single_asset(1.0, mu, sigma).unwrap()
    }

    fn yearly(years: usize) -> SimulationConfig {
        SimulationConfig::new(years as f64, 1, 1, 42)
    }

    #[test]
    fn test_nominal_withdrawal_inflates() {
        let w = WithdrawalSchedule { real_amount: 40_000.0, inflation: 0.02 };
        assert_eq!(w.nominal_amount(0), 40_000.0);
        assert!((w.nominal_amount(2) - 40_000.0 * 1.0404).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_accumulation_then_withdrawal() {
        let m = market(0.10, 0.0);
        let contribution = ContributionSchedule { amount: 100.0, periods: 2 };
        let withdrawal = WithdrawalSchedule { real_amount: 50.0, inflation: 0.0 };
        let config = yearly(3);
        let sim = CashFlowSimulator::new(1000.0, &contribution, &withdrawal, &m, &config).unwrap();
        let mut rng = RandomPathGenerator::new(m.cholesky(), 1);

        let outcome = sim.simulate(&mut rng, 0, 1).unwrap();

        // 1000 * 1.1 + 100 = 1200; 1200 * 1.1 + 100 = 1420; (1420 - 50) * 1.1 = 1507
        let expected = [1000.0, 1200.0, 1420.0, 1507.0];
        for (got, want) in outcome.balances.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        assert!(!outcome.ruined);
        assert_eq!(outcome.ruin_period, None);
    }

    #[test]
    fn test_withdraw_happens_before_growth() {
        let m = market(1.0, 0.0);
        let contribution = ContributionSchedule { amount: 0.0, periods: 0 };
        let withdrawal = WithdrawalSchedule { real_amount: 100.0, inflation: 0.0 };
        let config = yearly(1);
        let sim = CashFlowSimulator::new(300.0, &contribution, &withdrawal, &m, &config).unwrap();
        let mut rng = RandomPathGenerator::new(m.cholesky(), 1);

        let outcome = sim.simulate(&mut rng, 0, 1).unwrap();

        // (300 - 100) * 2, not 300 * 2 - 100
        assert!((outcome.final_balance - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_ruin_freezes_balance() {
        let m = market(0.0, 0.0);
        let contribution = ContributionSchedule { amount: 0.0, periods: 1 };
        let withdrawal = WithdrawalSchedule { real_amount: 60.0, inflation: 0.0 };
        let config = yearly(5);
        let sim = CashFlowSimulator::new(100.0, &contribution, &withdrawal, &m, &config).unwrap();
        let mut rng = RandomPathGenerator::new(m.cholesky(), 1);

        let outcome = sim.simulate(&mut rng, 0, 1).unwrap();

        assert!(outcome.ruined);
        assert_eq!(outcome.ruin_period, Some(3));
        assert_eq!(outcome.balances, vec![100.0, 100.0, 40.0, -20.0, -20.0, -20.0]);
        assert_eq!(outcome.final_balance, -20.0);
    }

    #[test]
    fn test_ruined_trial_stops_drawing_returns() {
        let m = market(0.05, 0.2);
        let contribution = ContributionSchedule { amount: 0.0, periods: 0 };
        let withdrawal = WithdrawalSchedule { real_amount: 10.0, inflation: 0.0 };
        let config = yearly(4);
        let sim = CashFlowSimulator::new(5.0, &contribution, &withdrawal, &m, &config).unwrap();
        let mut rng = RandomPathGenerator::new(m.cholesky(), 3);
        let mut state = sim.initial_state();

        sim.step(&mut state, &mut rng);
        assert_eq!(state.phase, Phase::Ruined);

        let frozen = state.clone();
        sim.step(&mut state, &mut rng);
        assert_eq!(state.balance, frozen.balance);
        assert_eq!(state.ruin_period, Some(1));
        assert_eq!(state.period, 2);

        // The stream is untouched: a fresh generator yields the same next draw.
        let mut fresh = RandomPathGenerator::new(m.cholesky(), 3);
        let (mut a, mut b) = ([0.0], [0.0]);
        rng.correlated_draw(&mut a);
        fresh.correlated_draw(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_balance_ruins_in_first_period() {
        let m = market(0.06, 0.12);
        let contribution = ContributionSchedule { amount: 10_000.0, periods: 0 };
        let withdrawal = WithdrawalSchedule { real_amount: 1.0, inflation: 0.02 };
        let config = yearly(30);
        let sim = CashFlowSimulator::new(0.0, &contribution, &withdrawal, &m, &config).unwrap();

        for trial in 0..200 {
            let seed = trial_seed(7, trial);
            let mut rng = RandomPathGenerator::new(m.cholesky(), seed);
            let outcome = sim.simulate(&mut rng, trial, seed).unwrap();
            assert!(outcome.ruined);
            assert_eq!(outcome.ruin_period, Some(1));
        }
    }

    #[test]
    fn test_larger_withdrawal_never_ruins_later() {
        let m = market(0.06, 0.12);
        let contribution = ContributionSchedule { amount: 10_000.0, periods: 20 };
        let config = yearly(50);

        for trial in 0..300 {
            let seed = trial_seed(42, trial);
            let mut previous: Option<usize> = None;
            for real_amount in [20_000.0, 30_000.0, 40_000.0, 50_000.0, 60_000.0] {
                let withdrawal = WithdrawalSchedule { real_amount, inflation: 0.02 };
                let sim = CashFlowSimulator::new(200_000.0, &contribution, &withdrawal, &m, &config).unwrap();
                let mut rng = RandomPathGenerator::new(m.cholesky(), seed);
                let outcome = sim.simulate(&mut rng, trial, seed).unwrap();

                let ruin = outcome.ruin_period.unwrap_or(usize::MAX);
                if let Some(prev) = previous {
                    assert!(ruin <= prev, "trial {trial}: ruin moved from {prev} to {ruin}");
                }
                previous = Some(ruin);
            }
        }
    }

    #[test]
    fn test_rejects_schedule_longer_than_horizon() {
        let m = market(0.06, 0.12);
        let contribution = ContributionSchedule { amount: 1.0, periods: 11 };
        let withdrawal = WithdrawalSchedule { real_amount: 1.0, inflation: 0.0 };
        let config = yearly(10);
        let err = CashFlowSimulator::new(0.0, &contribution, &withdrawal, &m, &config)
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_rejects_multi_asset_market() {
        let m = MarketParameters::new(
            vec![1.0, 1.0],
            vec![0.0, 0.0],
            vec![vec![0.01, 0.0], vec![0.0, 0.01]],
            vec![0.5, 0.5],
        )
        .unwrap();
        let contribution = ContributionSchedule { amount: 1.0, periods: 1 };
        let withdrawal = WithdrawalSchedule { real_amount: 1.0, inflation: 0.0 };
        let err = CashFlowSimulator::new(0.0, &contribution, &withdrawal, &m, &yearly(2))
            .err()
            .unwrap();
        assert!(err.is_config());
    }
}
