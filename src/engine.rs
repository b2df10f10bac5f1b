//! Run orchestration: validation, parallel trials, reduction.
//!
//! Trials are fanned out over the rayon pool. Each one owns a generator
//! seeded from `(config.seed, trial index)`, so the population does not
//! depend on the number of worker threads. Results are collected in trial
//! order, and the first failing trial (by index) fails the whole run.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cashflow::{CashFlowOutcome, CashFlowSimulator, ContributionSchedule, WithdrawalSchedule};
use crate::error::Result;
use crate::gbm::{GbmPathSimulator, PricePath};
use crate::metrics::{OutcomePopulation, RiskMetricsCalculator, RiskReport, RuinRecord};
use crate::params::{MarketParameters, SimulationConfig};
use crate::portfolio::{self, PortfolioPath};
use crate::random::{trial_seed, RandomPathGenerator};

fn prepare(config: &SimulationConfig) -> Result<()> {
    config.validate()?;

    let exact_steps = config.steps_per_year as f64 * config.horizon_years;
    if (exact_steps - config.num_steps() as f64).abs() > 1e-9 {
        warn!(
            "{} years at {} steps per year is not a whole number of steps; using {} steps of {:.6} years",
            config.horizon_years,
            config.steps_per_year,
            config.num_steps(),
            config.dt()
        );
    }
    debug!("time grid: {} steps, dt = {:.6}", config.num_steps(), config.dt());
    Ok(())
}

/// Runs `num_simulations` independent trials in parallel and returns their
/// results in trial order.
fn run_trials<T, F>(num_simulations: usize, trial: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    let results: Vec<Result<T>> = (0..num_simulations).into_par_iter().map(trial).collect();
    results.into_iter().collect()
}

fn calculator(initial_value: f64, config: &SimulationConfig) -> RiskMetricsCalculator {
    RiskMetricsCalculator::new(initial_value, config.horizon_years, config.risk_free_rate)
        .with_var_convention(config.var_convention)
}

/// Simulates one multi-asset GBM price path per trial.
pub fn simulate_price_paths(market: &MarketParameters, config: &SimulationConfig) -> Result<Vec<PricePath>> {
    prepare(config)?;
    let simulator = GbmPathSimulator::new(market, config);

    run_trials(config.num_simulations, |trial| {
        let seed = trial_seed(config.seed, trial);
        let mut rng = RandomPathGenerator::new(market.cholesky(), seed);
        simulator.simulate(&mut rng, trial, seed)
    })
}

/// Simulates the weighted portfolio and reduces the terminal values to a
/// [`RiskReport`]. Drawdown is measured over the full portfolio paths.
pub fn run_portfolio_simulation(
    market: &MarketParameters,
    config: &SimulationConfig,
) -> Result<(Vec<PortfolioPath>, RiskReport)> {
    prepare(config)?;
    info!(
        "Portfolio simulation: {} assets, {} trials, {} steps, seed {}",
        market.num_assets(),
        config.num_simulations,
        config.num_steps(),
        config.seed
    );

    let simulator = GbmPathSimulator::new(market, config);
    let paths = run_trials(config.num_simulations, |trial| {
        let seed = trial_seed(config.seed, trial);
        let mut rng = RandomPathGenerator::new(market.cholesky(), seed);
        let prices = simulator.simulate(&mut rng, trial, seed)?;
        portfolio::aggregate(&prices, market.weights())
    })?;

    let terminal: Vec<f64> = paths.iter().filter_map(PortfolioPath::terminal).collect();
    let population = OutcomePopulation::new(terminal).with_paths(paths.iter().map(PortfolioPath::values).collect());
    let report = calculator(market.initial_portfolio_value(), config).compute(&population)?;

    info!(
        "Portfolio simulation done: mean {:.2}, P5 {:.2}, VaR95 {:.2}",
        report.mean, report.p5, report.var_95
    );
    Ok((paths, report))
}

/// Simulates contributions, withdrawals and ruin on a single-asset market.
pub fn run_cashflow_simulation(
    initial_balance: f64,
    contribution: &ContributionSchedule,
    withdrawal: &WithdrawalSchedule,
    market: &MarketParameters,
    config: &SimulationConfig,
) -> Result<(Vec<CashFlowOutcome>, RiskReport)> {
    prepare(config)?;
    let simulator = CashFlowSimulator::new(initial_balance, contribution, withdrawal, market, config)?;
    info!(
        "Cash-flow simulation: {} trials, {} periods ({} accumulating), seed {}",
        config.num_simulations,
        simulator.num_periods(),
        contribution.periods,
        config.seed
    );

    let outcomes = run_trials(config.num_simulations, |trial| {
        let seed = trial_seed(config.seed, trial);
        let mut rng = RandomPathGenerator::new(market.cholesky(), seed);
        simulator.simulate(&mut rng, trial, seed)
    })?;

    let ruin = RuinRecord {
        periods: outcomes.iter().map(|o| o.ruin_period).collect(),
        withdrawal_start: contribution.periods,
        total_periods: simulator.num_periods(),
    };
    let population = OutcomePopulation::new(outcomes.iter().map(|o| o.final_balance).collect())
        .with_paths(outcomes.iter().map(|o| o.balances.as_slice()).collect())
        .with_ruin(ruin);
    let report = calculator(initial_balance, config).compute(&population)?;

    if let Some(ruin) = &report.ruin {
        info!(
            "Cash-flow simulation done: success rate {:.2}%, {} ruined",
            ruin.success_rate * 100.0,
            ruin.ruined
        );
    }
    Ok((outcomes, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NumericalError, SimError};
    use crate::metrics::{RuinTiming, VarConvention};

    fn three_asset_diagonal() -> MarketParameters {
        MarketParameters::new(
            vec![100.0, 50.0, 20.0],
            vec![0.08, 0.06, 0.12],
            vec![
                vec![0.04, 0.0, 0.0],
                vec![0.0, 0.0225, 0.0],
                vec![0.0, 0.0, 0.09],
            ],
            vec![0.5, 0.3, 0.2],
        )
        .unwrap()
    }

    fn three_asset_correlated() -> MarketParameters {
        MarketParameters::new(
            vec![100.0, 50.0, 20.0],
            vec![0.08, 0.06, 0.12],
            vec![
                vec![0.04, 0.006, 0.01],
                vec![0.006, 0.0225, 0.008],
                vec![0.01, 0.008, 0.09],
            ],
            vec![0.5, 0.3, 0.2],
        )
        .unwrap()
    }

    #[test]
    fn test_mean_terminal_value_matches_closed_form() {
        let market = three_asset_diagonal();
        let config = SimulationConfig::new(1.0, 252, 2000, 42);

        let (paths, report) = run_portfolio_simulation(&market, &config).unwrap();

        assert_eq!(paths.len(), 2000);
        assert!(paths.iter().all(|p| p.len() == 253));
        let expected = market.expected_portfolio_value(1.0);
        let rel = (report.mean - expected).abs() / expected;
        assert!(rel < 0.02, "mean {} vs closed form {expected}", report.mean);
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let market = three_asset_correlated();
        let config = SimulationConfig::new(1.0, 52, 300, 123);

        let (a, ra) = run_portfolio_simulation(&market, &config).unwrap();
        let (b, rb) = run_portfolio_simulation(&market, &config).unwrap();

        assert_eq!(a, b);
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_population_independent_of_thread_count() {
        let market = three_asset_correlated();
        let config = SimulationConfig::new(1.0, 52, 200, 7);

        let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let multi = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

        let (a, _) = single.install(|| run_portfolio_simulation(&market, &config)).unwrap();
        let (b, _) = multi.install(|| run_portfolio_simulation(&market, &config)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_differs() {
        let market = three_asset_correlated();
        let (a, _) = run_portfolio_simulation(&market, &SimulationConfig::new(1.0, 12, 50, 1)).unwrap();
        let (b, _) = run_portfolio_simulation(&market, &SimulationConfig::new(1.0, 12, 50, 2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_volatility_paths_stay_at_s0() {
        let market = MarketParameters::new(vec![100.0], vec![0.0], vec![vec![0.0]], vec![1.0]).unwrap();
        let config = SimulationConfig::new(1.0, 252, 20, 42);

        let prices = simulate_price_paths(&market, &config).unwrap();
        assert!(prices
            .iter()
            .all(|p| p.steps().iter().all(|s| s == &[100.0])));

        let (paths, report) = run_portfolio_simulation(&market, &config).unwrap();
        assert!(paths.iter().all(|p| p.values().iter().all(|&v| v == 100.0)));
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.var_95, 0.0);
        assert_eq!(report.sharpe_ratio, None);
        assert_eq!(report.max_drawdown, Some(0.0));
    }

    #[test]
    fn test_report_percentiles_are_ordered() {
        let market = three_asset_correlated();
        let config = SimulationConfig::new(1.0, 52, 500, 99);
        let (_, report) = run_portfolio_simulation(&market, &config).unwrap();

        assert!(report.p1 <= report.p5);
        assert!(report.p5 <= report.median);
        assert!(report.median <= report.p95);
        assert!(report.cvar_95 >= report.var_95);
        assert!(report.max_drawdown.unwrap() > 0.0);
    }

    #[test]
    fn test_var_convention_follows_config() {
        let market = three_asset_correlated();
        let config = SimulationConfig::new(1.0, 52, 500, 99).with_var_convention(VarConvention::InitialRelative);
        let (_, report) = run_portfolio_simulation(&market, &config).unwrap();

        assert_eq!(report.var_convention, VarConvention::InitialRelative);
        let expected = (market.initial_portfolio_value() - report.p5).max(0.0);
        assert_eq!(report.var_95, expected);
    }

    #[test]
    fn test_invalid_config_fails_before_simulating() {
        let market = three_asset_correlated();
        let err = run_portfolio_simulation(&market, &SimulationConfig::new(1.0, 0, 10, 1)).unwrap_err();
        assert!(err.is_config());
        let err = run_portfolio_simulation(&market, &SimulationConfig::new(1.0, 12, 0, 1)).unwrap_err();
        assert!(err.is_config());
        let err = run_portfolio_simulation(&market, &SimulationConfig::new(1e20, 1, 1, 1)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_overflow_fails_whole_run_with_first_trial() {
        let market = MarketParameters::new(vec![1e300], vec![800.0], vec![vec![0.0]], vec![1.0]).unwrap();
        let config = SimulationConfig::new(1.0, 1, 8, 5);

        let err = run_portfolio_simulation(&market, &config).unwrap_err();

        match err {
            SimError::Numerical(NumericalError::NonFinite { trial, step, seed, .. }) => {
                assert_eq!(trial, 0);
                assert_eq!(step, 1);
                assert_eq!(seed, trial_seed(5, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn retirement_run(withdrawal_real: f64, seed: u64) -> (Vec<CashFlowOutcome>, RiskReport) {
        let market = MarketParameters::single_asset(1.0, 0.06, 0.12).unwrap();
        let contribution = ContributionSchedule { amount: 10_000.0, periods: 20 };
        let withdrawal = WithdrawalSchedule { real_amount: withdrawal_real, inflation: 0.02 };
        let config = SimulationConfig::new(50.0, 1, 1000, seed);
        run_cashflow_simulation(200_000.0, &contribution, &withdrawal, &market, &config).unwrap()
    }

    #[test]
    fn test_cashflow_report() {
        let (outcomes, report) = retirement_run(40_000.0, 42);

        assert_eq!(outcomes.len(), 1000);
        assert!(outcomes.iter().all(|o| o.balances.len() == 51));
        let ruin = report.ruin.as_ref().unwrap();
        let ruined = outcomes.iter().filter(|o| o.ruined).count();
        assert_eq!(ruin.ruined, ruined);
        assert!((ruin.success_rate - (1.0 - ruined as f64 / 1000.0)).abs() < 1e-12);
        assert_eq!(ruin.by_withdrawal_period.iter().sum::<usize>(), ruined);
        if ruined > 0 {
            assert!(ruin.timing.earliest().unwrap() > 20);
        } else {
            assert_eq!(ruin.timing, RuinTiming::NotApplicable);
        }
    }

    #[test]
    fn test_ruin_rate_monotone_in_withdrawal() {
        let mut previous = 0;
        for withdrawal in [20_000.0, 30_000.0, 40_000.0, 50_000.0, 70_000.0] {
            let (_, report) = retirement_run(withdrawal, 2024);
            let ruined = report.ruin.unwrap().ruined;
            assert!(ruined >= previous, "withdrawal {withdrawal}: {ruined} < {previous}");
            previous = ruined;
        }
        assert!(previous > 0);
    }

    #[test]
    fn test_empty_balance_ruins_every_trial_at_first_period() {
        let market = MarketParameters::single_asset(1.0, 0.06, 0.12).unwrap();
        let contribution = ContributionSchedule { amount: 10_000.0, periods: 0 };
        let withdrawal = WithdrawalSchedule { real_amount: 40_000.0, inflation: 0.02 };
        let config = SimulationConfig::new(30.0, 1, 500, 42);

        let (outcomes, report) =
            run_cashflow_simulation(0.0, &contribution, &withdrawal, &market, &config).unwrap();

        assert!(outcomes.iter().all(|o| o.ruined && o.ruin_period == Some(1)));
        let ruin = report.ruin.unwrap();
        assert_eq!(ruin.success_rate, 0.0);
        assert_eq!(ruin.timing, RuinTiming::Observed { earliest: 1, median: 1.0 });
        assert_eq!(ruin.by_withdrawal_period[0], 500);
        assert_eq!(report.sharpe_ratio, None);
    }

    #[test]
    fn test_cashflow_rejects_multi_asset_market() {
        let market = three_asset_correlated();
        let contribution = ContributionSchedule { amount: 1.0, periods: 1 };
        let withdrawal = WithdrawalSchedule { real_amount: 1.0, inflation: 0.0 };
        let config = SimulationConfig::new(2.0, 1, 10, 1);
        let err = run_cashflow_simulation(1.0, &contribution, &withdrawal, &market, &config).unwrap_err();
        assert!(err.is_config());
    }
}
