//! Retirement Savings Simulation Binary
//!
//! Accumulates yearly contributions until retirement, then withdraws an
//! inflation-adjusted amount every year and reports the chance of running
//! out of money.
//!
//! ## Usage
//! ```bash
//! cargo run --bin retirement --release -- --simulations 10000
//! ```

use std::process::ExitCode;

use clap::Parser;
use montecarlo_risk::cli::{init_tracing, DriverArgs};
use montecarlo_risk::engine::run_cashflow_simulation;
use tracing::error;

fn main() -> ExitCode {
    init_tracing();
    let args = DriverArgs::parse();

    let settings = match args.load_settings() {
        Ok(s) => s.retirement,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut config = settings.simulation();
    args.apply(&mut config);

    println!("=======================================================");
    println!("  Monte Carlo Retirement Simulation");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Simulations:             {}", config.num_simulations);
    println!("  Initial portfolio:       {:.2}", settings.initial_portfolio);
    println!("  Annual contribution:     {:.2}", settings.annual_contribution);
    println!("  Real withdrawal:         {:.2} per year", settings.withdrawal_real);
    println!(
        "  Years to retirement:     {}, retirement years: {}",
        settings.years_to_retirement, settings.retirement_years
    );
    println!(
        "  mu = {:.2}%, sigma = {:.2}%, inflation = {:.2}%",
        settings.mu * 100.0,
        settings.sigma * 100.0,
        settings.inflation * 100.0
    );
    println!();

    let result = settings.market().and_then(|market| {
        run_cashflow_simulation(
            settings.initial_portfolio,
            &settings.contribution(),
            &settings.withdrawal(),
            &market,
            &config,
        )
    });
    let (_, report) = match result {
        Ok(r) => r,
        Err(e) => {
            error!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Final balance after {} years",
        settings.years_to_retirement + settings.retirement_years
    );
    println!("{}", "-".repeat(50));
    report.print();
    println!();

    let ruin_by_year = report.ruin_by_withdrawal_year();
    if !ruin_by_year.is_empty() {
        println!("Ruin by retirement year (1 = first year of withdrawals):");
        println!("| Year | Ruined |");
        println!("|------|--------|");
        for (year, count) in ruin_by_year {
            println!("| {:4} | {:6} |", year, count);
        }
    }

    ExitCode::SUCCESS
}
