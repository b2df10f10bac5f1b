//! Portfolio Risk Analysis Binary
//!
//! Builds the covariance from volatilities and correlations, simulates one
//! year of daily prices and reports VaR, CVaR, Sharpe ratio and drawdown.
//!
//! ## Usage
//! ```bash
//! cargo run --bin risk_analysis --release -- --config simulation.toml
//! ```

use std::process::ExitCode;

use clap::Parser;
use montecarlo_risk::cli::{init_tracing, DriverArgs};
use montecarlo_risk::engine::run_portfolio_simulation;
use tracing::error;

fn main() -> ExitCode {
    init_tracing();
    let args = DriverArgs::parse();

    let settings = match args.load_settings() {
        Ok(s) => s.risk_analysis,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut config = settings.simulation.clone();
    args.apply(&mut config);

    println!("=======================================================");
    println!("  Portfolio Risk Analysis");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Initial value:           {:.2}", settings.initial_value);
    println!("  Weights:                 {:?}", settings.weights);
    println!("  Volatilities:            {:?}", settings.volatilities);
    println!("  Risk-free rate:          {:.2}%", config.risk_free_rate * 100.0);
    println!("  Simulations:             {}, seed {}", config.num_simulations, config.seed);
    println!();

    let result = settings
        .market()
        .and_then(|market| run_portfolio_simulation(&market, &config));
    let report = match result {
        Ok((_, report)) => report,
        Err(e) => {
            error!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Risk metrics");
    println!("{}", "-".repeat(50));
    report.print();

    ExitCode::SUCCESS
}
