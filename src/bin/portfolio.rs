//! Correlated Portfolio Simulation Binary
//!
//! Simulates correlated GBM prices for a weighted basket and reports the
//! distribution of the terminal portfolio value.
//!
//! ## Usage
//! ```bash
//! cargo run --bin portfolio --release -- --seed 7
//! ```

use std::process::ExitCode;

use clap::Parser;
use montecarlo_risk::cli::{init_tracing, DriverArgs};
use montecarlo_risk::engine::run_portfolio_simulation;
use montecarlo_risk::portfolio::mean_path;
use montecarlo_risk::VarConvention;
use tracing::error;

fn main() -> ExitCode {
    init_tracing();
    let args = DriverArgs::parse();

    let settings = match args.load_settings() {
        Ok(s) => s.portfolio,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut config = settings.simulation.clone();
    args.apply(&mut config);

    println!("=======================================================");
    println!("  Monte Carlo Portfolio Simulation");
    println!("  Correlated GBM, {} assets", settings.initial_prices.len());
    println!("=======================================================");
    println!();
    println!("Parameters:");
    for (i, name) in settings.asset_names.iter().enumerate() {
        let (Some(s0), Some(mu), Some(w)) = (
            settings.initial_prices.get(i),
            settings.drifts.get(i),
            settings.weights.get(i),
        ) else {
            continue;
        };
        println!("  {:10} S0 = {:8.2}  mu = {:5.2}%  weight = {:.2}", name, s0, mu * 100.0, w);
    }
    println!(
        "  Horizon: {} yr, {} steps/yr, {} simulations, seed {}",
        config.horizon_years, config.steps_per_year, config.num_simulations, config.seed
    );
    println!();

    let result = settings
        .market()
        .and_then(|market| run_portfolio_simulation(&market, &config));
    let (paths, report) = match result {
        Ok(r) => r,
        Err(e) => {
            error!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Terminal portfolio value (T = {} yr)", config.horizon_years);
    println!("{}", "-".repeat(50));
    report.print();
    println!();

    println!("VaR 95% by convention:");
    for convention in VarConvention::all() {
        println!(
            "  {:14} {:.2}",
            convention.name(),
            convention.value_at_risk(report.mean, report.initial_value, report.p5)
        );
    }
    println!();

    if let Ok(mean) = mean_path(&paths) {
        if let (Some(first), Some(last)) = (mean.first(), mean.last()) {
            println!("Mean path:");
            println!("  Step 0:                  {:.2}", first);
            println!("  Step {:<5}               {:.2}", mean.len() - 1, last);
        }
    }

    ExitCode::SUCCESS
}
