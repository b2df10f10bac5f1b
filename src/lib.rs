//! Monte Carlo Portfolio Risk Library
//!
//! This library simulates correlated asset prices and savings plans under
//! geometric Brownian motion and reduces the simulated outcomes to risk
//! metrics (percentiles, VaR, CVaR, Sharpe, drawdown, ruin probability).
//!
//! ## Modules
//!
//! - `params`: market parameters and the simulation time grid
//! - `random`: Cholesky factorization and per-trial correlated normal draws
//! - `gbm`: multi-asset GBM price paths
//! - `portfolio`: weighted portfolio value paths
//! - `cashflow`: contribution / withdrawal / ruin state machine
//! - `metrics`: outcome distribution statistics
//! - `engine`: parallel orchestration of trials
//! - `settings`: TOML + environment driver settings
//!
//! ## Usage
//!
//! ```bash
//! # Correlated three-asset portfolio
//! cargo run --bin portfolio --release
//!
//! # Retirement savings with contributions and withdrawals
//! cargo run --bin retirement --release -- --simulations 10000
//!
//! # Portfolio from volatilities + correlations, with Sharpe and drawdown
//! cargo run --bin risk_analysis --release -- --config simulation.toml
//! ```

pub mod cashflow;
pub mod cli;
pub mod engine;
pub mod error;
pub mod gbm;
pub mod metrics;
pub mod params;
pub mod portfolio;
pub mod random;
pub mod settings;

pub use engine::{run_cashflow_simulation, run_portfolio_simulation, simulate_price_paths};
pub use error::{ConfigError, NumericalError, Result, SettingsError, SimError};
pub use metrics::{RiskReport, VarConvention};
pub use params::{MarketParameters, SimulationConfig};
