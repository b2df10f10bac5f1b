//! Command-line plumbing shared by the driver binaries.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::error::SettingsError;
use crate::params::SimulationConfig;
use crate::settings::{load_settings, Settings};

#[derive(Parser, Debug, Clone, Default)]
#[command(version)]
pub struct DriverArgs {
    /// TOML settings file; built-in defaults are used when omitted
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Override the base seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of simulations
    #[arg(long)]
    pub simulations: Option<usize>,
}

impl DriverArgs {
    pub fn load_settings(&self) -> Result<Settings, SettingsError> {
        load_settings(self.config.as_deref())
    }

    /// Applies `--seed` and `--simulations` on top of a loaded config.
    pub fn apply(&self, config: &mut SimulationConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.simulations {
            config.num_simulations = n;
        }
    }
}

/// Installs the fmt subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("montecarlo_risk=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
