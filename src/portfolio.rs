//! Projection of multi-asset price paths onto portfolio value series.

use crate::error::{ConfigError, Result};
use crate::gbm::PricePath;

/// Portfolio value at every step of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPath {
    values: Vec<f64>,
}

impl PortfolioPath {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn initial(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn terminal(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Per-step dot product `w · S(t)`.
pub fn aggregate(path: &PricePath, weights: &[f64]) -> Result<PortfolioPath> {
    if path.num_assets() != weights.len() {
        return Err(ConfigError::dimension_mismatch("weights", path.num_assets(), weights.len()).into());
    }

    let values = path
        .steps()
        .iter()
        .map(|prices| prices.iter().zip(weights).map(|(s, w)| s * w).sum())
        .collect();

    Ok(PortfolioPath { values })
}

/// Cross-sectional mean value at each step of a population of paths.
pub fn mean_path(paths: &[PortfolioPath]) -> Result<Vec<f64>> {
    let first = paths.first().ok_or(ConfigError::empty("mean path"))?;
    let len = first.len();

    let mut sums = vec![0.0; len];
    for path in paths {
        if path.len() != len {
            return Err(ConfigError::dimension_mismatch("path length", len, path.len()).into());
        }
        for (acc, v) in sums.iter_mut().zip(path.values()) {
            *acc += v;
        }
    }

    let n = paths.len() as f64;
    Ok(sums.into_iter().map(|s| s / n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbm::GbmPathSimulator;
    use crate::params::{MarketParameters, SimulationConfig};
    use crate::random::RandomPathGenerator;

    fn sample_path() -> PricePath {
        let market = MarketParameters::new(
            vec![100.0, 50.0, 20.0],
            vec![0.08, 0.06, 0.12],
            vec![
                vec![0.04, 0.006, 0.01],
                vec![0.006, 0.0225, 0.008],
                vec![0.01, 0.008, 0.09],
            ],
            vec![0.5, 0.3, 0.2],
        )
        .unwrap();
        let config = SimulationConfig::new(1.0, 12, 1, 42);
        let mut rng = RandomPathGenerator::new(market.cholesky(), 42);
        GbmPathSimulator::new(&market, &config).simulate(&mut rng, 0, 42).unwrap()
    }

    #[test]
    fn test_aggregate_dot_product() {
        let path = sample_path();
        let weights = [0.5, 0.3, 0.2];
        let portfolio = aggregate(&path, &weights).unwrap();

        assert_eq!(portfolio.len(), path.len());
        assert!((portfolio.initial().unwrap() - 69.0).abs() < 1e-12);
        for (value, prices) in portfolio.values().iter().zip(path.steps()) {
            let expected = 0.5 * prices[0] + 0.3 * prices[1] + 0.2 * prices[2];
            assert!((value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_aggregate_dimension_mismatch() {
        let path = sample_path();
        let err = aggregate(&path, &[0.5, 0.5]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_mean_path() {
        let paths = vec![
            PortfolioPath::new(vec![1.0, 2.0, 3.0]),
            PortfolioPath::new(vec![3.0, 4.0, 7.0]),
        ];
        assert_eq!(mean_path(&paths).unwrap(), vec![2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_mean_path_rejects_empty_and_ragged() {
        assert!(mean_path(&[]).unwrap_err().is_config());

        let ragged = vec![PortfolioPath::new(vec![1.0, 2.0]), PortfolioPath::new(vec![1.0])];
        assert!(mean_path(&ragged).unwrap_err().is_config());
    }
}
