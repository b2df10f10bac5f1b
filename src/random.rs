//! Correlated standard-normal shocks.
//!
//! A [`CholeskyFactor`] is computed once per market; every trial then owns
//! a [`RandomPathGenerator`] seeded from the run seed and its trial index,
//! so draws never depend on which thread ran the trial.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{NumericalError, Result};

/// Lower-triangular `L` with `L·Lᵗ = cov`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    lower: Vec<Vec<f64>>,
}

impl CholeskyFactor {
    /// Cholesky–Banachiewicz decomposition of a symmetric matrix.
    ///
    /// A negative pivot, or a zero pivot whose column still has non-zero
    /// entries below it, is reported as `NotPositiveDefinite`. A zero
    /// pivot with an all-zero remaining column is a zero-volatility asset
    /// and yields a zero column in `L`.
    pub fn decompose(matrix: &[Vec<f64>]) -> Result<Self> {
        let n = matrix.len();
        let mut l = vec![vec![0.0; n]; n];

        for j in 0..n {
            let sum: f64 = (0..j).map(|k| l[j][k] * l[j][k]).sum();
            let pivot = matrix[j][j] - sum;

            if pivot > 0.0 {
                let d = pivot.sqrt();
                l[j][j] = d;
                for i in (j + 1)..n {
                    let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
                    l[i][j] = (matrix[i][j] - s) / d;
                }
            } else if pivot == 0.0 {
                for i in (j + 1)..n {
                    let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
                    if matrix[i][j] - s != 0.0 {
                        return Err(NumericalError::NotPositiveDefinite { row: j, pivot }.into());
                    }
                }
            } else {
                return Err(NumericalError::NotPositiveDefinite { row: j, pivot }.into());
            }
        }

        Ok(Self { lower: l })
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[Vec<f64>] {
        &self.lower
    }

    /// `out = L · z`, using only the lower triangle.
    pub fn apply(&self, z: &[f64], out: &mut [f64]) {
        for (i, row) in self.lower.iter().enumerate() {
            out[i] = row[..=i].iter().zip(&z[..=i]).map(|(a, b)| a * b).sum();
        }
    }

    /// `L · Lᵗ`, for checking the factorization.
    pub fn reconstruct(&self) -> Vec<Vec<f64>> {
        let n = self.dim();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let k_max = i.min(j);
                        (0..=k_max).map(|k| self.lower[i][k] * self.lower[j][k]).sum()
                    })
                    .collect()
            })
            .collect()
    }
}

/// SplitMix64 finalizer.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Seed for trial `index` of a run seeded with `base_seed`.
pub fn trial_seed(base_seed: u64, index: usize) -> u64 {
    splitmix64(base_seed ^ splitmix64(index as u64))
}

/// Per-trial stream of correlated standard-normal shock vectors.
pub struct RandomPathGenerator<'a> {
    factor: &'a CholeskyFactor,
    rng: StdRng,
    z: Vec<f64>,
}

impl<'a> RandomPathGenerator<'a> {
    pub fn new(factor: &'a CholeskyFactor, seed: u64) -> Self {
        Self {
            factor,
            rng: StdRng::seed_from_u64(seed),
            z: vec![0.0; factor.dim()],
        }
    }

    /// Generator for trial `index` of a run seeded with `base_seed`.
    pub fn for_trial(factor: &'a CholeskyFactor, base_seed: u64, index: usize) -> Self {
        Self::new(factor, trial_seed(base_seed, index))
    }

    pub fn dim(&self) -> usize {
        self.factor.dim()
    }

    /// Draws `n` independent standard normals and writes `L·z` to `out`.
    pub fn correlated_draw(&mut self, out: &mut [f64]) {
        for z in self.z.iter_mut() {
            *z = self.rng.sample(StandardNormal);
        }
        self.factor.apply(&self.z, out);
    }
}
