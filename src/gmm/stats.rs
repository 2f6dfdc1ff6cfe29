//! Sufficient statistics accumulated by the E-step.
//!
//! For responsibilities γᵢₖ the statistics are
//!
//! ```text
//! nₖ     = Σᵢ γᵢₖ
//! Σγxₖ   = Σᵢ γᵢₖ xᵢ
//! Σγx²ₖ  = Σᵢ γᵢₖ xᵢ ⊙ xᵢ
//! ```
//!
//! plus the total data log-likelihood and the sample count. Every quantity is a
//! plain sum, so partial accumulators over disjoint sample ranges merge by
//! addition.

use super::model::GaussianMixtureModel;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// Zeroth, first and second order statistics of a dataset against a mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStatistics {
    /// Responsibility mass per component (K).
    pub n: Array1<f64>,
    /// Responsibility-weighted sample sums (K × D).
    pub sum_px: Array2<f64>,
    /// Responsibility-weighted squared sample sums (K × D).
    pub sum_pxx: Array2<f64>,
    /// Σᵢ ln p(xᵢ).
    pub log_likelihood: f64,
    /// Number of accumulated samples.
    pub t: usize,
}

impl SufficientStatistics {
    /// Zeroed statistics for K components of dimension D.
    pub fn new(n_components: usize, dim: usize) -> Self {
        Self {
            n: Array1::zeros(n_components),
            sum_px: Array2::zeros((n_components, dim)),
            sum_pxx: Array2::zeros((n_components, dim)),
            log_likelihood: 0.0,
            t: 0,
        }
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.n.len()
    }

    /// Feature dimension.
    pub fn dim(&self) -> usize {
        self.sum_px.ncols()
    }

    /// Error unless `model` has the same K and D as these statistics.
    pub(crate) fn check_model(&self, model: &GaussianMixtureModel) -> Result<()> {
        if self.dim() != model.dim() {
            return Err(Error::DimensionMismatch {
                expected: model.dim(),
                found: self.dim(),
            });
        }
        if self.n_components() != model.n_components() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} components", model.n_components()),
                actual: format!("{} components", self.n_components()),
            });
        }
        Ok(())
    }

    /// Zero every accumulator, keeping the shape.
    pub fn reset(&mut self) {
        self.n.fill(0.0);
        self.sum_px.fill(0.0);
        self.sum_pxx.fill(0.0);
        self.log_likelihood = 0.0;
        self.t = 0;
    }

    /// Add one sample with its (already normalised) responsibilities.
    pub(crate) fn accumulate(&mut self, sample: &[f64], responsibilities: &[f64], log_px: f64) {
        for (k, &gamma) in responsibilities.iter().enumerate() {
            self.n[k] += gamma;
            if gamma == 0.0 {
                continue;
            }
            let mut px = self.sum_px.row_mut(k);
            for (acc, &x) in px.iter_mut().zip(sample) {
                *acc += gamma * x;
            }
            let mut pxx = self.sum_pxx.row_mut(k);
            for (acc, &x) in pxx.iter_mut().zip(sample) {
                *acc += gamma * x * x;
            }
        }
        self.log_likelihood += log_px;
        self.t += 1;
    }

    /// Add another accumulator of the same shape into this one.
    pub fn merge(&mut self, other: &SufficientStatistics) -> Result<()> {
        if other.dim() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: other.dim(),
            });
        }
        if other.n_components() != self.n_components() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} components", self.n_components()),
                actual: format!("{} components", other.n_components()),
            });
        }
        self.n += &other.n;
        self.sum_px += &other.sum_px;
        self.sum_pxx += &other.sum_pxx;
        self.log_likelihood += other.log_likelihood;
        self.t += other.t;
        Ok(())
    }

    /// Average log-likelihood per sample.
    pub fn average_log_likelihood(&self) -> Result<f64> {
        if self.t == 0 {
            return Err(Error::NotInitialized);
        }
        Ok(self.log_likelihood / self.t as f64)
    }
}
