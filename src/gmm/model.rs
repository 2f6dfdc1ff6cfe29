//! Diagonal-covariance Gaussian mixture model.
//!
//! ```text
//! p(x) = Σₖ wₖ × N(x | μₖ, diag(σ²ₖ))
//! ```
//!
//! Parameters are stored as one row per component: `weights` has length K,
//! `means` and `variances` are K × D. Every density is evaluated in log space;
//! adapted components far from the data produce densities that underflow
//! `f64` long before their log values become unrepresentable.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Tolerance used when checking that mixture weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Rounding slack for a sum of `k` weights that should equal one.
pub(crate) fn weight_rounding_tolerance(k: usize) -> f64 {
    4.0 * k as f64 * f64::EPSILON
}

/// Gaussian mixture model with diagonal covariances.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianMixtureModel {
    /// Mixture weights (K).
    weights: Array1<f64>,
    /// Component means (K × D).
    means: Array2<f64>,
    /// Diagonal variances (K × D).
    variances: Array2<f64>,
    /// Per-dimension lower bound applied when variances are re-estimated (D).
    variance_floor: Array1<f64>,
}

impl GaussianMixtureModel {
    /// Build a model from validated parameters.
    ///
    /// Weights must be finite, non-negative and sum to one within 1e-6; a sum
    /// that is off by more than rounding is rescaled to one. Variances must be
    /// finite and strictly positive. The variance floor defaults to
    /// `f64::EPSILON` in every dimension.
    pub fn new(
        mut weights: Array1<f64>,
        means: Array2<f64>,
        variances: Array2<f64>,
    ) -> Result<Self> {
        let k = weights.len();
        if k == 0 {
            return Err(Error::InvalidParameter {
                name: "weights",
                message: "need at least one component",
            });
        }
        let d = means.ncols();
        if d == 0 {
            return Err(Error::InvalidParameter {
                name: "means",
                message: "dimension must be > 0",
            });
        }
        if means.nrows() != k {
            return Err(Error::ShapeMismatch {
                expected: format!("means {k}x{d}"),
                actual: format!("means {}x{}", means.nrows(), d),
            });
        }
        if variances.dim() != (k, d) {
            return Err(Error::ShapeMismatch {
                expected: format!("variances {k}x{d}"),
                actual: format!("variances {}x{}", variances.nrows(), variances.ncols()),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidParameter {
                name: "weights",
                message: "must be finite and non-negative",
            });
        }
        let total = weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidParameter {
                name: "weights",
                message: "must sum to 1",
            });
        }
        if (total - 1.0).abs() > weight_rounding_tolerance(k) {
            weights.mapv_inplace(|w| w / total);
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "means",
                message: "must be finite",
            });
        }
        if variances.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(Error::InvalidParameter {
                name: "variances",
                message: "must be finite and > 0",
            });
        }

        Ok(Self {
            weights,
            means,
            variances,
            variance_floor: Array1::from_elem(d, f64::EPSILON),
        })
    }

    /// Build a model from nested vectors, one inner vector per component.
    pub fn from_vecs(
        weights: Vec<f64>,
        means: Vec<Vec<f64>>,
        variances: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let means = rows_to_array("means", means)?;
        let variances = rows_to_array("variances", variances)?;
        Self::new(Array1::from_vec(weights), means, variances)
    }

    /// Set the same variance floor in every dimension.
    pub fn with_variance_floor(mut self, floor: f64) -> Result<Self> {
        let d = self.dim();
        self.set_variance_floor(Array1::from_elem(d, floor))?;
        Ok(self)
    }

    /// Set a per-dimension variance floor.
    ///
    /// Current variances are raised to the new floor immediately.
    pub fn set_variance_floor(&mut self, floor: Array1<f64>) -> Result<()> {
        if floor.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: floor.len(),
            });
        }
        if floor.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(Error::InvalidParameter {
                name: "variance_floor",
                message: "must be finite and non-negative",
            });
        }
        self.variance_floor = floor;
        for k in 0..self.n_components() {
            self.apply_variance_floor(k);
        }
        Ok(())
    }

    /// Number of components (K).
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Feature dimension (D).
    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    /// Mixture weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Component means, one row per component.
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Diagonal variances, one row per component.
    pub fn variances(&self) -> &Array2<f64> {
        &self.variances
    }

    /// Per-dimension variance floor.
    pub fn variance_floor(&self) -> &Array1<f64> {
        &self.variance_floor
    }

    /// Mean of component `k`.
    pub fn mean(&self, k: usize) -> ArrayView1<'_, f64> {
        self.means.row(k)
    }

    /// Variance of component `k`.
    pub fn variance(&self, k: usize) -> ArrayView1<'_, f64> {
        self.variances.row(k)
    }

    pub(crate) fn weights_mut(&mut self) -> &mut Array1<f64> {
        &mut self.weights
    }

    pub(crate) fn means_mut(&mut self) -> &mut Array2<f64> {
        &mut self.means
    }

    pub(crate) fn variances_mut(&mut self) -> &mut Array2<f64> {
        &mut self.variances
    }

    /// Clamp component `k`'s variances to the floor.
    pub(crate) fn apply_variance_floor(&mut self, k: usize) {
        let floor = &self.variance_floor;
        self.variances
            .row_mut(k)
            .iter_mut()
            .zip(floor.iter())
            .for_each(|(v, &f)| {
                // NaN from a cancelled second moment also lands on the floor.
                if v.is_nan() || *v < f {
                    *v = f;
                }
            });
    }

    /// Copy weights, means, variances and the variance floor from `other`.
    pub fn copy_parameters_from(&mut self, other: &GaussianMixtureModel) -> Result<()> {
        self.check_same_shape(other)?;
        self.weights.assign(&other.weights);
        self.means.assign(&other.means);
        self.variances.assign(&other.variances);
        self.variance_floor.assign(&other.variance_floor);
        Ok(())
    }

    /// Error unless `other` has the same K and D.
    pub(crate) fn check_same_shape(&self, other: &GaussianMixtureModel) -> Result<()> {
        if self.dim() != other.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: other.dim(),
            });
        }
        if self.n_components() != other.n_components() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} components", self.n_components()),
                actual: format!("{} components", other.n_components()),
            });
        }
        Ok(())
    }

    /// Approximate parameter equality: `|a - b| <= abs_eps + rel_eps * |b|`
    /// for every weight, mean and variance.
    pub fn is_similar_to(&self, other: &GaussianMixtureModel, rel_eps: f64, abs_eps: f64) -> bool {
        if self.check_same_shape(other).is_err() {
            return false;
        }
        let close = |a: &f64, b: &f64| (a - b).abs() <= abs_eps + rel_eps * b.abs();
        self.weights.iter().zip(other.weights.iter()).all(|(a, b)| close(a, b))
            && self.means.iter().zip(other.means.iter()).all(|(a, b)| close(a, b))
            && self
                .variances
                .iter()
                .zip(other.variances.iter())
                .all(|(a, b)| close(a, b))
    }

    /// Log-density of `sample` under the mixture.
    pub fn log_likelihood(&self, sample: &[f64]) -> Result<f64> {
        let mut scratch = vec![0.0; self.n_components()];
        self.log_likelihood_components(sample, &mut scratch)
    }

    /// Fill `out[k] = ln wₖ + ln N(sample | μₖ, σ²ₖ)` and return the mixture
    /// log-density (log-sum-exp of `out`).
    pub fn log_likelihood_components(&self, sample: &[f64], out: &mut [f64]) -> Result<f64> {
        if sample.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: sample.len(),
            });
        }
        if out.len() != self.n_components() {
            return Err(Error::DimensionMismatch {
                expected: self.n_components(),
                found: out.len(),
            });
        }
        Ok(self.weighted_log_densities(sample, out))
    }

    /// Unchecked variant of [`Self::log_likelihood_components`].
    pub(crate) fn weighted_log_densities(&self, sample: &[f64], out: &mut [f64]) -> f64 {
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = self.weights[k].ln()
                + log_gaussian(sample, &self.means.row(k), &self.variances.row(k));
        }
        logsumexp(out)
    }
}

/// Log-density of a point under a diagonal Gaussian.
pub(crate) fn log_gaussian(
    point: &[f64],
    mean: &ArrayView1<'_, f64>,
    var: &ArrayView1<'_, f64>,
) -> f64 {
    let d = point.len() as f64;
    let mut log_prob = -0.5 * d * (2.0 * std::f64::consts::PI).ln();

    for i in 0..point.len() {
        let diff = point[i] - mean[i];
        log_prob -= 0.5 * var[i].ln();
        log_prob -= 0.5 * diff * diff / var[i];
    }

    log_prob
}

/// Log-sum-exp for numerical stability.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

fn rows_to_array(name: &'static str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let k = rows.len();
    let d = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(k * d);
    for row in rows {
        if row.len() != d {
            return Err(Error::ShapeMismatch {
                expected: format!("{name} rows of length {d}"),
                actual: format!("row of length {}", row.len()),
            });
        }
        flat.extend(row);
    }
    Array2::from_shape_vec((k, d), flat).map_err(|e| Error::ShapeMismatch {
        expected: format!("{name} {k}x{d}"),
        actual: e.to_string(),
    })
}
