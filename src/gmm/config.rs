//! Options shared by the EM trainers.

use crate::error::{Error, Result};

/// Which parameters an M-step re-estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateFlags {
    /// Re-estimate component means.
    pub means: bool,
    /// Re-estimate component variances.
    pub variances: bool,
    /// Re-estimate mixture weights.
    pub weights: bool,
}

impl Default for UpdateFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl UpdateFlags {
    /// Update means, variances and weights.
    pub fn all() -> Self {
        Self {
            means: true,
            variances: true,
            weights: true,
        }
    }

    /// Update means only (the usual choice for speaker adaptation).
    pub fn means_only() -> Self {
        Self {
            means: true,
            variances: false,
            weights: false,
        }
    }
}

/// EM loop configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EmConfig {
    /// Relative change of the average log-likelihood below which training stops.
    pub convergence_threshold: f64,
    /// Maximum number of M-step/E-step cycles after the seed E-step.
    pub max_iterations: usize,
    /// Track the average log-likelihood and stop early on convergence.
    pub converge_by_likelihood: bool,
    /// Parameters to re-estimate.
    pub update: UpdateFlags,
    /// Components whose responsibility mass is at or below this value keep
    /// their previous (MAP: prior) parameters.
    pub responsibility_threshold: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 1e-3,
            max_iterations: 10,
            converge_by_likelihood: true,
            update: UpdateFlags::all(),
            responsibility_threshold: 0.0,
        }
    }
}

impl EmConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the convergence threshold.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable likelihood-based early stopping.
    pub fn with_converge_by_likelihood(mut self, enabled: bool) -> Self {
        self.converge_by_likelihood = enabled;
        self
    }

    /// Choose which parameters are re-estimated.
    pub fn with_update(mut self, update: UpdateFlags) -> Self {
        self.update = update;
        self
    }

    /// Set the degenerate-component responsibility threshold.
    pub fn with_responsibility_threshold(mut self, threshold: f64) -> Self {
        self.responsibility_threshold = threshold;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(Error::InvalidParameter {
                name: "convergence_threshold",
                message: "must be finite and >= 0",
            });
        }
        if !self.responsibility_threshold.is_finite() || self.responsibility_threshold < 0.0 {
            return Err(Error::InvalidParameter {
                name: "responsibility_threshold",
                message: "must be finite and >= 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EmConfig::default();
        assert_eq!(c.convergence_threshold, 0.001);
        assert_eq!(c.max_iterations, 10);
        assert!(c.converge_by_likelihood);
        assert_eq!(c.update, UpdateFlags::all());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let c = EmConfig::new().with_convergence_threshold(-1.0);
        assert!(c.validate().is_err());
        let c = EmConfig::new().with_responsibility_threshold(f64::NAN);
        assert!(c.validate().is_err());
    }
}
