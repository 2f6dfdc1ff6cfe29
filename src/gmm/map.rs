//! MAP (Reynolds) adaptation of a Gaussian mixture toward new data.
//!
//! Training starts from a fixed **prior** model (typically a universal
//! background model) and, at every M-step, blends the maximum-likelihood
//! estimate of each component with the prior's parameters:
//!
//! ```text
//! μₖ  = αₖ × (Σγxₖ / nₖ)              + (1 − αₖ) × μₖ⁽ᵖʳⁱᵒʳ⁾
//! σ²ₖ = αₖ × (Σγx²ₖ / nₖ − μ̂ₖ²)      + (1 − αₖ) × σ²ₖ⁽ᵖʳⁱᵒʳ⁾
//! wₖ  = αₖ × (nₖ / N)                 + (1 − αₖ) × wₖ⁽ᵖʳⁱᵒʳ⁾
//! ```
//!
//! where μ̂ₖ is the ML mean. The adaptation coefficient αₖ is either a fixed
//! global value or follows the relevance-factor rule
//!
//! ```text
//! αₖ = nₖ / (nₖ + r)
//! ```
//!
//! so components that saw little data stay near the prior and components
//! with nₖ ≫ r move to the ML estimate.
//!
//! # Degenerate components
//!
//! A component whose responsibility mass is at or below
//! [`EmConfig::responsibility_threshold`] (zero by default) keeps the prior's
//! mean, variance and weight exactly. Weight renormalisation only rescales the
//! remaining components, so those prior weights survive it.
//!
//! # Reference
//!
//! Reynolds, Quatieri & Dunn (2000). "Speaker Verification Using Adapted
//! Gaussian Mixture Models". Digital Signal Processing 10. The mean, weight and
//! αₖ rules follow eq. (11), (12) and (14). The variance is a direct blend of
//! the ML and prior variances, not the second-moment form of eq. (13).

use super::base::GmmBaseTrainer;
use super::config::EmConfig;
use super::em::{run_em, TrainSummary};
use super::model::{weight_rounding_tolerance, GaussianMixtureModel};
use super::traits::{ExpectationStep, MaximizationStep};
use crate::error::{Error, Result};
use ndarray::Array1;

/// How the per-component adaptation coefficient αₖ is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdaptationConfig {
    /// αₖ = alpha for every component; alpha ∈ \[0, 1\].
    FixedAlpha(f64),
    /// αₖ = nₖ / (nₖ + r); r > 0.
    RelevanceFactor(f64),
}

impl AdaptationConfig {
    /// Check the coefficient range.
    pub fn validate(&self) -> Result<()> {
        match *self {
            AdaptationConfig::FixedAlpha(alpha) => {
                if !(0.0..=1.0).contains(&alpha) {
                    return Err(Error::InvalidConfig {
                        message: format!("alpha must lie in [0, 1], got {alpha}"),
                    });
                }
            }
            AdaptationConfig::RelevanceFactor(r) => {
                if !r.is_finite() || r <= 0.0 {
                    return Err(Error::InvalidConfig {
                        message: format!("relevance factor must be finite and > 0, got {r}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// αₖ for a component with responsibility mass `n`.
    pub fn coefficient(&self, n: f64) -> f64 {
        match *self {
            AdaptationConfig::FixedAlpha(alpha) => alpha,
            AdaptationConfig::RelevanceFactor(r) => n / (n + r),
        }
    }
}

/// MAP adaptation trainer.
///
/// Delegates the E-step to `E` (by default [`GmmBaseTrainer`]) and owns the
/// prior model, which it never mutates.
#[derive(Debug, Clone)]
pub struct MapGmmTrainer<E = GmmBaseTrainer> {
    base: E,
    prior: GaussianMixtureModel,
    adaptation: AdaptationConfig,
    config: EmConfig,
}

impl<E: ExpectationStep> MapGmmTrainer<E> {
    /// Create a trainer adapting from `prior`.
    ///
    /// Fails with [`Error::InvalidConfig`] when the coefficient is out of range.
    pub fn new(base: E, prior: GaussianMixtureModel, adaptation: AdaptationConfig) -> Result<Self> {
        adaptation.validate()?;
        Ok(Self {
            base,
            prior,
            adaptation,
            config: EmConfig::default(),
        })
    }

    /// Replace the loop configuration.
    pub fn with_config(mut self, config: EmConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Set the convergence threshold.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.config.convergence_threshold = threshold;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Enable or disable likelihood-based early stopping.
    pub fn with_converge_by_likelihood(mut self, enabled: bool) -> Self {
        self.config.converge_by_likelihood = enabled;
        self
    }

    /// The prior model.
    pub fn prior(&self) -> &GaussianMixtureModel {
        &self.prior
    }

    /// The adaptation rule.
    pub fn adaptation(&self) -> AdaptationConfig {
        self.adaptation
    }

    /// The E-step engine.
    pub fn base(&self) -> &E {
        &self.base
    }

    /// αₖ for every component, from the last E-step.
    pub fn adaptation_coefficients(&self) -> Result<Array1<f64>> {
        let stats = self.base.statistics().ok_or(Error::NotInitialized)?;
        Ok(stats.n.mapv(|n| self.adaptation.coefficient(n)))
    }

    /// Adapt `model` to `data`, starting from the prior.
    ///
    /// Re-running restarts from the prior.
    pub fn train(
        &mut self,
        model: &mut GaussianMixtureModel,
        data: &[Vec<f64>],
    ) -> Result<TrainSummary> {
        run_em(self, model, data)
    }
}

impl<E: ExpectationStep> MaximizationStep for MapGmmTrainer<E> {
    type Expectation = E;

    fn expectation(&self) -> &E {
        &self.base
    }

    fn expectation_mut(&mut self) -> &mut E {
        &mut self.base
    }

    fn config(&self) -> &EmConfig {
        &self.config
    }

    fn initialize(&mut self, model: &mut GaussianMixtureModel) -> Result<()> {
        model.copy_parameters_from(&self.prior)
    }

    fn m_step(&mut self, model: &mut GaussianMixtureModel) -> Result<()> {
        let stats = self.base.statistics().ok_or(Error::NotInitialized)?;
        model.check_same_shape(&self.prior)?;
        stats.check_model(model)?;

        let prior = &self.prior;
        let update = self.config.update;
        let threshold = self.config.responsibility_threshold;
        let total = stats.t as f64;

        let mut degenerate = vec![false; model.n_components()];
        let mut degenerate_weight = 0.0;
        let mut adapted_weight = 0.0;

        for k in 0..model.n_components() {
            let n_k = stats.n[k];

            if n_k <= threshold {
                degenerate[k] = true;
                if update.means {
                    model.means_mut().row_mut(k).assign(&prior.mean(k));
                }
                if update.variances {
                    model.variances_mut().row_mut(k).assign(&prior.variance(k));
                }
                if update.weights {
                    model.weights_mut()[k] = prior.weights()[k];
                    degenerate_weight += prior.weights()[k];
                }
                continue;
            }

            let alpha = self.adaptation.coefficient(n_k);
            let ml_mean = stats.sum_px.row(k).mapv(|s| s / n_k);

            if update.means {
                for (j, m) in model.means_mut().row_mut(k).iter_mut().enumerate() {
                    *m = alpha * ml_mean[j] + (1.0 - alpha) * prior.mean(k)[j];
                }
            }

            if update.variances {
                for (j, v) in model.variances_mut().row_mut(k).iter_mut().enumerate() {
                    let ml_var = stats.sum_pxx[[k, j]] / n_k - ml_mean[j] * ml_mean[j];
                    *v = alpha * ml_var + (1.0 - alpha) * prior.variance(k)[j];
                }
                model.apply_variance_floor(k);
            }

            if update.weights {
                let w = alpha * (n_k / total) + (1.0 - alpha) * prior.weights()[k];
                model.weights_mut()[k] = w;
                adapted_weight += w;
            }
        }

        if update.weights && adapted_weight > 0.0 {
            let scale = (1.0 - degenerate_weight) / adapted_weight;
            if (scale - 1.0).abs() > weight_rounding_tolerance(model.n_components()) {
                for (k, w) in model.weights_mut().iter_mut().enumerate() {
                    if !degenerate[k] {
                        *w *= scale;
                    }
                }
            }
        }

        tracing::trace!(
            degenerate = degenerate.iter().filter(|&&d| d).count(),
            "MAP M-step applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> GaussianMixtureModel {
        GaussianMixtureModel::from_vecs(
            vec![0.5, 0.5],
            vec![vec![0.0], vec![10.0]],
            vec![vec![1.0], vec![1.0]],
        )
        .unwrap()
    }

    fn near_ten(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![9.5 + (i as f64) / (n as f64)]).collect()
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        for bad in [-0.1, 1.5, f64::NAN] {
            let r = MapGmmTrainer::new(
                GmmBaseTrainer::new(),
                prior(),
                AdaptationConfig::FixedAlpha(bad),
            );
            assert!(matches!(r, Err(Error::InvalidConfig { .. })), "alpha {bad}");
        }
    }

    #[test]
    fn test_invalid_relevance_factor_rejected() {
        for bad in [0.0, -4.0, f64::INFINITY, f64::NAN] {
            let r = MapGmmTrainer::new(
                GmmBaseTrainer::new(),
                prior(),
                AdaptationConfig::RelevanceFactor(bad),
            );
            assert!(matches!(r, Err(Error::InvalidConfig { .. })), "relevance {bad}");
        }
    }

    #[test]
    fn test_coefficient_rules() {
        assert_eq!(AdaptationConfig::FixedAlpha(0.3).coefficient(1000.0), 0.3);
        let r = AdaptationConfig::RelevanceFactor(4.0);
        assert!((r.coefficient(100.0) - 100.0 / 104.0).abs() < 1e-15);
        assert_eq!(r.coefficient(0.0), 0.0);
    }

    #[test]
    fn test_m_step_before_e_step_errors() {
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.5))
                .unwrap();
        let mut model = prior();
        assert_eq!(trainer.m_step(&mut model), Err(Error::NotInitialized));
        assert!(trainer.adaptation_coefficients().is_err());
    }

    #[test]
    fn test_initialize_copies_prior() {
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.5))
                .unwrap();
        let mut model = GaussianMixtureModel::from_vecs(
            vec![0.9, 0.1],
            vec![vec![3.0], vec![-3.0]],
            vec![vec![0.2], vec![7.0]],
        )
        .unwrap();
        trainer.initialize(&mut model).unwrap();
        assert_eq!(&model, trainer.prior());
        trainer.initialize(&mut model).unwrap();
        assert_eq!(&model, trainer.prior());
    }

    #[test]
    fn test_initialize_shape_mismatch() {
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.5))
                .unwrap();
        let mut model =
            GaussianMixtureModel::from_vecs(vec![1.0], vec![vec![0.0, 0.0]], vec![vec![1.0, 1.0]])
                .unwrap();
        assert!(trainer.initialize(&mut model).is_err());
    }

    #[test]
    fn test_m_step_blends_mean_with_fixed_alpha() {
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.25))
                .unwrap();
        let mut model = prior();
        let data = vec![vec![12.0]; 10];
        trainer.initialize(&mut model).unwrap();
        trainer.expectation_mut().e_step(&model, &data).unwrap();
        trainer.m_step(&mut model).unwrap();

        // All data sits at 12: the ML mean of component 1 is 12.
        assert!((model.mean(1)[0] - (0.25 * 12.0 + 0.75 * 10.0)).abs() < 1e-9);
        // ML variance is 0, so the blend is 0.75 * prior.
        assert!((model.variance(1)[0] - 0.75).abs() < 1e-9);
        assert!((model.weights().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_m_step_relevance_weight_follows_mass() {
        let mut trainer = MapGmmTrainer::new(
            GmmBaseTrainer::new(),
            prior(),
            AdaptationConfig::RelevanceFactor(4.0),
        )
        .unwrap();
        let mut model = prior();
        trainer.initialize(&mut model).unwrap();
        trainer.expectation_mut().e_step(&model, &near_ten(100)).unwrap();
        trainer.m_step(&mut model).unwrap();

        let alphas = trainer.adaptation_coefficients().unwrap();
        assert!((alphas[1] - 100.0 / 104.0).abs() < 1e-6);
        assert!(alphas[0] < 1e-12);
        assert!(model.weights()[1] > 0.95);
        assert!((model.weights().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_component_keeps_prior() {
        // A responsibility threshold turns the far component into a degenerate one.
        let config = EmConfig::default().with_responsibility_threshold(1e-6);
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(1.0))
                .unwrap()
                .with_config(config)
                .unwrap();
        let mut model = prior();
        trainer.initialize(&mut model).unwrap();
        trainer.expectation_mut().e_step(&model, &near_ten(50)).unwrap();
        trainer.m_step(&mut model).unwrap();

        assert_eq!(model.mean(0)[0], 0.0);
        assert_eq!(model.variance(0)[0], 1.0);
        assert_eq!(model.weights()[0], 0.5);
        assert!((model.weights()[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_update_flags_means_only() {
        use crate::gmm::config::UpdateFlags;

        let config = EmConfig::default().with_update(UpdateFlags::means_only());
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.5))
                .unwrap()
                .with_config(config)
                .unwrap();
        let mut model = prior();
        trainer.initialize(&mut model).unwrap();
        trainer.expectation_mut().e_step(&model, &vec![vec![11.0]; 20]).unwrap();
        trainer.m_step(&mut model).unwrap();

        assert!((model.mean(1)[0] - 10.5).abs() < 1e-9);
        assert_eq!(model.variances(), prior().variances());
        assert_eq!(model.weights(), prior().weights());
    }

    #[test]
    fn test_m_step_rejects_foreign_model() {
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), prior(), AdaptationConfig::FixedAlpha(0.5))
                .unwrap();
        let mut model = prior();
        trainer.expectation_mut().e_step(&model, &[vec![1.0]]).unwrap();
        let mut other =
            GaussianMixtureModel::from_vecs(vec![1.0], vec![vec![0.0]], vec![vec![1.0]]).unwrap();
        assert!(trainer.m_step(&mut other).is_err());
        assert!(trainer.m_step(&mut model).is_ok());
    }

    #[test]
    fn test_variance_floor_applied() {
        let floored = prior().with_variance_floor(0.5).unwrap();
        let mut trainer =
            MapGmmTrainer::new(GmmBaseTrainer::new(), floored, AdaptationConfig::FixedAlpha(1.0))
                .unwrap();
        let mut model = prior();
        trainer.initialize(&mut model).unwrap();
        // Identical samples: ML variance is zero.
        trainer.expectation_mut().e_step(&model, &vec![vec![10.0]; 5]).unwrap();
        trainer.m_step(&mut model).unwrap();
        assert_eq!(model.variance(1)[0], 0.5);
    }
}
