//! Maximum-likelihood EM for a diagonal Gaussian mixture.
//!
//! **M-step** (Bishop 2006, eq. 9.24–9.26):
//! - wₖ  = nₖ / N
//! - μₖ  = Σγxₖ / nₖ
//! - σ²ₖ = Σγx²ₖ / nₖ − μₖ²  (computational form of the weighted variance)
//!
//! Components at or below the responsibility threshold keep their current
//! mean and variance; their weight still follows nₖ / N. Training starts from
//! whatever model the caller passes in, so this trainer is what produces the
//! prior for [`super::MapGmmTrainer`] once the mixture has been seeded.

use super::base::GmmBaseTrainer;
use super::config::EmConfig;
use super::em::{run_em, TrainSummary};
use super::model::GaussianMixtureModel;
use super::traits::{ExpectationStep, MaximizationStep};
use crate::error::{Error, Result};

/// Maximum-likelihood EM trainer.
#[derive(Debug, Clone, Default)]
pub struct MlGmmTrainer<E = GmmBaseTrainer> {
    base: E,
    config: EmConfig,
}

impl<E: ExpectationStep> MlGmmTrainer<E> {
    /// Create a trainer delegating its E-step to `base`.
    pub fn new(base: E) -> Self {
        Self {
            base,
            config: EmConfig::default(),
        }
    }

    /// Replace the loop configuration.
    pub fn with_config(mut self, config: EmConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The E-step engine.
    pub fn base(&self) -> &E {
        &self.base
    }

    /// Fit `model` to `data` starting from its current parameters.
    pub fn train(
        &mut self,
        model: &mut GaussianMixtureModel,
        data: &[Vec<f64>],
    ) -> Result<TrainSummary> {
        run_em(self, model, data)
    }
}

impl<E: ExpectationStep> MaximizationStep for MlGmmTrainer<E> {
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

    fn initialize(&mut self, _model: &mut GaussianMixtureModel) -> Result<()> {
        Ok(())
    }

    fn m_step(&mut self, model: &mut GaussianMixtureModel) -> Result<()> {
        let stats = self.base.statistics().ok_or(Error::NotInitialized)?;
        stats.check_model(model)?;

        let update = self.config.update;
        let threshold = self.config.responsibility_threshold;
        let total = stats.t as f64;

        if update.weights {
            model.weights_mut().assign(&stats.n.mapv(|n| n / total));
        }

        for k in 0..model.n_components() {
            let n_k = stats.n[k];
            if n_k <= threshold {
                continue;
            }

            if update.means {
                model
                    .means_mut()
                    .row_mut(k)
                    .assign(&stats.sum_px.row(k).mapv(|s| s / n_k));
            }

            if update.variances {
                let mean = model.mean(k).to_owned();
                for (j, v) in model.variances_mut().row_mut(k).iter_mut().enumerate() {
                    *v = stats.sum_pxx[[k, j]] / n_k - mean[j] * mean[j];
                }
                model.apply_variance_floor(k);
            }
        }

        Ok(())
    }
}
