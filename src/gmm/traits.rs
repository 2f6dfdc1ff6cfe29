//! Trainer traits.
//!
//! An M-step trainer does not compute responsibilities itself; it holds an
//! [`ExpectationStep`] engine and reads the statistics that engine produced.

use super::config::EmConfig;
use super::model::GaussianMixtureModel;
use super::stats::SufficientStatistics;
use crate::error::Result;

/// E-step capability: responsibilities and sufficient statistics.
pub trait ExpectationStep {
    /// Recompute sufficient statistics of `data` under `model`.
    ///
    /// Must not mutate the model.
    fn e_step(&mut self, model: &GaussianMixtureModel, data: &[Vec<f64>]) -> Result<()>;

    /// Average log-likelihood per sample from the last E-step.
    fn compute_likelihood(&self, model: &GaussianMixtureModel) -> Result<f64>;

    /// Statistics from the last E-step, if any.
    fn statistics(&self) -> Option<&SufficientStatistics>;
}

/// M-step capability, driven by [`crate::gmm::em::run_em`].
pub trait MaximizationStep {
    /// E-step engine the trainer delegates to.
    type Expectation: ExpectationStep;

    /// Borrow the E-step engine.
    fn expectation(&self) -> &Self::Expectation;

    /// Mutably borrow the E-step engine.
    fn expectation_mut(&mut self) -> &mut Self::Expectation;

    /// Loop configuration.
    fn config(&self) -> &EmConfig;

    /// Prepare `model` as the starting point of training.
    fn initialize(&mut self, model: &mut GaussianMixtureModel) -> Result<()>;

    /// Update `model` from the statistics of the last E-step.
    fn m_step(&mut self, model: &mut GaussianMixtureModel) -> Result<()>;
}
