//! The EM iteration loop shared by the MAP and ML trainers.
//!
//! ```text
//! initialize → E → [M → E → check]* → Converged | MaxIterationsReached
//! ```
//!
//! Convergence is the relative change of the average log-likelihood between
//! consecutive E-steps:
//!
//! ```text
//! |L_prev − L_cur| / |L_prev| ≤ threshold
//! ```
//!
//! A previous value of exactly zero (or a non-finite one) cannot anchor a
//! relative change, so that iteration counts as not converged and training
//! continues.

use super::model::GaussianMixtureModel;
use super::stats::SufficientStatistics;
use super::traits::{ExpectationStep, MaximizationStep};
use crate::error::Result;

/// How a training run ended. Both are successful outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    /// The relative likelihood change fell below the threshold.
    Converged,
    /// The iteration cap was reached first.
    MaxIterationsReached,
}

/// Summary returned by `train`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    /// How the loop ended.
    pub outcome: TrainOutcome,
    /// Completed M-step/E-step cycles after the seed E-step.
    pub iterations: usize,
    /// Average log-likelihood after the final E-step, when tracked.
    pub average_log_likelihood: Option<f64>,
    /// Components with no responsibility mass in any iteration; they kept
    /// their starting parameters.
    pub degenerate_components: Vec<usize>,
}

/// Relative-change convergence test.
pub(crate) fn has_converged(previous: f64, current: f64, threshold: f64) -> bool {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return false;
    }
    (previous - current).abs() / previous.abs() <= threshold
}

fn mark_degenerate(mask: &mut [bool], stats: Option<&SufficientStatistics>, threshold: f64) {
    if let Some(stats) = stats {
        for (flag, &n) in mask.iter_mut().zip(stats.n.iter()) {
            *flag &= n <= threshold;
        }
    }
}

/// Run the full EM procedure with `trainer` on `model`.
pub fn run_em<T: MaximizationStep>(
    trainer: &mut T,
    model: &mut GaussianMixtureModel,
    data: &[Vec<f64>],
) -> Result<TrainSummary> {
    let config = trainer.config().clone();
    config.validate()?;

    trainer.initialize(model)?;
    trainer.expectation_mut().e_step(model, data)?;

    let mut current = f64::NEG_INFINITY;
    if config.converge_by_likelihood {
        current = trainer.expectation().compute_likelihood(model)?;
    }

    let mut degenerate = vec![true; model.n_components()];
    let mut outcome = TrainOutcome::MaxIterationsReached;
    let mut iterations = 0;

    for iteration in 1..=config.max_iterations {
        let previous = current;

        mark_degenerate(
            &mut degenerate,
            trainer.expectation().statistics(),
            config.responsibility_threshold,
        );
        trainer.m_step(model)?;
        trainer.expectation_mut().e_step(model, data)?;
        iterations = iteration;

        if config.converge_by_likelihood {
            current = trainer.expectation().compute_likelihood(model)?;
            let converged = has_converged(previous, current, config.convergence_threshold);
            tracing::debug!(
                iteration,
                previous_average = previous,
                current_average = current,
                converged,
                "EM iteration"
            );
            if converged {
                outcome = TrainOutcome::Converged;
                break;
            }
        } else {
            tracing::debug!(iteration, "EM iteration");
        }
    }

    let degenerate_components: Vec<usize> = if iterations == 0 {
        Vec::new()
    } else {
        degenerate
            .iter()
            .enumerate()
            .filter_map(|(k, &d)| d.then_some(k))
            .collect()
    };
    if !degenerate_components.is_empty() {
        tracing::debug!(
            components = ?degenerate_components,
            "components received no responsibility and kept their starting parameters"
        );
    }

    Ok(TrainSummary {
        outcome,
        iterations,
        average_log_likelihood: config.converge_by_likelihood.then_some(current),
        degenerate_components,
    })
}
