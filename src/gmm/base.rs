//! E-step engine shared by the M-step trainers.
//!
//! **E-step**: for each sample xᵢ and component k,
//!
//! ```text
//! γᵢₖ = wₖ N(xᵢ | μₖ, σ²ₖ) / Σⱼ wⱼ N(xᵢ | μⱼ, σ²ⱼ)
//! ```
//!
//! The denominator is computed with log-sum-exp over the per-component log
//! terms, so samples many standard deviations away from every component still
//! get responsibilities that sum to one.
//!
//! With the `parallel` feature the samples are split into chunks, each chunk
//! produces partial statistics, and the partials are summed.

use super::model::GaussianMixtureModel;
use super::stats::SufficientStatistics;
use super::traits::ExpectationStep;
use crate::error::{Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Samples per rayon task.
#[cfg(feature = "parallel")]
const PARALLEL_CHUNK: usize = 256;

/// Computes responsibilities and sufficient statistics.
#[derive(Debug, Clone, Default)]
pub struct GmmBaseTrainer {
    stats: Option<SufficientStatistics>,
}

impl GmmBaseTrainer {
    /// Create a trainer with no statistics yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_samples(model: &GaussianMixtureModel, data: &[Vec<f64>]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let d = model.dim();
        if let Some(bad) = data.iter().find(|x| x.len() != d) {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: bad.len(),
            });
        }
        Ok(())
    }

    /// Statistics of a contiguous run of samples.
    fn accumulate_chunk(model: &GaussianMixtureModel, chunk: &[Vec<f64>]) -> SufficientStatistics {
        let mut stats = SufficientStatistics::new(model.n_components(), model.dim());
        let mut resp = vec![0.0; model.n_components()];
        for sample in chunk {
            let log_px = model.weighted_log_densities(sample, &mut resp);
            for r in resp.iter_mut() {
                *r = (*r - log_px).exp();
            }
            stats.accumulate(sample, &resp, log_px);
        }
        stats
    }
}

impl ExpectationStep for GmmBaseTrainer {
    fn e_step(&mut self, model: &GaussianMixtureModel, data: &[Vec<f64>]) -> Result<()> {
        Self::check_samples(model, data)?;

        #[cfg(feature = "parallel")]
        let stats = data
            .par_chunks(PARALLEL_CHUNK)
            .map(|chunk| Ok::<_, Error>(Self::accumulate_chunk(model, chunk)))
            .try_reduce(
                || SufficientStatistics::new(model.n_components(), model.dim()),
                |mut a, b| {
                    a.merge(&b)?;
                    Ok(a)
                },
            )?;

        #[cfg(not(feature = "parallel"))]
        let stats = Self::accumulate_chunk(model, data);

        tracing::trace!(
            samples = stats.t,
            log_likelihood = stats.log_likelihood,
            "E-step accumulated statistics"
        );

        self.stats = Some(stats);
        Ok(())
    }

    fn compute_likelihood(&self, model: &GaussianMixtureModel) -> Result<f64> {
        let stats = self.stats.as_ref().ok_or(Error::NotInitialized)?;
        stats.check_model(model)?;
        stats.average_log_likelihood()
    }

    fn statistics(&self) -> Option<&SufficientStatistics> {
        self.stats.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_component() -> GaussianMixtureModel {
        GaussianMixtureModel::from_vecs(
            vec![0.5, 0.5],
            vec![vec![0.0, 0.0], vec![10.0, 10.0]],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_likelihood_before_e_step_errors() {
        let trainer = GmmBaseTrainer::new();
        assert_eq!(
            trainer.compute_likelihood(&two_component()),
            Err(Error::NotInitialized)
        );
        assert!(trainer.statistics().is_none());
    }

    #[test]
    fn test_e_step_responsibility_mass_equals_sample_count() {
        let data = vec![
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![9.9, 10.2],
            vec![-1.0, 0.5],
        ];
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&two_component(), &data).unwrap();
        let ss = trainer.statistics().unwrap();

        assert_eq!(ss.t, 4);
        assert!((ss.n.sum() - 4.0).abs() < 1e-12);
        // The midpoint is split evenly between the two components.
        assert!((ss.n[0] - 2.5).abs() < 1e-6);
        assert!((ss.n[1] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_e_step_far_samples_do_not_underflow() {
        // exp(-0.5 * 1e6) is 0.0 in f64; log-sum-exp keeps responsibilities valid.
        let data = vec![vec![1000.0, 1000.0], vec![-1000.0, -1000.0]];
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&two_component(), &data).unwrap();
        let ss = trainer.statistics().unwrap();

        assert!((ss.n.sum() - 2.0).abs() < 1e-12);
        assert!((ss.n[0] - 1.0).abs() < 1e-12);
        assert!((ss.n[1] - 1.0).abs() < 1e-12);
        assert!(ss.log_likelihood.is_finite());
    }

    #[test]
    fn test_e_step_first_and_second_moments() {
        let gmm =
            GaussianMixtureModel::from_vecs(vec![1.0], vec![vec![0.0]], vec![vec![1.0]]).unwrap();
        let data = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&gmm, &data).unwrap();
        let ss = trainer.statistics().unwrap();

        assert_eq!(ss.n[0], 3.0);
        assert_eq!(ss.sum_px[[0, 0]], 6.0);
        assert_eq!(ss.sum_pxx[[0, 0]], 14.0);

        let expected: f64 = data
            .iter()
            .map(|x| gmm.log_likelihood(x).unwrap())
            .sum::<f64>()
            / 3.0;
        let avg = trainer.compute_likelihood(&gmm).unwrap();
        assert!((avg - expected).abs() < 1e-12);
    }

    #[test]
    fn test_e_step_dimension_mismatch() {
        let data = vec![vec![0.0, 0.0], vec![1.0]];
        let mut trainer = GmmBaseTrainer::new();
        assert_eq!(
            trainer.e_step(&two_component(), &data),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_e_step_empty_input() {
        let mut trainer = GmmBaseTrainer::new();
        assert_eq!(trainer.e_step(&two_component(), &[]), Err(Error::EmptyInput));
    }

    #[test]
    fn test_e_step_does_not_mutate_model() {
        let gmm = two_component();
        let before = gmm.clone();
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&gmm, &[vec![3.0, 4.0]]).unwrap();
        assert_eq!(gmm, before);
    }

    #[test]
    fn test_compute_likelihood_rejects_other_shape() {
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&two_component(), &[vec![0.0, 0.0]]).unwrap();
        let other =
            GaussianMixtureModel::from_vecs(vec![1.0], vec![vec![0.0]], vec![vec![1.0]]).unwrap();
        assert!(trainer.compute_likelihood(&other).is_err());
    }

    #[test]
    fn test_e_step_many_samples_matches_per_sample_sum() {
        // Crosses the parallel chunk boundary when that feature is on.
        let data: Vec<Vec<f64>> = (0..1000)
            .map(|i| vec![(i % 37) as f64 * 0.3, (i % 11) as f64])
            .collect();
        let gmm = two_component();
        let mut trainer = GmmBaseTrainer::new();
        trainer.e_step(&gmm, &data).unwrap();
        let ss = trainer.statistics().unwrap();

        let expected: f64 = data.iter().map(|x| gmm.log_likelihood(x).unwrap()).sum();
        assert_eq!(ss.t, 1000);
        assert!((ss.log_likelihood - expected).abs() < 1e-6 * expected.abs());
        assert!((ss.n.sum() - 1000.0).abs() < 1e-9);
    }
}
