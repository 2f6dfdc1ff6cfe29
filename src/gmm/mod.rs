//! Gaussian mixture models and their EM trainers.
//!
//! ## The Model
//!
//! A diagonal-covariance mixture of K Gaussians in D dimensions:
//!
//! ```text
//! p(x) = Σₖ wₖ × N(x | μₖ, diag(σ²ₖ))
//! ```
//!
//! ## Training
//!
//! Training alternates two steps:
//!
//! 1. **E-step** ([`GmmBaseTrainer`]): compute responsibilities
//!    P(component k | xᵢ) and accumulate [`SufficientStatistics`].
//! 2. **M-step**: update the model from the statistics, either by maximum
//!    likelihood ([`MlGmmTrainer`]) or by MAP adaptation toward a prior
//!    ([`MapGmmTrainer`]).
//!
//! M-step trainers hold their E-step engine behind the [`ExpectationStep`]
//! trait instead of re-implementing it, and both share one loop
//! ([`run_em`]) that stops on a relative likelihood change or an iteration
//! cap.
//!
//! ## MAP Adaptation
//!
//! With little adaptation data, pure ML re-estimation overfits: a component
//! that owns three samples collapses onto them. MAP adaptation blends each
//! ML estimate with the prior's parameter, weighted by how much data the
//! component saw. See [`map`] for the update equations.
//!
//! ## Usage
//!
//! ```rust
//! use gmm_map::gmm::{
//!     AdaptationConfig, GaussianMixtureModel, GmmBaseTrainer, MapGmmTrainer,
//! };
//!
//! let prior = GaussianMixtureModel::from_vecs(
//!     vec![0.5, 0.5],
//!     vec![vec![0.0], vec![10.0]],
//!     vec![vec![1.0], vec![1.0]],
//! )
//! .unwrap();
//! let data: Vec<Vec<f64>> = (0..20).map(|i| vec![10.0 + 0.05 * i as f64]).collect();
//!
//! let mut trainer = MapGmmTrainer::new(
//!     GmmBaseTrainer::new(),
//!     prior.clone(),
//!     AdaptationConfig::RelevanceFactor(4.0),
//! )
//! .unwrap();
//!
//! let mut adapted = prior.clone();
//! trainer.train(&mut adapted, &data).unwrap();
//!
//! // The component without data stays at the prior.
//! assert!(adapted.mean(0)[0].abs() < 1e-9);
//! ```

mod base;
mod config;
pub mod em;
pub mod map;
mod ml;
mod model;
mod stats;
mod traits;

pub use base::GmmBaseTrainer;
pub use config::{EmConfig, UpdateFlags};
pub use em::{run_em, TrainOutcome, TrainSummary};
pub use map::{AdaptationConfig, MapGmmTrainer};
pub use ml::MlGmmTrainer;
pub use model::GaussianMixtureModel;
pub use stats::SufficientStatistics;
pub use traits::{ExpectationStep, MaximizationStep};
