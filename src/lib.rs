//! # gmm-map
//!
//! MAP (Reynolds) adaptation of diagonal Gaussian mixture models with EM.
//!
//! A prior ("universal background") mixture is specialised to a new dataset by
//! blending, per component, the maximum-likelihood re-estimate with the prior
//! parameters. Components that saw little data stay close to the prior.
//!
//! **Default build** is sequential. The `parallel` feature splits the E-step
//! across rayon workers; `serde` derives serialization for the model.

/// Error types used across `gmm_map`.
pub mod error;
pub mod gmm;


pub use error::{Error, Result};
pub use gmm::{
    AdaptationConfig, EmConfig, ExpectationStep, GaussianMixtureModel, GmmBaseTrainer,
    MapGmmTrainer, MaximizationStep, MlGmmTrainer, SufficientStatistics, TrainOutcome,
    TrainSummary, UpdateFlags,
};
