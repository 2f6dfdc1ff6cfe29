use core::fmt;

/// Result alias for `gmm_map`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the mixture model and its trainers.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input dataset was empty.
    EmptyInput,

    /// Sample or model dimension mismatch.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Shape mismatch (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Trainer configuration rejected at construction.
    InvalidConfig {
        /// What was wrong with it.
        message: String,
    },

    /// Likelihood or statistics requested before any E-step ran.
    NotInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::InvalidConfig { message } => write!(f, "invalid configuration: {message}"),
            Error::NotInitialized => {
                write!(f, "no sufficient statistics: run an E-step first")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
