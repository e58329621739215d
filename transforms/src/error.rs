//! Error types for transform construction and fitting.

use thiserror::Error;

/// Custom error type for transform operations.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A transform name that does not match any known family
    #[error("Unknown transform '{name}' (expected 'hlog', 'tlog', 'glog' or 'linear')")]
    UnknownKind { name: String },

    /// A parameter value outside the domain the transform family accepts
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Spline fitting over a degenerate or non-finite domain
    #[error("Invalid spline domain [{xmin}, {xmax}]: {message}")]
    InvalidSplineDomain {
        xmin: f64,
        xmax: f64,
        message: String,
    },
}

impl TransformError {
    /// Create an UnknownKind error
    pub fn unknown_kind(name: impl Into<String>) -> Self {
        Self::UnknownKind { name: name.into() }
    }

    /// Create an InvalidParameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidSplineDomain error
    pub fn invalid_spline_domain(xmin: f64, xmax: f64, message: impl Into<String>) -> Self {
        Self::InvalidSplineDomain {
            xmin,
            xmax,
            message: message.into(),
        }
    }
}

// Type alias for Result using TransformError
pub type Result<T> = std::result::Result<T, TransformError>;
