//! Errors returned synchronously by editor operations

/// Rejected user input. The editor state is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Real-world length must be a positive number of centimetres, got {0}")]
    InvalidCmValue(f64),

    #[error("No completed scale line to confirm")]
    NoCompletedLine,

    #[error("Grid size must be between {min} and {max} mm, got {value}")]
    InvalidGridSize { value: f64, min: f64, max: f64 },

    #[error("No leaf labelled {0}")]
    UnknownLeaf(String),

    #[error("Active leaf must be closed before starting a new one")]
    ActiveLeafOpen,
}

pub type ValidationResult<T> = Result<T, ValidationError>;
