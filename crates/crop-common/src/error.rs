//! Error types for the shared spatial/temporal types.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while parsing or validating footprints, grids and windows.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid interval: start {start} is after end {end}")]
    InvertedInterval { start: String, end: String },

    #[error("Duplicate window label: {0}")]
    DuplicateWindowLabel(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),
}

impl CommonError {
    /// Create an InvalidTime error.
    pub fn invalid_time(msg: impl Into<String>) -> Self {
        Self::InvalidTime(msg.into())
    }

    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }
}
