//! Error types for feature cube assembly.

use crop_common::CommonError;
use thiserror::Error;

/// Errors that can occur while loading, reducing or merging feature layers.
///
/// None of these are recovered from internally: a feature cube is either
/// fully assembled or the whole collection fails.
#[derive(Error, Debug)]
pub enum FeatureError {
    /// The query is missing required keys or holds unusable values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A nearest-time selection was attempted against a stack without time steps.
    #[error("window '{label}': nearest-time selection against an empty time axis")]
    EmptyTimeAxis { label: String },

    /// A reducer left more than one time step, so the result cannot be flattened.
    #[error("'{context}' still has {steps} time steps after reduction; flattened layers must be 2-D")]
    ResidualTimeAxis { context: String, steps: usize },

    /// A layer or stack does not sit on the reference grid.
    #[error("grid mismatch for '{name}': expected {expected}, found {found}")]
    GridMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Two layers were emitted under the same band name.
    #[error("duplicate band name: {0}")]
    DuplicateBandName(String),

    /// Bands expected in the final cube were never produced.
    #[error("missing band(s): {0}")]
    MissingBand(String),

    /// Nothing was handed to the consolidator.
    #[error("no layers to merge")]
    NoLayers,

    /// A requested band is not present in a stack.
    #[error("band not found: {0}")]
    BandNotFound(String),

    /// Array sizes disagree with the stack's grid or time axis.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The data source failed to resolve a load request.
    #[error("data source error: {0}")]
    Source(String),

    /// A pipeline task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeatureError {
    /// Create a Configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a ShapeMismatch error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Create a Source error.
    pub fn data_source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a GridMismatch error.
    pub fn grid_mismatch(
        name: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::GridMismatch {
            name: name.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Source(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for FeatureError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(format!("YAML error: {}", err))
    }
}

/// Result type for feature cube operations.
pub type Result<T> = std::result::Result<T, FeatureError>;
