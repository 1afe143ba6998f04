use thiserror::Error;

/// Failure of a single geometric primitive. Always recovered at the segment
/// or feature level.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Missing, empty or malformed geometry.
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    /// A buffer, intersection or projection step could not be evaluated.
    #[error("geometry computation failed: {0}")]
    Computation(String),
}

impl GeometryError {
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate(reason.into())
    }

    pub fn computation(reason: impl Into<String>) -> Self {
        Self::Computation(reason.into())
    }
}

/// Failure of a whole dataset's analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The caller cancelled the run.
    #[error("analysis cancelled")]
    Cancelled,

    /// The matcher for a dataset failed unexpectedly.
    #[error("dataset {dataset}: {reason}")]
    Dataset { dataset: String, reason: String },
}

impl AnalysisError {
    pub fn dataset(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dataset {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }
}

/// Rejected dataset configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate dataset id: {0}")]
    DuplicateId(String),

    #[error("dataset {dataset}: {field} must be a finite, non-negative distance (got {value})")]
    InvalidDistance {
        dataset: String,
        field: &'static str,
        value: f64,
    },

    #[error("dataset {dataset}: {reason}")]
    Invalid { dataset: String, reason: String },
}
