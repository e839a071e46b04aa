//! Error types for informe

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(
        "Key mismatch between references and hypotheses: missing hypotheses for {missing_in_hypotheses:?}, missing references for {missing_in_references:?}"
    )]
    KeyMismatch {
        missing_in_hypotheses: Vec<String>,
        missing_in_references: Vec<String>,
    },

    #[error("Scorer {scorer} failed: {reason}")]
    ScorerFailure { scorer: String, reason: String },

    #[error("Checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    #[error("Tracking sink failure: {0}")]
    TrackingSinkFailure(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Build a scorer failure for the named sub-scorer
    pub fn scorer(scorer: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ScorerFailure {
            scorer: scorer.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
