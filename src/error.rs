// src/error.rs
//! Error taxonomy for the analysis service.
//!
//! Only [`AnalysisError`] ever reaches a caller. Load and inference errors are
//! recovered inside the pipeline by degrading to the lightweight classifier.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing or blank review text. Never retried.
    #[error("Review text is required")]
    Validation,
    /// Failure outside the recoverable paths (task panic, unreadable body).
    #[error("{0}")]
    Unrecoverable(String),
}

/// Why a persisted artifact could not be turned into a usable model/tokenizer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed artifact: {0}")]
    Format(#[from] serde_json::Error),
    #[error("unknown type tag {module}.{class_name}")]
    UnknownTypeTag { module: String, class_name: String },
    #[error("incompatible artifact: {0}")]
    Incompatible(String),
    #[error("shape mismatch in layer `{layer}`: {detail}")]
    Shape { layer: String, detail: String },
    /// The strategy has nothing to do for this artifact; not a diagnosis.
    #[error("strategy not applicable: {0}")]
    NotApplicable(String),
}

/// Failure while encoding a review or running the model on it.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("token index {index} outside embedding table of {vocab} rows")]
    TokenOutOfRange { index: usize, vocab: usize },
    #[error("model produced no output")]
    EmptyOutput,
    #[error("model produced a non-finite score: {0}")]
    NonFinite(f32),
    #[error("shape mismatch: {0}")]
    Shape(String),
}

/// A model or tokenizer that stays unavailable for the rest of the process.
#[derive(Debug, Clone, Error)]
#[error("{artifact} unavailable: {reason}")]
pub struct ArtifactUnavailable {
    pub artifact: &'static str,
    pub reason: String,
}
