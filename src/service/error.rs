//! Service error taxonomy.
//!
//! Callers pattern-match on the rendered messages (notably "Too many models"
//! and "More than 1 param finder") to distinguish capacity failures from
//! everything else, so the `Display` strings here are part of the contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Model pool is at its concurrency ceiling.
    #[error("Too many models running")]
    TooManyModels,

    /// A model with this id is already in the pool.
    #[error("Duplicate model ID: {0}")]
    DuplicateModelId(String),

    /// Operation referenced a model id not present in the pool.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A param finder is already running for this metric.
    #[error("More than 1 param finder running for metric {0}")]
    ParamFinderRunning(String),

    /// Operation referenced a metric id with no live param finder.
    #[error("Param finder not found: {0}")]
    ParamFinderNotFound(String),

    /// IPC envelope carried an unrecognized command string.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// IPC envelope was missing params, or they had the wrong shape.
    #[error("Invalid command params: {0}")]
    InvalidParams(String),

    /// A record could not be encoded as a JSON line.
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}
