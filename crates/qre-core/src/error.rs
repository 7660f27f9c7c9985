use thiserror::Error;

/// Error taxonomy shared by every subsystem (C1-C9).
///
/// Variants map onto the error kinds described for the engine: malformed
/// input never gets silently coerced, missing resources are surfaced
/// verbatim, and per-trial/per-module failures are represented separately
/// from process-fatal conditions so callers can decide how to recover.
#[derive(Error, Debug)]
pub enum QreError {
    #[error("input validation failed: {0}")]
    InputValidation(String),

    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type QreResult<T> = Result<T, QreError>;
