use thiserror::Error;

/// Domain error taxonomy. Configuration and invalid-transition errors are
/// fatal to the single call that raised them, never to a whole batch run;
/// database errors are caught per record at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
