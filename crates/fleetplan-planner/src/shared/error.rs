use fleetplan_core::{ErrorResponse, LinkResolutionErrors, PlanError};
use thiserror::Error;

/// Planner specific errors
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<LinkResolutionErrors> for PlannerError {
    fn from(err: LinkResolutionErrors) -> Self {
        PlannerError::Plan(PlanError::LinkResolution(err))
    }
}

impl From<std::io::Error> for PlannerError {
    fn from(err: std::io::Error) -> Self {
        PlannerError::InvalidInput(err.to_string())
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::InvalidInput(err.to_string())
    }
}

impl From<PlannerError> for ErrorResponse {
    fn from(err: PlannerError) -> Self {
        let (code, message) = match err {
            PlannerError::Plan(plan_err) => return plan_err.into(),
            PlannerError::StorageError(msg) => ("STORAGE_ERROR", msg),
            PlannerError::ConfigError(msg) => ("CONFIGURATION_ERROR", msg),
            PlannerError::InvalidInput(msg) => ("INVALID_INPUT", msg),
        };

        ErrorResponse::new(code, message)
    }
}

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
