use sea_orm::error::DbErr;

use crate::gateway::GatewayError;
use crate::mail::MailError;
use crate::money::MoneyError;

/// Unified error type for all core service operations.
///
/// The transport layer (out of scope for this crate) maps these onto
/// whatever protocol it speaks; the distinctions that matter are kept as
/// separate variants: `Unauthorized` (unknown caller) vs `Forbidden`
/// (not yours), `Conflict` (state guards), `ServiceUnavailable`
/// (collaborator not configured) vs `ExternalServiceError` (collaborator
/// call failed).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => {
                ServiceError::ServiceUnavailable("payment gateway not configured".to_string())
            }
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

impl From<MailError> for ServiceError {
    fn from(err: MailError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

impl From<MoneyError> for ServiceError {
    fn from(err: MoneyError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}
