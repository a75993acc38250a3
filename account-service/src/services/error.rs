use service_core::error::AppError;
use thiserror::Error;

/// Failure kinds of the account core. Backend causes are carried for logs
/// only; the HTTP mapping below never exposes them.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not verified")]
    NotVerified,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Invalid token signature")]
    TokenInvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Account not found")]
    NotFound,

    #[error("Persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("Email error: {0}")]
    Mail(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::DuplicateEmail => "duplicate_email",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::NotVerified => "not_verified",
            ServiceError::TokenMalformed => "token_malformed",
            ServiceError::TokenInvalidSignature => "token_invalid_signature",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::TokenNotFound => "token_not_found",
            ServiceError::NotFound => "not_found",
            ServiceError::Persistence(_) => "persistence",
            ServiceError::Mail(_) => "mail",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::DuplicateEmail => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::NotVerified => AppError::Forbidden(anyhow::anyhow!(
                "Account not verified. Check your inbox for the activation link."
            )),
            ServiceError::TokenMalformed => {
                AppError::Unauthorized(anyhow::anyhow!("Malformed token"))
            }
            ServiceError::TokenInvalidSignature => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid token signature"))
            }
            ServiceError::TokenExpired => AppError::Unauthorized(anyhow::anyhow!("Token expired")),
            ServiceError::TokenNotFound => {
                AppError::Unauthorized(anyhow::anyhow!("Token not found"))
            }
            ServiceError::NotFound => AppError::NotFound(anyhow::anyhow!("Account not found")),
            ServiceError::Persistence(e) => AppError::DatabaseError(e),
            ServiceError::Mail(e) => AppError::EmailError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
