use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{ChangePasswordRequest, PasswordResetRequest},
        MessageResponse,
    },
    utils::{Password, ValidatedJson},
    AppState,
};

/// Mail a password reset link
#[utoipa::path(
    post,
    path = "/api/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 401, description = "Unknown account", body = ErrorResponse),
        (status = 403, description = "Account not verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error or mail delivery failure", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.request_password_reset(&req.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password reset link sent")),
    ))
}

/// Set a new password with a reset token
///
/// Every open session of the account ends.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid password", body = ErrorResponse),
        (status = 401, description = "Token unknown, used or expired", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn change_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .change_password(&req.hash, Password::new(req.password))
        .await?;
    Ok((StatusCode::OK, Json(MessageResponse::new("Password changed"))))
}
