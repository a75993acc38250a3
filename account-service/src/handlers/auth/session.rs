use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{AuthInfoResponse, RefreshRequest, SigninRequest, TokenResponse},
    middleware::AuthUser,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Signin successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account not verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn signin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SigninRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state
        .auth_service
        .signin(&req.email, &Password::new(req.password))
        .await?;
    Ok((StatusCode::OK, Json(TokenResponse::from(pair))))
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token stops working once this call succeeds.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenResponse),
        (status = 401, description = "Refresh token unknown, superseded or expired", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.auth_service.refresh(&req.token).await?;
    Ok((StatusCode::OK, Json(TokenResponse::from(pair))))
}

/// Identity behind the presented access token
#[utoipa::path(
    get,
    path = "/api/auth/info",
    responses(
        (status = 200, description = "Token is valid", body = AuthInfoResponse),
        (status = 401, description = "Missing, expired or invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn info(user: AuthUser) -> Json<AuthInfoResponse> {
    Json(AuthInfoResponse {
        id: user.0.account_id,
        email: user.0.email,
    })
}
