use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::auth::{SignupRequest, SignupResponse},
    utils::ValidatedJson,
    AppState,
};

/// Register a new account
///
/// The account stays unverified until the mailed activation link is opened.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, activation mail sent", body = SignupResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error or mail delivery failure", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.auth_service.signup(req.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            id,
            message: "Signup successful. Check your email to activate the account.".to_string(),
        }),
    ))
}

/// Activate an account from the mailed link
///
/// Redirects to the web client's signin page.
#[utoipa::path(
    get,
    path = "/api/auth/activate/{token}",
    params(
        ("token" = String, Path, description = "Activation token from the mail")
    ),
    responses(
        (status = 307, description = "Activated, redirect to signin"),
        (status = 401, description = "Token unknown, used or expired", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.activate(&token).await?;

    let target = format!(
        "{}/signin",
        state.config.links.frontend_url.trim_end_matches('/')
    );
    Ok(Redirect::temporary(&target))
}
