use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::user::UpdateProfileRequest, middleware::AuthUser, models::AccountProfile,
    utils::ValidatedJson, AppState,
};

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current account", body = AccountProfile),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountProfile>, AppError> {
    let account = state.auth_service.profile(user.0.account_id).await?;
    Ok(Json(account.profile()))
}

/// Update display fields of the caller's profile
#[utoipa::path(
    patch,
    path = "/api/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountProfile),
        (status = 400, description = "Nothing to update", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<AccountProfile>, AppError> {
    let account = state
        .auth_service
        .update_profile(user.0.account_id, req.into())
        .await?;
    Ok(Json(account.profile()))
}

/// Deactivate the caller's account
///
/// Terminal: the account can no longer sign in and all its tokens are revoked.
#[utoipa::path(
    delete,
    path = "/api/users/me",
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.deactivate(user.0.account_id).await?;
    tracing::info!(account_id = user.0.account_id, "Account deactivated by owner");
    Ok(StatusCode::NO_CONTENT)
}
