use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::AccountId;
use crate::services::{SignupProfile, TokenPair};
use crate::utils::Password;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SigninRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Secret123")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    #[schema(example = "Secret123", min_length = 8)]
    pub password: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    #[schema(example = "ivan")]
    pub username: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    #[schema(example = "Ivan")]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    #[schema(example = "Petrov")]
    pub surname: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    pub patronymic: String,
}

impl From<SignupRequest> for SignupProfile {
    fn from(req: SignupRequest) -> Self {
        Self {
            email: req.email,
            password: Password::new(req.password),
            username: req.username,
            name: req.name,
            surname: req.surname,
            patronymic: req.patronymic,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignupResponse {
    #[schema(example = 1)]
    pub id: AccountId,
    #[schema(example = "Signup successful. Check your email to activate the account.")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "eyJhbGciOiJIUzUxMiIs...")]
    pub token: String,
}

/// Token pair as the web client expects it.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[schema(example = "eyJhbGciOiJIUzUxMiIs...")]
    pub token: String,
    #[schema(example = "eyJhbGciOiJIUzUxMiIs...")]
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    /// Reset token from the mailed link
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "3f2a9c...")]
    pub hash: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    #[schema(example = "NewSecret456", min_length = 8)]
    pub password: String,
}

/// Identity carried by the presented access token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthInfoResponse {
    #[schema(example = 1)]
    pub id: AccountId,
    #[schema(example = "user@example.com")]
    pub email: String,
}
