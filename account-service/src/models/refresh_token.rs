use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::AccountId;
use crate::utils::hash_token;

/// The single live refresh token of an account, stored as a SHA-256 digest.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub owner_id: AccountId,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(owner_id: AccountId, token: &str) -> Self {
        Self {
            owner_id,
            token_hash: hash_token(token),
            issued_at: Utc::now(),
        }
    }
}
