use chrono::Duration;
use std::sync::Arc;

use super::ServiceError;
use crate::db::OneTimeTokenRepository;
use crate::models::{AccountId, PendingToken, Redeemed, TokenPurpose, TokenRedemption};
use crate::utils::{generate_random_token, hash_token};

/// Single-use activation and password-reset tokens.
///
/// Values are 256-bit random strings handed out once; the store only sees
/// their digest. Issuing a token supersedes any earlier one of the same
/// purpose for the same account.
#[derive(Clone)]
pub struct OneTimeTokenManager {
    repo: Arc<dyn OneTimeTokenRepository>,
}

impl OneTimeTokenManager {
    pub fn new(repo: Arc<dyn OneTimeTokenRepository>) -> Self {
        Self { repo }
    }

    /// Generate a value and the row that will represent it, for a caller
    /// that stores the row together with its owner.
    pub fn mint(purpose: TokenPurpose, ttl: Duration) -> (String, PendingToken) {
        let value = generate_random_token();
        let pending = PendingToken::new(purpose, &value, ttl);
        (value, pending)
    }

    pub async fn issue(
        &self,
        account_id: AccountId,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let (value, pending) = Self::mint(purpose, ttl);
        self.repo
            .replace_one_time_token(&pending.for_owner(account_id))
            .await?;

        tracing::debug!(account_id, purpose = %purpose, "One-time token issued");
        Ok(value)
    }

    /// Spend `token` and apply `redemption` to its owner as one unit.
    ///
    /// An expired value is removed on its first presentation. If the store
    /// fails, neither the token nor the account changes.
    pub async fn consume(
        &self,
        token: &str,
        redemption: TokenRedemption<'_>,
    ) -> Result<AccountId, ServiceError> {
        let purpose = redemption.purpose();
        match self
            .repo
            .redeem_one_time_token(&hash_token(token), redemption)
            .await?
        {
            Redeemed::Applied(account_id) => Ok(account_id),
            Redeemed::Expired(account_id) => {
                tracing::info!(account_id, purpose = %purpose, "Expired one-time token presented");
                Err(ServiceError::TokenExpired)
            }
            Redeemed::NotFound => Err(ServiceError::TokenNotFound),
        }
    }
}
