use std::sync::Arc;

use super::ServiceError;
use crate::db::RefreshTokenRepository;
use crate::models::{AccountId, RefreshTokenRecord};
use crate::utils::hash_token;

/// Tracks the one refresh token each account may currently redeem.
#[derive(Clone)]
pub struct RefreshTokenRegistry {
    repo: Arc<dyn RefreshTokenRepository>,
}

impl RefreshTokenRegistry {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>) -> Self {
        Self { repo }
    }

    /// Make `new_token` the only live refresh token of the account.
    pub async fn rotate(&self, account_id: AccountId, new_token: &str) -> Result<(), ServiceError> {
        self.repo
            .replace_refresh_token(&RefreshTokenRecord::new(account_id, new_token))
            .await
    }

    /// Replace `presented` with `new_token`, but only if `presented` is still
    /// the live token. Of two concurrent exchanges of the same token exactly
    /// one succeeds.
    pub async fn exchange(
        &self,
        account_id: AccountId,
        presented: &str,
        new_token: &str,
    ) -> Result<(), ServiceError> {
        let swapped = self
            .repo
            .swap_refresh_token(
                &hash_token(presented),
                &RefreshTokenRecord::new(account_id, new_token),
            )
            .await?;

        if swapped {
            Ok(())
        } else {
            Err(ServiceError::TokenNotFound)
        }
    }

    /// Owner of `token` if it is the currently registered one.
    pub async fn is_active(&self, token: &str) -> Result<AccountId, ServiceError> {
        self.repo
            .find_refresh_token_owner(&hash_token(token))
            .await?
            .ok_or(ServiceError::TokenNotFound)
    }
}
