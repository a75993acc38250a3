use async_trait::async_trait;

use crate::models::{
    Account, AccountId, NewAccount, OneTimeToken, PendingToken, ProfilePatch, Redeemed,
    RefreshTokenRecord, TokenRedemption,
};
use crate::services::ServiceError;

/// Account rows.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert the account and, when given, its first one-time token in one
    /// transaction. Fails with `DuplicateEmail` when the (lowercased) email
    /// is taken.
    async fn insert_account(
        &self,
        account: NewAccount,
        token: Option<PendingToken>,
    ) -> Result<Account, ServiceError>;

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError>;

    /// Display fields only. `None` when the account does not exist.
    async fn update_profile(
        &self,
        id: AccountId,
        patch: &ProfilePatch,
    ) -> Result<Option<Account>, ServiceError>;

    /// Clear `is_active`, stamp `deactivated_at` and delete every refresh and
    /// one-time token of the account, atomically. `false` when there was no
    /// account to deactivate.
    async fn deactivate_account(&self, id: AccountId) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// One-time activation and password-reset tokens.
#[async_trait]
pub trait OneTimeTokenRepository: Send + Sync {
    /// Atomically drop any token of the same (owner, purpose) and store this one.
    async fn replace_one_time_token(&self, token: &OneTimeToken) -> Result<(), ServiceError>;

    /// In one transaction: remove the token with this digest and the
    /// redemption's purpose and, if it was still live, apply the account
    /// write. A failure rolls everything back and leaves the token usable.
    async fn redeem_one_time_token(
        &self,
        token_hash: &str,
        redemption: TokenRedemption<'_>,
    ) -> Result<Redeemed, ServiceError>;
}

/// The per-account live refresh token.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Atomically replace whatever row the owner has with `record`.
    async fn replace_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError>;

    /// Replace the owner's row only if it still holds `expected_hash`.
    /// `false` means another rotation got there first.
    async fn swap_refresh_token(
        &self,
        expected_hash: &str,
        record: &RefreshTokenRecord,
    ) -> Result<bool, ServiceError>;

    async fn find_refresh_token_owner(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccountId>, ServiceError>;
}

/// A backend implementing every repository.
pub trait Store: AccountRepository + OneTimeTokenRepository + RefreshTokenRepository {}

impl<T> Store for T where T: AccountRepository + OneTimeTokenRepository + RefreshTokenRepository {}
