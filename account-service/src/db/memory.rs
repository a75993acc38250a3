//! In-process backend for tests and local runs without PostgreSQL.
//!
//! All tables sit behind one mutex, so every repository call is atomic in
//! the same way a single transaction is.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::repository::{AccountRepository, OneTimeTokenRepository, RefreshTokenRepository};
use crate::models::{
    Account, AccountId, NewAccount, OneTimeToken, PendingToken, ProfilePatch, Redeemed,
    RefreshTokenRecord, TokenRedemption,
};
use crate::services::ServiceError;

#[derive(Default)]
struct Tables {
    next_id: AccountId,
    accounts: BTreeMap<AccountId, Account>,
    /// Keyed by token digest
    one_time_tokens: HashMap<String, OneTimeToken>,
    /// Keyed by owner: one row per account
    refresh_tokens: HashMap<AccountId, RefreshTokenRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    /// Operation whose next call fails
    fail_next: Mutex<Option<&'static str>>,
    /// Operation whose next call waits before touching any table
    stall_next: Mutex<Option<(&'static str, Duration)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only the next call of `operation` fail.
    pub fn fail_next(&self, operation: &'static str) {
        if let Ok(mut next) = self.fail_next.lock() {
            *next = Some(operation);
        }
    }

    /// Delay the next call of `operation` by `delay` before it writes anything.
    pub fn stall_next(&self, operation: &'static str, delay: Duration) {
        if let Ok(mut next) = self.stall_next.lock() {
            *next = Some((operation, delay));
        }
    }

    async fn enter(
        &self,
        table: &'static str,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, Tables>, ServiceError> {
        let delay = match self.stall_next.lock() {
            Ok(mut next) => match *next {
                Some((op, delay)) if op == operation => {
                    *next = None;
                    Some(delay)
                }
                _ => None,
            },
            Err(_) => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock(table, operation)
    }

    fn lock(&self, table: &'static str, operation: &'static str) -> Result<MutexGuard<'_, Tables>, ServiceError> {
        let injected = match self.fail_next.lock() {
            Ok(mut next) if *next == Some(operation) => {
                *next = None;
                true
            }
            _ => false,
        };
        if injected || self.unavailable.load(Ordering::SeqCst) {
            tracing::error!(table, operation, "Store unavailable");
            return Err(ServiceError::Persistence(anyhow::anyhow!(
                "{} {}: store unavailable",
                operation,
                table
            )));
        }
        self.tables.lock().map_err(|e| {
            tracing::error!(table, operation, "Memory store mutex poisoned");
            ServiceError::Persistence(anyhow::anyhow!("Memory store mutex poisoned: {}", e))
        })
    }

    /// Number of stored one-time tokens, for assertions in tests.
    pub fn one_time_token_count(&self, owner_id: AccountId) -> usize {
        self.tables
            .lock()
            .map(|t| {
                t.one_time_tokens
                    .values()
                    .filter(|token| token.owner_id == owner_id)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of stored refresh tokens, for assertions in tests.
    pub fn refresh_token_count(&self, owner_id: AccountId) -> usize {
        self.tables
            .lock()
            .map(|t| usize::from(t.refresh_tokens.contains_key(&owner_id)))
            .unwrap_or(0)
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        token: Option<PendingToken>,
    ) -> Result<Account, ServiceError> {
        let mut tables = self.enter("accounts", "insert").await?;

        let taken = tables
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email));
        if taken {
            return Err(ServiceError::DuplicateEmail);
        }

        tables.next_id += 1;
        let now = Utc::now();
        let row = Account {
            id: tables.next_id,
            email: account.email,
            username: account.username,
            name: account.name,
            surname: account.surname,
            patronymic: account.patronymic,
            password_hash: account.password_hash,
            is_verified: account.is_verified,
            is_active: account.is_active,
            avatar_id: None,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(row.id, row.clone());
        if let Some(token) = token {
            let token = token.for_owner(row.id);
            tables
                .one_time_tokens
                .insert(token.token_hash.clone(), token);
        }
        Ok(row)
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError> {
        let tables = self.enter("accounts", "select_by_id").await?;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        let tables = self.enter("accounts", "select_by_email").await?;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_profile(
        &self,
        id: AccountId,
        patch: &ProfilePatch,
    ) -> Result<Option<Account>, ServiceError> {
        let mut tables = self.enter("accounts", "update_profile").await?;
        Ok(tables.accounts.get_mut(&id).map(|account| {
            patch.apply(account);
            account.updated_at = Utc::now();
            account.clone()
        }))
    }

    async fn deactivate_account(&self, id: AccountId) -> Result<bool, ServiceError> {
        let mut tables = self.enter("accounts", "deactivate").await?;
        let updated = match tables.accounts.get_mut(&id) {
            Some(account) if account.deactivated_at.is_none() => {
                let now = Utc::now();
                account.is_active = false;
                account.deactivated_at = Some(now);
                account.updated_at = now;
                true
            }
            _ => false,
        };
        tables.refresh_tokens.remove(&id);
        tables.one_time_tokens.retain(|_, token| token.owner_id != id);
        Ok(updated)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.enter("accounts", "health_check").await.map(|_| ())
    }
}

#[async_trait]
impl OneTimeTokenRepository for MemoryStore {
    async fn replace_one_time_token(&self, token: &OneTimeToken) -> Result<(), ServiceError> {
        let mut tables = self.enter("one_time_tokens", "replace").await?;
        tables
            .one_time_tokens
            .retain(|_, t| !(t.owner_id == token.owner_id && t.purpose == token.purpose));
        tables
            .one_time_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn redeem_one_time_token(
        &self,
        token_hash: &str,
        redemption: TokenRedemption<'_>,
    ) -> Result<Redeemed, ServiceError> {
        let mut tables = self.enter("one_time_tokens", "redeem").await?;

        let owner_id = match tables.one_time_tokens.get(token_hash) {
            Some(token) if token.purpose == redemption.purpose() => {
                if token.is_expired() {
                    let owner_id = token.owner_id;
                    tables.one_time_tokens.remove(token_hash);
                    return Ok(Redeemed::Expired(owner_id));
                }
                token.owner_id
            }
            _ => return Ok(Redeemed::NotFound),
        };
        tables.one_time_tokens.remove(token_hash);

        let applied = match tables.accounts.get_mut(&owner_id) {
            Some(account) if account.deactivated_at.is_none() => {
                match redemption {
                    TokenRedemption::Activate => {
                        account.is_verified = true;
                        account.is_active = true;
                    }
                    TokenRedemption::ResetPassword { password_hash } => {
                        account.password_hash = password_hash.to_string();
                    }
                }
                account.updated_at = Utc::now();
                true
            }
            _ => false,
        };
        if !applied {
            return Ok(Redeemed::NotFound);
        }
        if let TokenRedemption::ResetPassword { .. } = redemption {
            tables.refresh_tokens.remove(&owner_id);
        }
        Ok(Redeemed::Applied(owner_id))
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn replace_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError> {
        let mut tables = self.enter("refresh_tokens", "replace").await?;
        tables.refresh_tokens.insert(record.owner_id, record.clone());
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        expected_hash: &str,
        record: &RefreshTokenRecord,
    ) -> Result<bool, ServiceError> {
        let mut tables = self.enter("refresh_tokens", "swap").await?;
        match tables.refresh_tokens.get_mut(&record.owner_id) {
            Some(current) if current.token_hash == expected_hash => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_refresh_token_owner(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccountId>, ServiceError> {
        let tables = self.enter("refresh_tokens", "select_by_hash").await?;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .map(|r| r.owner_id))
    }
}
