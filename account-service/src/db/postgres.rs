//! PostgreSQL backend.
//!
//! Every statement error is logged with its table and operation, then
//! surfaced as `ServiceError::Persistence`. Nothing is retried here.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use super::repository::{AccountRepository, OneTimeTokenRepository, RefreshTokenRepository};
use crate::models::{
    Account, AccountId, NewAccount, OneTimeToken, PendingToken, ProfilePatch, Redeemed,
    RefreshTokenRecord, TokenRedemption,
};
use crate::services::ServiceError;

/// Log a failed statement and wrap it.
fn store_error(table: &'static str, operation: &'static str) -> impl FnOnce(sqlx::Error) -> ServiceError {
    move |e| {
        tracing::error!(table, operation, error = %e, "Store operation failed");
        ServiceError::Persistence(anyhow::anyhow!("{} {}: {}", operation, table, e))
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        token: Option<PendingToken>,
    ) -> Result<Account, ServiceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("accounts", "begin"))?;

        let row = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (email, username, name, surname, patronymic, password_hash, is_verified, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.name)
        .bind(&account.surname)
        .bind(&account.patronymic)
        .bind(&account.password_hash)
        .bind(account.is_verified)
        .bind(account.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let unique_violation = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if unique_violation {
                ServiceError::DuplicateEmail
            } else {
                store_error("accounts", "insert")(e)
            }
        })?;

        if let Some(token) = token {
            let token = token.for_owner(row.id);
            sqlx::query(
                r#"
                INSERT INTO one_time_tokens (token_hash, owner_id, purpose, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&token.token_hash)
            .bind(token.owner_id)
            .bind(token.purpose.as_str())
            .bind(token.expires_at)
            .bind(token.created_at)
            .execute(&mut *tx)
            .await
            .map_err(store_error("one_time_tokens", "insert"))?;
        }

        tx.commit()
            .await
            .map_err(store_error("accounts", "commit"))?;

        Ok(row)
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("accounts", "select_by_id"))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("accounts", "select_by_email"))
    }

    async fn update_profile(
        &self,
        id: AccountId,
        patch: &ProfilePatch,
    ) -> Result<Option<Account>, ServiceError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET
                username   = COALESCE($2, username),
                name       = COALESCE($3, name),
                surname    = COALESCE($4, surname),
                patronymic = COALESCE($5, patronymic),
                avatar_id  = COALESCE($6, avatar_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.username)
        .bind(&patch.name)
        .bind(&patch.surname)
        .bind(&patch.patronymic)
        .bind(&patch.avatar_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("accounts", "update_profile"))
    }

    async fn deactivate_account(&self, id: AccountId) -> Result<bool, ServiceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("accounts", "begin"))?;

        let updated = sqlx::query(
            r#"
            UPDATE accounts SET is_active = FALSE, deactivated_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deactivated_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(store_error("accounts", "deactivate"))?
        .rows_affected();

        sqlx::query("DELETE FROM refresh_tokens WHERE owner_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error("refresh_tokens", "delete_for_owner"))?;

        sqlx::query("DELETE FROM one_time_tokens WHERE owner_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error("one_time_tokens", "delete_for_owner"))?;

        tx.commit()
            .await
            .map_err(store_error("accounts", "commit"))?;

        Ok(updated == 1)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error("accounts", "health_check"))?;
        Ok(())
    }
}

#[async_trait]
impl OneTimeTokenRepository for PgStore {
    async fn replace_one_time_token(&self, token: &OneTimeToken) -> Result<(), ServiceError> {
        // The (owner_id, purpose) unique index turns the upsert into an
        // atomic delete-then-insert.
        sqlx::query(
            r#"
            INSERT INTO one_time_tokens (token_hash, owner_id, purpose, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (owner_id, purpose) DO UPDATE SET
                token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.owner_id)
        .bind(token.purpose.as_str())
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error("one_time_tokens", "replace"))?;
        Ok(())
    }

    async fn redeem_one_time_token(
        &self,
        token_hash: &str,
        redemption: TokenRedemption<'_>,
    ) -> Result<Redeemed, ServiceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("one_time_tokens", "begin"))?;

        let taken = sqlx::query_as::<_, OneTimeToken>(
            r#"
            DELETE FROM one_time_tokens
            WHERE token_hash = $1 AND purpose = $2
            RETURNING token_hash, owner_id, purpose, expires_at, created_at
            "#,
        )
        .bind(token_hash)
        .bind(redemption.purpose().as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error("one_time_tokens", "take"))?;

        let Some(token) = taken else {
            return Ok(Redeemed::NotFound);
        };

        if token.is_expired() {
            tx.commit()
                .await
                .map_err(store_error("one_time_tokens", "commit"))?;
            return Ok(Redeemed::Expired(token.owner_id));
        }

        let updated = match redemption {
            TokenRedemption::Activate => sqlx::query(
                r#"
                UPDATE accounts SET is_verified = TRUE, is_active = TRUE, updated_at = NOW()
                WHERE id = $1 AND deactivated_at IS NULL
                "#,
            )
            .bind(token.owner_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error("accounts", "activate"))?
            .rows_affected(),
            TokenRedemption::ResetPassword { password_hash } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE accounts SET password_hash = $2, updated_at = NOW()
                    WHERE id = $1 AND deactivated_at IS NULL
                    "#,
                )
                .bind(token.owner_id)
                .bind(password_hash)
                .execute(&mut *tx)
                .await
                .map_err(store_error("accounts", "update_password"))?
                .rows_affected();

                sqlx::query("DELETE FROM refresh_tokens WHERE owner_id = $1")
                    .bind(token.owner_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error("refresh_tokens", "delete_for_owner"))?;
                updated
            }
        };

        tx.commit()
            .await
            .map_err(store_error("one_time_tokens", "commit"))?;

        if updated == 1 {
            Ok(Redeemed::Applied(token.owner_id))
        } else {
            Ok(Redeemed::NotFound)
        }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn replace_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (owner_id, token_hash, issued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id) DO UPDATE SET
                token_hash = EXCLUDED.token_hash,
                issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(record.owner_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .execute(&self.pool)
        .await
        .map_err(store_error("refresh_tokens", "replace"))?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        expected_hash: &str,
        record: &RefreshTokenRecord,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET token_hash = $3, issued_at = $4
            WHERE owner_id = $1 AND token_hash = $2
            "#,
        )
        .bind(record.owner_id)
        .bind(expected_hash)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .execute(&self.pool)
        .await
        .map_err(store_error("refresh_tokens", "swap"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_refresh_token_owner(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccountId>, ServiceError> {
        sqlx::query_scalar::<_, AccountId>("SELECT owner_id FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("refresh_tokens", "select_by_hash"))
    }
}
