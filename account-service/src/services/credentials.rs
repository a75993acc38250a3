use chrono::Duration;
use std::sync::Arc;
use validator::ValidateEmail;

use super::{OneTimeTokenManager, ServiceError};
use crate::db::AccountRepository;
use crate::models::{Account, AccountId, NewAccount, ProfilePatch, TokenPurpose};
use crate::utils::{
    hash_password, verify_password, waste_password_check, Password, PasswordHashString,
};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 100;

/// Registration input before hashing.
#[derive(Debug, Clone)]
pub struct SignupProfile {
    pub email: String,
    pub password: Password,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
}

/// Emails compare case-insensitively; the stored form is the normalized one.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &Password) -> Result<(), ServiceError> {
    let length = password.as_str().chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    if email.is_empty() {
        return Err(ServiceError::Validation("Email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ServiceError::Validation("Email too long".to_string()));
    }
    if !email.validate_email() {
        return Err(ServiceError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

fn validate_display_field(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_patch(patch: &ProfilePatch) -> Result<(), ServiceError> {
    for (field, value) in [
        ("username", &patch.username),
        ("name", &patch.name),
        ("surname", &patch.surname),
        ("patronymic", &patch.patronymic),
        ("avatar_id", &patch.avatar_id),
    ] {
        if let Some(value) = value {
            validate_display_field(field, value)?;
        }
    }
    Ok(())
}

// Argon2 is CPU-bound; keep it off the async workers.
async fn hash_off_thread(password: Password) -> Result<PasswordHashString, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?
        .map_err(ServiceError::Internal)
}

async fn verify_off_thread(password: Password, hash: Option<String>) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &PasswordHashString::new(hash)).is_ok(),
        None => {
            waste_password_check(&password);
            false
        }
    })
    .await
    .map_err(|e| ServiceError::Internal(e.into()))
}

/// Owns account identity and password material.
#[derive(Clone)]
pub struct CredentialStore {
    accounts: Arc<dyn AccountRepository>,
    activation_ttl: Duration,
}

impl CredentialStore {
    pub fn new(accounts: Arc<dyn AccountRepository>, activation_ttl: Duration) -> Self {
        Self {
            accounts,
            activation_ttl,
        }
    }

    /// Register a new account.
    ///
    /// Unless `pre_verified`, the account starts unverified and an activation
    /// token, stored in the same transaction as the account, is returned for
    /// mailing. Pre-verified accounts get no token.
    pub async fn create(
        &self,
        profile: SignupProfile,
        pre_verified: bool,
    ) -> Result<(Account, Option<String>), ServiceError> {
        let email = normalize_email(&profile.email);
        validate_email(&email)?;
        validate_password(&profile.password)?;
        for (field, value) in [
            ("username", &profile.username),
            ("name", &profile.name),
            ("surname", &profile.surname),
            ("patronymic", &profile.patronymic),
        ] {
            validate_display_field(field, value)?;
        }

        if self.accounts.find_account_by_email(&email).await?.is_some() {
            return Err(ServiceError::DuplicateEmail);
        }

        let password_hash = hash_off_thread(profile.password).await?;

        let (activation_token, pending) = if pre_verified {
            (None, None)
        } else {
            let (value, pending) =
                OneTimeTokenManager::mint(TokenPurpose::Activate, self.activation_ttl);
            (Some(value), Some(pending))
        };

        // The unique index still decides races between concurrent signups
        let account = self
            .accounts
            .insert_account(
                NewAccount {
                    email,
                    username: profile.username,
                    name: profile.name,
                    surname: profile.surname,
                    patronymic: profile.patronymic,
                    password_hash: password_hash.into_string(),
                    is_verified: pre_verified,
                    is_active: pre_verified,
                },
                pending,
            )
            .await?;

        tracing::info!(account_id = account.id, pre_verified, "Account created");
        Ok((account, activation_token))
    }

    /// Check an email/password pair.
    ///
    /// Unknown, deactivated and mismatching accounts are indistinguishable to
    /// the caller, and each costs one full hash verification.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<Account, ServiceError> {
        let account = self
            .accounts
            .find_account_by_email(&normalize_email(email))
            .await?
            .filter(|a| !a.is_deactivated());

        let matches = verify_off_thread(
            password.clone(),
            account.as_ref().map(|a| a.password_hash.clone()),
        )
        .await?;

        match account {
            Some(account) if matches => Ok(account),
            _ => Err(ServiceError::InvalidCredentials),
        }
    }

    pub async fn get_by_id(&self, id: AccountId) -> Result<Account, ServiceError> {
        self.accounts
            .find_account_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        self.accounts
            .find_account_by_email(&normalize_email(email))
            .await
    }

    pub async fn update(&self, id: AccountId, patch: ProfilePatch) -> Result<Account, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation("Nothing to update".to_string()));
        }
        validate_patch(&patch)?;

        let current = self.get_by_id(id).await?;
        if current.is_deactivated() {
            return Err(ServiceError::NotFound);
        }

        self.accounts
            .update_profile(id, &patch)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Validate and hash a replacement password. Storing it is left to the
    /// caller, together with spending the reset token.
    pub async fn hash_new_password(&self, password: Password) -> Result<PasswordHashString, ServiceError> {
        validate_password(&password)?;
        hash_off_thread(password).await
    }

    /// Terminal. Refresh and one-time tokens are purged with the state change.
    pub async fn deactivate(&self, id: AccountId) -> Result<(), ServiceError> {
        if self.accounts.deactivate_account(id).await? {
            tracing::info!(account_id = id, "Account deactivated");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.accounts.health_check().await
    }
}
