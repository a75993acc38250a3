//! Account model - the identity record behind every credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

pub type AccountId = i64;

/// Lifecycle state derived from the account flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Unverified,
    Active,
    Deactivated,
}

/// Account entity.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub avatar_id: Option<String>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Deactivation is terminal and wins over every other flag.
    pub fn state(&self) -> AccountState {
        if self.deactivated_at.is_some() {
            AccountState::Deactivated
        } else if !self.is_verified {
            AccountState::Unverified
        } else {
            AccountState::Active
        }
    }

    pub fn is_deactivated(&self) -> bool {
        self.state() == AccountState::Deactivated
    }

    /// Public view without the credential hash.
    pub fn profile(&self) -> AccountProfile {
        AccountProfile::from(self.clone())
    }
}

/// Values for a new account row. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub is_active: bool,
}

/// Display-field update. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub patronymic: Option<String>,
    pub avatar_id: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.name.is_none()
            && self.surname.is_none()
            && self.patronymic.is_none()
            && self.avatar_id.is_none()
    }

    pub fn apply(&self, account: &mut Account) {
        if let Some(username) = &self.username {
            account.username = username.clone();
        }
        if let Some(name) = &self.name {
            account.name = name.clone();
        }
        if let Some(surname) = &self.surname {
            account.surname = surname.clone();
        }
        if let Some(patronymic) = &self.patronymic {
            account.patronymic = patronymic.clone();
        }
        if let Some(avatar_id) = &self.avatar_id {
            account.avatar_id = Some(avatar_id.clone());
        }
    }
}

/// Account response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[schema(example = 1)]
    pub id: AccountId,
    #[schema(example = "user@example.com")]
    pub email: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub avatar_id: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub state: AccountState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountProfile {
    fn from(a: Account) -> Self {
        let state = a.state();
        Self {
            id: a.id,
            email: a.email,
            username: a.username,
            name: a.name,
            surname: a.surname,
            patronymic: a.patronymic,
            avatar_id: a.avatar_id,
            is_verified: a.is_verified,
            is_active: a.is_active,
            state,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}
