use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AccountId;
use crate::utils::hash_token;

/// What a one-time token proves possession of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPurpose {
    Activate,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Activate => "ACTIVATE",
            TokenPurpose::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid token purpose: {0}")]
pub struct InvalidPurpose(String);

impl std::str::FromStr for TokenPurpose {
    type Err = InvalidPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVATE" => Ok(TokenPurpose::Activate),
            "PASSWORD_RESET" => Ok(TokenPurpose::PasswordReset),
            _ => Err(InvalidPurpose(s.to_string())),
        }
    }
}

/// Stored one-time token. Only the SHA-256 digest of the value is kept.
#[derive(Debug, Clone, FromRow)]
pub struct OneTimeToken {
    pub token_hash: String,
    pub owner_id: AccountId,
    #[sqlx(try_from = "String")]
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<String> for TokenPurpose {
    type Error = InvalidPurpose;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl OneTimeToken {
    pub fn new(owner_id: AccountId, purpose: TokenPurpose, token: &str, ttl: Duration) -> Self {
        PendingToken::new(purpose, token, ttl).for_owner(owner_id)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// A token row that does not have an owner yet, for accounts written in the
/// same transaction.
#[derive(Debug, Clone)]
pub struct PendingToken {
    pub token_hash: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingToken {
    pub fn new(purpose: TokenPurpose, token: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_hash: hash_token(token),
            purpose,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn for_owner(self, owner_id: AccountId) -> OneTimeToken {
        OneTimeToken {
            token_hash: self.token_hash,
            owner_id,
            purpose: self.purpose,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Account write committed together with spending a one-time token.
#[derive(Debug, Clone, Copy)]
pub enum TokenRedemption<'a> {
    /// Set `is_verified` and `is_active`.
    Activate,
    /// Store a new credential hash and drop the account's refresh token.
    ResetPassword { password_hash: &'a str },
}

impl TokenRedemption<'_> {
    pub fn purpose(&self) -> TokenPurpose {
        match self {
            TokenRedemption::Activate => TokenPurpose::Activate,
            TokenRedemption::ResetPassword { .. } => TokenPurpose::PasswordReset,
        }
    }
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redeemed {
    /// No token with this digest and purpose, or its account can no longer
    /// take the write.
    NotFound,
    /// Past expiry. The row is gone and nothing else changed.
    Expired(AccountId),
    /// Token spent and the account write applied.
    Applied(AccountId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_round_trips_through_its_column_value() {
        for purpose in [TokenPurpose::Activate, TokenPurpose::PasswordReset] {
            assert_eq!(purpose.as_str().parse::<TokenPurpose>().ok(), Some(purpose));
        }
        assert!("RESET".parse::<TokenPurpose>().is_err());
    }

    #[test]
    fn stores_digest_not_value() {
        let token = OneTimeToken::new(7, TokenPurpose::Activate, "plain-value", Duration::minutes(10));
        assert_ne!(token.token_hash, "plain-value");
        assert_eq!(token.token_hash.len(), 64);
        assert!(!token.is_expired());

        let stale = OneTimeToken::new(7, TokenPurpose::Activate, "v", Duration::seconds(-1));
        assert!(stale.is_expired());
    }

    #[test]
    fn redemption_targets_its_purpose() {
        assert_eq!(TokenRedemption::Activate.purpose(), TokenPurpose::Activate);
        assert_eq!(
            TokenRedemption::ResetPassword { password_hash: "h" }.purpose(),
            TokenPurpose::PasswordReset
        );
    }
}
