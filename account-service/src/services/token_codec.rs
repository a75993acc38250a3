use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ServiceError;
use crate::config::JwtConfig;
use crate::models::AccountId;

/// The one algorithm this service signs with and accepts.
const ALGORITHM: Algorithm = Algorithm::HS512;

/// The `alg` a token header declares, when the header is readable JSON.
/// Used to tell a foreign algorithm (such as `none`, which the decoder cannot
/// represent) apart from a token that is not a JWT at all.
fn declared_algorithm(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("alg")?.as_str().map(str::to_string)
}

/// Kind-specific part of a bearer token, tagged by the `typ` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "lowercase")]
pub enum TokenClaims {
    /// Presented on every authenticated request.
    Access { email: String },
    /// Exchanged for a new pair. Carries the access token it was minted
    /// with, for audit only; the registry decides whether it is still live.
    Refresh { access_token: String },
}

/// Full claim set of a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Subject (account ID)
    pub sub: String,
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique per token, so two tokens minted in the same second differ
    pub jti: String,
    #[serde(flatten)]
    pub kind: TokenClaims,
}

impl BearerClaims {
    pub fn account_id(&self) -> Result<AccountId, ServiceError> {
        self.sub.parse().map_err(|_| ServiceError::TokenMalformed)
    }
}

/// Access/refresh pair returned by signin and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Signs and verifies bearer tokens.
///
/// Tokens are signed with the active key and name it in the `kid` header.
/// Retired keys listed in the config still verify, so rotating the secret
/// does not log everybody out.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    key_id: String,
    decoding_keys: Arc<HashMap<String, DecodingKey>>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        let mut decoding_keys = HashMap::new();
        decoding_keys.insert(config.key_id.clone(), DecodingKey::from_secret(secret));
        for key in &config.previous_keys {
            decoding_keys.insert(
                key.kid.clone(),
                DecodingKey::from_secret(key.secret.expose_secret().as_bytes()),
            );
        }

        tracing::info!(
            key_id = %config.key_id,
            previous_keys = config.previous_keys.len(),
            "Token codec initialized with HS512"
        );

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            key_id: config.key_id.clone(),
            decoding_keys: Arc::new(decoding_keys),
            issuer: config.issuer.clone(),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
        }
    }

    /// Sign `kind` for `subject`, expiring `ttl` from now.
    pub fn issue(
        &self,
        subject: AccountId,
        kind: TokenClaims,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = BearerClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Mint an access token and a refresh token linked to it.
    pub fn issue_pair(&self, account_id: AccountId, email: &str) -> Result<TokenPair, ServiceError> {
        let access_token = self.issue(
            account_id,
            TokenClaims::Access {
                email: email.to_string(),
            },
            self.access_ttl,
        )?;
        let refresh_token = self.issue(
            account_id,
            TokenClaims::Refresh {
                access_token: access_token.clone(),
            },
            self.refresh_ttl,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Check signature, algorithm, issuer and expiry, in that order.
    pub fn verify(&self, token: &str) -> Result<BearerClaims, ServiceError> {
        let header = decode_header(token).map_err(|e| match declared_algorithm(token) {
            Some(alg) => {
                tracing::debug!(alg = %alg, "Token declares an unsupported algorithm");
                ServiceError::TokenInvalidSignature
            }
            None => {
                tracing::debug!(error = %e, "Token header could not be parsed");
                ServiceError::TokenMalformed
            }
        })?;

        if header.alg != ALGORITHM {
            tracing::debug!(alg = ?header.alg, "Token signed with unexpected algorithm");
            return Err(ServiceError::TokenInvalidSignature);
        }

        let kid = header.kid.as_deref().unwrap_or(&self.key_id);
        let key = self.decoding_keys.get(kid).ok_or_else(|| {
            tracing::debug!(kid = %kid, "Token names an unknown signing key");
            ServiceError::TokenInvalidSignature
        })?;

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<BearerClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer => ServiceError::TokenInvalidSignature,
                _ => {
                    tracing::debug!(error = %e, "Token could not be decoded");
                    ServiceError::TokenMalformed
                }
            })
    }

    /// Verify and require an access token. Returns the account id and email.
    pub fn verify_access(&self, token: &str) -> Result<(AccountId, String), ServiceError> {
        let claims = self.verify(token)?;
        let account_id = claims.account_id()?;
        match claims.kind {
            TokenClaims::Access { email } => Ok((account_id, email)),
            TokenClaims::Refresh { .. } => Err(ServiceError::TokenMalformed),
        }
    }

    /// Verify and require a refresh token. Returns the account id.
    pub fn verify_refresh(&self, token: &str) -> Result<AccountId, ServiceError> {
        let claims = self.verify(token)?;
        let account_id = claims.account_id()?;
        match claims.kind {
            TokenClaims::Refresh { .. } => Ok(account_id),
            TokenClaims::Access { .. } => Err(ServiceError::TokenMalformed),
        }
    }
}
