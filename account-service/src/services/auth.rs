use chrono::Duration;
use std::sync::Arc;

use super::{
    CredentialStore, EmailProvider, OneTimeTokenManager, RefreshTokenRegistry, ServiceError,
    SignupProfile, TokenCodec, TokenPair,
};
use crate::config::{AuthConfig, LinkConfig};
use crate::db::Store;
use crate::models::{Account, AccountId, ProfilePatch, TokenPurpose, TokenRedemption};
use crate::utils::Password;

fn record_event<T>(event: &'static str, result: &Result<T, ServiceError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::counter!("auth_events_total", "event" => event, "outcome" => outcome).increment(1);
}

/// Account lifecycle flows: signup, activation, signin, refresh, password
/// reset and deactivation.
#[derive(Clone)]
pub struct AuthService {
    credentials: CredentialStore,
    one_time_tokens: OneTimeTokenManager,
    refresh_tokens: RefreshTokenRegistry,
    codec: TokenCodec,
    email: Arc<dyn EmailProvider>,
    links: LinkConfig,
    one_time_ttl: Duration,
}

impl AuthService {
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        codec: TokenCodec,
        email: Arc<dyn EmailProvider>,
        config: &AuthConfig,
    ) -> Self {
        let one_time_ttl = Duration::minutes(config.one_time_token.expiry_minutes);
        let one_time_tokens = OneTimeTokenManager::new(store.clone());

        Self {
            credentials: CredentialStore::new(store.clone(), one_time_ttl),
            one_time_tokens,
            refresh_tokens: RefreshTokenRegistry::new(store),
            codec,
            email,
            links: config.links.clone(),
            one_time_ttl,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn activation_link(&self, token: &str) -> String {
        format!(
            "{}/api/auth/activate/{}",
            self.links.public_url.trim_end_matches('/'),
            token
        )
    }

    fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/change-password/{}",
            self.links.frontend_url.trim_end_matches('/'),
            token
        )
    }

    /// Create an unverified account and mail its activation link.
    ///
    /// A delivery failure is reported, but the account stays registered.
    pub async fn signup(&self, profile: SignupProfile) -> Result<AccountId, ServiceError> {
        let result = self.signup_inner(profile).await;
        record_event("signup", &result);
        result
    }

    async fn signup_inner(&self, profile: SignupProfile) -> Result<AccountId, ServiceError> {
        let (account, token) = self.credentials.create(profile, false).await?;
        let token = token.ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("No activation token issued"))
        })?;

        self.email
            .send_activation_email(&account.email, &self.activation_link(&token))
            .await?;

        tracing::info!(account_id = account.id, "Signup completed, activation mail sent");
        Ok(account.id)
    }

    /// Create an account that is active immediately. No mail is sent.
    pub async fn provision_verified(&self, profile: SignupProfile) -> Result<AccountId, ServiceError> {
        let (account, _) = self.credentials.create(profile, true).await?;
        Ok(account.id)
    }

    pub async fn activate(&self, token: &str) -> Result<AccountId, ServiceError> {
        let result = self.activate_inner(token).await;
        record_event("activate", &result);
        result
    }

    async fn activate_inner(&self, token: &str) -> Result<AccountId, ServiceError> {
        let account_id = self
            .one_time_tokens
            .consume(token, TokenRedemption::Activate)
            .await?;
        tracing::info!(account_id, "Account activated");
        Ok(account_id)
    }

    /// Exchange credentials for a token pair. The new refresh token replaces
    /// whatever session the account had before.
    pub async fn signin(&self, email: &str, password: &Password) -> Result<TokenPair, ServiceError> {
        let result = self.signin_inner(email, password).await;
        record_event("signin", &result);
        result
    }

    async fn signin_inner(&self, email: &str, password: &Password) -> Result<TokenPair, ServiceError> {
        let account = self.credentials.verify_credentials(email, password).await?;
        if !account.is_verified {
            return Err(ServiceError::NotVerified);
        }

        let pair = self.codec.issue_pair(account.id, &account.email)?;
        self.refresh_tokens
            .rotate(account.id, &pair.refresh_token)
            .await?;

        tracing::info!(account_id = account.id, "Signin succeeded");
        Ok(pair)
    }

    /// Redeem a refresh token for a new pair. The presented token is dead
    /// afterwards, also when two requests race with the same token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let result = self.refresh_inner(refresh_token).await;
        record_event("refresh", &result);
        result
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let subject = self.codec.verify_refresh(refresh_token).map_err(|e| match e {
            ServiceError::TokenExpired => ServiceError::TokenExpired,
            other => {
                tracing::debug!(reason = other.kind(), "Refresh token rejected");
                ServiceError::TokenNotFound
            }
        })?;

        let owner = self.refresh_tokens.is_active(refresh_token).await?;
        if owner != subject {
            tracing::warn!(subject, owner, "Refresh token registered to another account");
            return Err(ServiceError::TokenNotFound);
        }

        let account = match self.credentials.get_by_id(owner).await {
            Ok(account) if account.is_verified && !account.is_deactivated() => account,
            Ok(_) | Err(ServiceError::NotFound) => return Err(ServiceError::TokenNotFound),
            Err(e) => return Err(e),
        };

        let pair = self.codec.issue_pair(account.id, &account.email)?;
        self.refresh_tokens
            .exchange(account.id, refresh_token, &pair.refresh_token)
            .await?;

        tracing::debug!(account_id = account.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Mail a single-use reset link. Unknown and deactivated accounts are
    /// rejected as invalid credentials, unverified ones as not verified.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let result = self.request_password_reset_inner(email).await;
        record_event("password_reset", &result);
        result
    }

    async fn request_password_reset_inner(&self, email: &str) -> Result<(), ServiceError> {
        let account = self
            .credentials
            .find_by_email(email)
            .await?
            .filter(|a| !a.is_deactivated())
            .ok_or(ServiceError::InvalidCredentials)?;
        if !account.is_verified {
            return Err(ServiceError::NotVerified);
        }

        let token = self
            .one_time_tokens
            .issue(account.id, TokenPurpose::PasswordReset, self.one_time_ttl)
            .await?;
        self.email
            .send_password_reset_email(&account.email, &self.reset_link(&token))
            .await?;

        tracing::info!(account_id = account.id, "Password reset mail sent");
        Ok(())
    }

    /// Set a new password with a reset token. Every session of the account
    /// ends: its refresh token is revoked with the password write.
    pub async fn change_password(&self, token: &str, new_password: Password) -> Result<(), ServiceError> {
        let result = self.change_password_inner(token, new_password).await;
        record_event("change_password", &result);
        result
    }

    async fn change_password_inner(&self, token: &str, new_password: Password) -> Result<(), ServiceError> {
        // Reject a bad password before the token is spent
        let password_hash = self.credentials.hash_new_password(new_password).await?;

        let account_id = self
            .one_time_tokens
            .consume(
                token,
                TokenRedemption::ResetPassword {
                    password_hash: password_hash.as_str(),
                },
            )
            .await?;
        tracing::info!(account_id, "Password changed, sessions revoked");
        Ok(())
    }

    pub async fn deactivate(&self, account_id: AccountId) -> Result<(), ServiceError> {
        let result = self.credentials.deactivate(account_id).await;
        record_event("deactivate", &result);
        result
    }

    /// Current profile. Deactivated accounts are reported as missing.
    pub async fn profile(&self, account_id: AccountId) -> Result<Account, ServiceError> {
        let account = self.credentials.get_by_id(account_id).await?;
        if account.is_deactivated() {
            return Err(ServiceError::NotFound);
        }
        Ok(account)
    }

    pub async fn update_profile(
        &self,
        account_id: AccountId,
        patch: ProfilePatch,
    ) -> Result<Account, ServiceError> {
        self.credentials.update(account_id, patch).await
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.credentials.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::db::MemoryStore;
    use crate::models::AccountState;
    use crate::services::{EmailKind, MockEmailService};

    struct Harness {
        store: Arc<MemoryStore>,
        mail: MockEmailService,
        service: AuthService,
    }

    fn harness() -> Harness {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let mail = MockEmailService::new();
        let service = AuthService::new(
            store.clone(),
            TokenCodec::new(&config.jwt),
            Arc::new(mail.clone()),
            &config,
        );
        Harness { store, mail, service }
    }

    fn profile(email: &str) -> SignupProfile {
        SignupProfile {
            email: email.to_string(),
            password: Password::new("password123".to_string()),
            username: "user".to_string(),
            name: "Anna".to_string(),
            surname: "Ivanova".to_string(),
            patronymic: "Sergeevna".to_string(),
        }
    }

    fn password(value: &str) -> Password {
        Password::new(value.to_string())
    }

    async fn active_account(h: &Harness, email: &str) -> AccountId {
        h.service.provision_verified(profile(email)).await.unwrap()
    }

    #[tokio::test]
    async fn signup_mails_activation_link_to_api() {
        let h = harness();
        h.service.signup(profile("new@example.com")).await.unwrap();

        let mail = h.mail.last_to("new@example.com", EmailKind::Activation).unwrap();
        assert!(mail.link.starts_with("http://localhost:8080/api/auth/activate/"));
        assert_eq!(mail.token().len(), 64);
    }

    #[tokio::test]
    async fn unverified_account_cannot_sign_in_until_activated() {
        let h = harness();
        let id = h.service.signup(profile("new@example.com")).await.unwrap();

        assert!(matches!(
            h.service.signin("new@example.com", &password("password123")).await,
            Err(ServiceError::NotVerified)
        ));

        let token = h
            .mail
            .last_to("new@example.com", EmailKind::Activation)
            .unwrap()
            .token()
            .to_string();
        assert_eq!(h.service.activate(&token).await.unwrap(), id);
        assert_eq!(h.service.profile(id).await.unwrap().state(), AccountState::Active);

        h.service
            .signin("new@example.com", &password("password123"))
            .await
            .unwrap();

        // Activation tokens are single-use
        assert!(matches!(
            h.service.activate(&token).await,
            Err(ServiceError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn signup_keeps_account_when_mail_fails() {
        let h = harness();
        h.mail.set_failing(true);

        let err = h.service.signup(profile("m@example.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Mail(_)));

        h.mail.set_failing(false);
        assert!(matches!(
            h.service.signup(profile("m@example.com")).await,
            Err(ServiceError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn signin_issues_verifiable_pair() {
        let h = harness();
        let id = active_account(&h, "s@example.com").await;

        let pair = h
            .service
            .signin("s@example.com", &password("password123"))
            .await
            .unwrap();
        let (subject, email) = h.service.codec().verify_access(&pair.access_token).unwrap();
        assert_eq!(subject, id);
        assert_eq!(email, "s@example.com");
        assert_eq!(h.store.refresh_token_count(id), 1);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let h = harness();
        active_account(&h, "s@example.com").await;

        let wrong = h
            .service
            .signin("s@example.com", &password("not-the-password"))
            .await
            .unwrap_err();
        let unknown = h
            .service
            .signin("ghost@example.com", &password("password123"))
            .await
            .unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn second_signin_supersedes_first_session() {
        let h = harness();
        active_account(&h, "s@example.com").await;

        let first = h.service.signin("s@example.com", &password("password123")).await.unwrap();
        let second = h.service.signin("s@example.com", &password("password123")).await.unwrap();

        assert!(matches!(
            h.service.refresh(&first.refresh_token).await,
            Err(ServiceError::TokenNotFound)
        ));
        h.service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let h = harness();
        active_account(&h, "r@example.com").await;
        let pair = h.service.signin("r@example.com", &password("password123")).await.unwrap();

        let next = h.service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(next.refresh_token, pair.refresh_token);

        assert!(matches!(
            h.service.refresh(&pair.refresh_token).await,
            Err(ServiceError::TokenNotFound)
        ));
        h.service.refresh(&next.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_rejects_access_token_and_garbage() {
        let h = harness();
        active_account(&h, "r@example.com").await;
        let pair = h.service.signin("r@example.com", &password("password123")).await.unwrap();

        assert!(matches!(
            h.service.refresh(&pair.access_token).await,
            Err(ServiceError::TokenNotFound)
        ));
        assert!(matches!(
            h.service.refresh("definitely.not.ajwt").await,
            Err(ServiceError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let h = harness();
        active_account(&h, "c@example.com").await;
        let pair = h.service.signin("c@example.com", &password("password123")).await.unwrap();

        let (a, b) = tokio::join!(
            h.service.refresh(&pair.refresh_token),
            h.service.refresh(&pair.refresh_token)
        );
        assert!(a.is_ok() ^ b.is_ok());
    }

    #[tokio::test]
    async fn password_reset_changes_password_and_ends_sessions() {
        let h = harness();
        let id = active_account(&h, "p@example.com").await;
        let session = h.service.signin("p@example.com", &password("password123")).await.unwrap();

        h.service.request_password_reset("P@example.com").await.unwrap();
        let mail = h.mail.last_to("p@example.com", EmailKind::PasswordReset).unwrap();
        assert!(mail.link.starts_with("http://localhost:3000/change-password/"));

        h.service
            .change_password(mail.token(), password("brand-new-pass"))
            .await
            .unwrap();

        assert_eq!(h.store.refresh_token_count(id), 0);
        assert!(matches!(
            h.service.refresh(&session.refresh_token).await,
            Err(ServiceError::TokenNotFound)
        ));
        assert!(matches!(
            h.service.signin("p@example.com", &password("password123")).await,
            Err(ServiceError::InvalidCredentials)
        ));
        h.service
            .signin("p@example.com", &password("brand-new-pass"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.change_password(mail.token(), password("another-pass-1")).await,
            Err(ServiceError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn short_password_does_not_spend_reset_token() {
        let h = harness();
        active_account(&h, "p@example.com").await;
        h.service.request_password_reset("p@example.com").await.unwrap();
        let token = h
            .mail
            .last_to("p@example.com", EmailKind::PasswordReset)
            .unwrap()
            .token()
            .to_string();

        assert!(matches!(
            h.service.change_password(&token, password("short")).await,
            Err(ServiceError::Validation(_))
        ));
        h.service
            .change_password(&token, password("long-enough-now"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn activation_token_cannot_reset_password() {
        let h = harness();
        h.service.signup(profile("x@example.com")).await.unwrap();
        let token = h
            .mail
            .last_to("x@example.com", EmailKind::Activation)
            .unwrap()
            .token()
            .to_string();

        assert!(matches!(
            h.service.change_password(&token, password("long-enough-now")).await,
            Err(ServiceError::TokenNotFound)
        ));
        h.service.activate(&token).await.unwrap();
    }

    #[tokio::test]
    async fn password_reset_rejects_unknown_and_unverified() {
        let h = harness();
        h.service.signup(profile("pending@example.com")).await.unwrap();

        assert!(matches!(
            h.service.request_password_reset("nobody@example.com").await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.request_password_reset("pending@example.com").await,
            Err(ServiceError::NotVerified)
        ));
    }

    #[tokio::test]
    async fn deactivation_is_terminal() {
        let h = harness();
        let id = active_account(&h, "d@example.com").await;
        let pair = h.service.signin("d@example.com", &password("password123")).await.unwrap();
        h.service.request_password_reset("d@example.com").await.unwrap();
        let reset = h
            .mail
            .last_to("d@example.com", EmailKind::PasswordReset)
            .unwrap()
            .token()
            .to_string();

        h.service.deactivate(id).await.unwrap();

        assert!(matches!(
            h.service.refresh(&pair.refresh_token).await,
            Err(ServiceError::TokenNotFound)
        ));
        assert!(matches!(
            h.service.signin("d@example.com", &password("password123")).await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.change_password(&reset, password("long-enough-now")).await,
            Err(ServiceError::TokenNotFound)
        ));
        assert!(matches!(h.service.profile(id).await, Err(ServiceError::NotFound)));
        assert!(matches!(h.service.deactivate(id).await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn signup_store_failure_leaves_email_free() {
        let h = harness();
        h.store.fail_next("insert");

        assert!(matches!(
            h.service.signup(profile("again@example.com")).await,
            Err(ServiceError::Persistence(_))
        ));
        assert!(h.mail.sent().is_empty());

        let id = h.service.signup(profile("again@example.com")).await.unwrap();
        let token = h
            .mail
            .last_to("again@example.com", EmailKind::Activation)
            .unwrap()
            .token()
            .to_string();
        assert_eq!(h.service.activate(&token).await.unwrap(), id);
    }

    #[tokio::test]
    async fn activation_can_be_retried_after_store_failure() {
        let h = harness();
        let id = h.service.signup(profile("late@example.com")).await.unwrap();
        let token = h
            .mail
            .last_to("late@example.com", EmailKind::Activation)
            .unwrap()
            .token()
            .to_string();

        h.store.fail_next("redeem");
        assert!(matches!(
            h.service.activate(&token).await,
            Err(ServiceError::Persistence(_))
        ));
        assert_eq!(h.service.profile(id).await.unwrap().state(), AccountState::Unverified);

        assert_eq!(h.service.activate(&token).await.unwrap(), id);
        h.service
            .signin("late@example.com", &password("password123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn password_change_can_be_retried_after_store_failure() {
        let h = harness();
        let id = active_account(&h, "keep@example.com").await;
        h.service.signin("keep@example.com", &password("password123")).await.unwrap();
        h.service.request_password_reset("keep@example.com").await.unwrap();
        let token = h
            .mail
            .last_to("keep@example.com", EmailKind::PasswordReset)
            .unwrap()
            .token()
            .to_string();

        h.store.fail_next("redeem");
        assert!(matches!(
            h.service.change_password(&token, password("brand-new-pass")).await,
            Err(ServiceError::Persistence(_))
        ));
        // Nothing changed: old password and session still valid
        assert_eq!(h.store.refresh_token_count(id), 1);
        h.service
            .signin("keep@example.com", &password("password123"))
            .await
            .unwrap();

        h.service
            .change_password(&token, password("brand-new-pass"))
            .await
            .unwrap();
        h.service
            .signin("keep@example.com", &password("brand-new-pass"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_as_persistence_error() {
        let h = harness();
        h.store.set_unavailable(true);
        assert!(matches!(
            h.service.signin("a@example.com", &password("password123")).await,
            Err(ServiceError::Persistence(_))
        ));
        assert!(h.service.health_check().await.is_err());
    }
}
