use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ServiceError;
use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_activation_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), ServiceError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let builder = if config.tls {
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| ServiceError::Mail(format!("Invalid SMTP relay: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                password.expose_secret().clone(),
            ));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            tls = config.tls,
            "Email service initialized"
        );

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| ServiceError::Mail(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Mail(e.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| ServiceError::Mail(e.to_string()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(ServiceError::Mail(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_activation_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), ServiceError> {
        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Activate your account</h2>
        <p>Thanks for signing up. Follow the link below to activate your account:</p>
        <p><a href="{link}" style="background-color: #4CAF50; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">Activate</a></p>
        <p style="color: #666; font-size: 12px;">The link can be used once. If you did not sign up, ignore this email.</p>
    </body>
</html>
"###,
            link = activation_link
        );

        let plain_body = format!(
            "Activate your account\n\nThanks for signing up. Open the following link to activate your account:\n\n{}\n\nThe link can be used once. If you did not sign up, ignore this email.",
            activation_link
        );

        self.send_email(to_email, "Activate your account", plain_body, html_body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
    ) -> Result<(), ServiceError> {
        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Password reset</h2>
        <p>We received a request to reset your password. Follow the link below to choose a new one:</p>
        <p><a href="{link}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">Reset password</a></p>
        <p style="color: #666; font-size: 12px;">The link expires soon and can be used once. If you did not ask for a reset, ignore this email.</p>
    </body>
</html>
"###,
            link = reset_link
        );

        let plain_body = format!(
            "Password reset\n\nWe received a request to reset your password. Open the following link to choose a new one:\n\n{}\n\nThe link expires soon and can be used once. If you did not ask for a reset, ignore this email.",
            reset_link
        );

        self.send_email(to_email, "Reset your password", plain_body, html_body)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Activation,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub kind: EmailKind,
    pub link: String,
}

impl SentEmail {
    /// Last path segment of the link, i.e. the one-time token.
    pub fn token(&self) -> &str {
        self.link.rsplit('/').next().unwrap_or_default()
    }
}

/// Records outgoing mail instead of delivering it.
#[derive(Clone, Default)]
pub struct MockEmailService {
    outbox: Arc<Mutex<Vec<SentEmail>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str, kind: EmailKind) -> Option<SentEmail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
    }

    fn record(&self, to: &str, kind: EmailKind, link: &str) -> Result<(), ServiceError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(ServiceError::Mail("mock transport refused message".to_string()));
        }

        tracing::debug!(to = %to, ?kind, "Mock email recorded");
        self.outbox
            .lock()
            .map_err(|_| ServiceError::Mail("mock outbox poisoned".to_string()))?
            .push(SentEmail {
                to: to.to_string(),
                kind,
                link: link.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_activation_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, EmailKind::Activation, activation_link)
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, EmailKind::PasswordReset, reset_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_links_and_extracts_token() {
        let mock = MockEmailService::new();
        mock.send_activation_email("a@example.com", "http://host/api/auth/activate/abc123")
            .await
            .unwrap();

        let mail = mock.last_to("a@example.com", EmailKind::Activation).unwrap();
        assert_eq!(mail.token(), "abc123");
        assert!(mock.last_to("a@example.com", EmailKind::PasswordReset).is_none());
    }

    #[tokio::test]
    async fn failing_mock_returns_mail_error() {
        let mock = MockEmailService::new();
        mock.set_failing(true);
        let err = mock
            .send_password_reset_email("a@example.com", "http://x/change-password/t")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Mail(_)));
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn plain_smtp_transport_builds_without_network() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            tls: false,
            username: None,
            password: None,
            from: "no-reply@example.com".to_string(),
        };
        assert!(EmailService::new(&config).is_ok());
    }
}
