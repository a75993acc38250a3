//! Shared setup for account-service integration tests: the full router over
//! the in-memory store and a recording mail provider.

#![allow(dead_code)]

use account_service::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, JwtConfig, LinkConfig, OneTimeTokenConfig,
        RateLimitConfig, SecurityConfig, SmtpConfig, SwaggerConfig,
    },
    db::MemoryStore,
    services::{AuthService, EmailKind, MockEmailService, SignupProfile, TokenCodec},
    utils::Password,
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-signing-secret-0123456789abcdef";
pub const PASSWORD: &str = "Secret123";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "account-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        jwt: JwtConfig {
            secret: Secret::new(TEST_SECRET.to_string()),
            key_id: "test".to_string(),
            previous_keys: Vec::new(),
            issuer: "smer-auth".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        one_time_token: OneTimeTokenConfig { expiry_minutes: 10 },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            tls: false,
            username: None,
            password: None,
            from: "no-reply@localhost".to_string(),
        },
        links: LinkConfig {
            public_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_seconds: 30,
        },
        swagger: SwaggerConfig { enabled: false },
        rate_limit: RateLimitConfig {
            signin_attempts: 1000,
            signin_window_seconds: 60,
            signup_attempts: 1000,
            signup_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mail: MockEmailService,
    pub state: AppState,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mail = MockEmailService::new();
        let auth_service = AuthService::new(
            store.clone(),
            TokenCodec::new(&config.jwt),
            Arc::new(mail.clone()),
            &config,
        );
        let state = AppState::new(config, auth_service);
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            store,
            mail,
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, Some(body), None).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> Response<Body> {
        self.request(Method::GET, uri, None, bearer).await
    }

    /// Sign up through the API and return the mailed activation token.
    pub async fn signup(&self, email: &str) -> String {
        let response = self
            .post(
                "/api/auth/signup",
                serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": "Anna",
                    "surname": "Ivanova",
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        self.mail
            .last_to(email, EmailKind::Activation)
            .expect("No activation mail sent")
            .token()
            .to_string()
    }

    /// Create an already active account directly through the service.
    pub async fn provision(&self, email: &str) -> i64 {
        self.state
            .auth_service
            .provision_verified(SignupProfile {
                email: email.to_string(),
                password: Password::new(PASSWORD.to_string()),
                username: String::new(),
                name: "Test".to_string(),
                surname: "User".to_string(),
                patronymic: String::new(),
            })
            .await
            .expect("Failed to provision account")
    }

    /// Sign in and return `(access, refresh)`.
    pub async fn signin(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .post(
                "/api/auth/signin",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        (
            body["token"].as_str().unwrap().to_string(),
            body["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
