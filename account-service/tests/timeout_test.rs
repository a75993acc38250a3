mod common;

use account_service::services::EmailKind;
use axum::http::StatusCode;
use common::{test_config, TestApp, PASSWORD};
use serde_json::json;
use std::time::Duration;

fn app_with_one_second_deadline() -> TestApp {
    let mut config = test_config();
    config.security.request_timeout_seconds = 1;
    TestApp::with_config(config)
}

#[tokio::test]
async fn slow_signup_times_out_without_creating_the_account() {
    let app = app_with_one_second_deadline();
    app.store.stall_next("insert", Duration::from_secs(3));

    let body = json!({ "email": "slow@example.com", "password": PASSWORD });
    let response = app.post("/api/auth/signup", body.clone()).await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    // The abandoned call never wrote, so the email is still free
    assert!(app.mail.sent().is_empty());
    let response = app.post("/api/auth/signup", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn slow_password_change_times_out_and_keeps_reset_token() {
    let app = app_with_one_second_deadline();
    app.provision("deadline@example.com").await;
    let (_, refresh) = app.signin("deadline@example.com", PASSWORD).await;

    let response = app
        .post("/api/auth/password-reset", json!({ "email": "deadline@example.com" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = app
        .mail
        .last_to("deadline@example.com", EmailKind::PasswordReset)
        .unwrap()
        .token()
        .to_string();

    app.store.stall_next("redeem", Duration::from_secs(3));
    let response = app
        .post(
            "/api/auth/change-password",
            json!({ "hash": token, "password": "NewSecret456" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    // Old credentials and session survive the abandoned request
    let response = app
        .post("/api/auth/refresh", json!({ "token": refresh }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.signin("deadline@example.com", PASSWORD).await;

    let response = app
        .post(
            "/api/auth/change-password",
            json!({ "hash": token, "password": "NewSecret456" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.signin("deadline@example.com", "NewSecret456").await;
}
