mod common;

use axum::http::{header, StatusCode};
use common::{json_body, test_config, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::spawn();

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    app.store.set_unavailable(true);
    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn store_failure_is_500_without_details() {
    let app = TestApp::spawn();
    app.provision("a@x.com").await;
    app.store.set_unavailable(true);

    let response = app
        .post("/api/auth/signin", json!({ "email": "a@x.com", "password": PASSWORD }))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Database error");
    assert!(!body.to_string().contains("unavailable"));
}

#[tokio::test]
async fn signup_mail_failure_keeps_account() {
    let app = TestApp::spawn();
    app.mail.set_failing(true);

    let response = app
        .post(
            "/api/auth/signup",
            json!({ "email": "m@x.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Email delivery failed");

    app.mail.set_failing(false);
    let response = app
        .post(
            "/api/auth/signup",
            json!({ "email": "m@x.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_bodies_are_rejected_before_the_core() {
    let app = TestApp::spawn();

    let response = app
        .post(
            "/api/auth/signup",
            json!({ "email": "not-an-email", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post(
            "/api/auth/signup",
            json!({ "email": "short@x.com", "password": "abc" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.post("/api/auth/signin", json!({ "email": "a@x.com" })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.mail.sent().is_empty());
}

#[tokio::test]
async fn wrong_password_and_unknown_email_get_same_response() {
    let app = TestApp::spawn();
    app.provision("a@x.com").await;

    let wrong = app
        .post("/api/auth/signin", json!({ "email": "a@x.com", "password": "WrongPass1" }))
        .await;
    let unknown = app
        .post("/api/auth/signin", json!({ "email": "b@x.com", "password": PASSWORD }))
        .await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong).await, json_body(unknown).await);
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let app = TestApp::spawn();

    let response = app.get("/health", None).await;
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::spawn();
    let response = app.get("/.well-known/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"]["/api/auth/signin"].is_object());
}

#[tokio::test]
async fn swagger_ui_only_when_enabled() {
    let app = TestApp::spawn();
    let response = app.get("/docs/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut config = test_config();
    config.swagger.enabled = true;
    let app = TestApp::with_config(config);
    let response = app.get("/docs/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::spawn();
    let response = app.get("/api/nope", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
