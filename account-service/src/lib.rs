pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{AuthService, TokenCodec};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::signin,
        handlers::auth::session::refresh,
        handlers::auth::session::info,
        handlers::auth::registration::signup,
        handlers::auth::registration::activate,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::change_password,
        handlers::user::get_me,
        handlers::user::update_me,
        handlers::user::delete_me,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::SigninRequest,
            dtos::auth::SignupRequest,
            dtos::auth::SignupResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::TokenResponse,
            dtos::auth::PasswordResetRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::AuthInfoResponse,
            dtos::user::UpdateProfileRequest,
            models::AccountProfile,
            models::AccountState,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Signup, activation, signin, refresh and password reset"),
        (name = "User", description = "Current account profile"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub auth_service: AuthService,
    pub codec: TokenCodec,
    pub signin_rate_limiter: IpRateLimiter,
    pub signup_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: AuthConfig, auth_service: AuthService) -> Self {
        let limits = &config.rate_limit;
        let signin_rate_limiter =
            create_ip_rate_limiter(limits.signin_attempts, limits.signin_window_seconds);
        let signup_rate_limiter =
            create_ip_rate_limiter(limits.signup_attempts, limits.signup_window_seconds);
        let password_reset_rate_limiter = create_ip_rate_limiter(
            limits.password_reset_attempts,
            limits.password_reset_window_seconds,
        );
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Self {
            codec: auth_service.codec().clone(),
            config,
            auth_service,
            signin_rate_limiter,
            signup_rate_limiter,
            password_reset_rate_limiter,
            ip_rate_limiter,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    // "*" is rejected by config validation in production
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|origin| {
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            }
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

const ACTIVATE_PREFIX: &str = "/api/auth/activate/";

/// Request path for logs, with one-time tokens cut out.
fn loggable_path(path: &str) -> &str {
    if path.starts_with(ACTIVATE_PREFIX) {
        "/api/auth/activate/{token}"
    } else {
        path
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let signin_route = Router::new()
        .route("/api/auth/signin", post(handlers::auth::signin))
        .layer(from_fn_with_state(
            state.signin_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let signup_route = Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .layer(from_fn_with_state(
            state.signup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let password_reset_route = Router::new()
        .route(
            "/api/auth/password-reset",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/api/auth/info", get(handlers::auth::info))
        .route(
            "/api/users/me",
            get(handlers::user::get_me)
                .patch(handlers::user::update_me)
                .delete(handlers::user::delete_me),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger.enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let timeout = Duration::from_secs(state.config.security.request_timeout_seconds.max(1));
    let cors = cors_layer(&state.config.security.allowed_origins);

    let app = app
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/activate/:token", get(handlers::auth::activate))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .merge(signin_route)
        .merge(signup_route)
        .merge(password_reset_route)
        .merge(protected_routes)
        // Route templates are only known inside the router
        .route_layer(from_fn(metrics_middleware))
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        // Dropping the handler future abandons in-flight store calls
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %loggable_path(request.uri().path()),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Store unreachable", body = ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.auth_service.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
