//! HTTP handlers for account-service.

pub mod auth;
pub mod metrics;
pub mod user;
