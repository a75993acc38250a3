use axum::response::IntoResponse;

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    service_core::observability::get_metrics()
}
