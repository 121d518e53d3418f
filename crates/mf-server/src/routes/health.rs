//! Liveness route.

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String, content_type = "text/plain"))
)]
pub async fn health_check() -> &'static str {
    "ok"
}
