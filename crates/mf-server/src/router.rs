//! Axum router construction.
//!
//! Builds the application router with the job routes (mounted both at the
//! root and under `/api`), middleware layers, API docs and optional static
//! file serving.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::convert::submit_conversion,
        routes::status::get_status,
        routes::status::list_jobs,
        routes::download::download_archive,
        routes::events::events_handler,
        routes::tools::list_tools,
        routes::health::health_check,
    ),
    components(schemas(
        routes::convert::ConvertResponse,
        routes::status::JobStatusResponse,
        routes::status::FileStatusResponse,
        mf_jobs::JobStatus,
        mf_jobs::TaskState,
        mf_av::ToolInfo,
    ))
)]
struct ApiDoc;

/// Submit, status and download routes.
fn job_routes(ctx: &AppContext) -> Router<AppContext> {
    Router::new()
        .route(
            "/convert",
            post(routes::convert::submit_conversion)
                .layer(DefaultBodyLimit::max(ctx.config.uploads.max_body_bytes())),
        )
        .route("/status/{job_id}", get(routes::status::get_status))
        .route("/download/{job_id}", get(routes::download::download_archive))
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = job_routes(&ctx)
        .route("/jobs", get(routes::status::list_jobs))
        .route("/events", get(routes::events::events_handler))
        .route("/tools", get(routes::tools::list_tools));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(job_routes(&ctx))
        .nest("/api", api)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for an upload UI.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(tower_http::services::ServeFile::new(index_path)),
            );
        } else {
            tracing::warn!("Static directory {:?} does not exist; not serving UI", dir);
        }
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use mf_av::ToolRegistry;
    use mf_core::config::Config;

    fn app() -> Router {
        let converter = Arc::new(mf_av::FfmpegConverter::new(
            &ToolRegistry::default(),
            &Config::default().audio,
        ));
        let ctx = AppContext::new(Config::default(), converter, ToolRegistry::default());
        build_router(ctx, None)
    }

    #[tokio::test]
    async fn health_ok() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn status_routes_mounted_twice() {
        for path in ["/status/not-a-uuid", "/api/status/not-a-uuid"] {
            let resp = app()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
            // The job error body, not the router fallback.
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["code"], "not_found", "{path}");
        }
    }

    #[tokio::test]
    async fn request_id_is_echoed_in_errors() {
        let path = format!("/download/{}", mf_core::JobId::new());
        let resp = app()
            .oneshot(
                Request::get(path)
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()["x-request-id"], "req-42");

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["request_id"], "req-42");
        assert_eq!(json["code"], "not_found");
    }

    #[tokio::test]
    async fn openapi_lists_job_routes() {
        let resp = app()
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["paths"]["/convert"].is_object());
        assert!(json["paths"]["/status/{job_id}"].is_object());
    }
}
