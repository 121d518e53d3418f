//! External tool status route.

use axum::extract::State;
use axum::Json;

use crate::context::AppContext;

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "External tool availability", body = Vec<mf_av::ToolInfo>)
    )
)]
pub async fn list_tools(State(ctx): State<AppContext>) -> Json<Vec<mf_av::ToolInfo>> {
    let tools = ctx.tools.clone();
    // Version detection spawns processes.
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();
    Json(infos)
}
