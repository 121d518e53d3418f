//! Result download route.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Extension;

use mf_jobs::ARCHIVE_FILE_NAME;

use crate::context::AppContext;
use crate::error::{AppError, ResultExt};
use crate::middleware::request_id::RequestId;
use crate::routes::status::parse_job_id;

/// GET /download/{job_id}
#[utoipa::path(
    get,
    path = "/download/{job_id}",
    params(("job_id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "ZIP archive of converted files", content_type = "application/zip"),
        (status = 404, description = "Unknown job"),
        (status = 409, description = "Job has not finished yet")
    )
)]
pub async fn download_archive(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_job_id(&job_id).for_request(&request_id)?;
    let archive = ctx.packager.package(id).await.for_request(&request_id)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_FILE_NAME}\""),
            ),
        ],
        archive,
    ))
}
