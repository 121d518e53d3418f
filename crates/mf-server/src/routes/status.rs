//! Job status route.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use mf_core::JobId;
use mf_jobs::{Job, JobStatus, TaskState};

use crate::context::AppContext;
use crate::error::{AppError, ResultExt};
use crate::middleware::request_id::RequestId;

/// Per-file entry of a status response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FileStatusResponse {
    pub name: String,
    pub state: TaskState,
    /// Encoding progress in percent.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of a batch job.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub total_files: usize,
    pub processed_files: usize,
    pub converted: usize,
    /// `name: reason` for every file that failed.
    pub errors: Vec<String>,
    /// File being converted right now, if any.
    pub current_file: Option<String>,
    pub current_progress: u8,
    pub created_at: String,
    pub completed_at: Option<String>,
    /// Present once the job has finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub files: Vec<FileStatusResponse>,
}

impl JobStatusResponse {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            message: job.message.clone(),
            total_files: job.total_files(),
            processed_files: job.processed_files(),
            converted: job.converted(),
            errors: job.error_lines(),
            current_file: job.current_file().map(|f| f.source_name.clone()),
            current_progress: job.current_file().map_or(0, |f| f.progress),
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
            download_url: job
                .status
                .is_terminal()
                .then(|| format!("/download/{}", job.id)),
            files: job
                .files
                .iter()
                .map(|f| FileStatusResponse {
                    name: f.source_name.clone(),
                    state: f.state,
                    progress: f.progress,
                    error: f.error_message.clone(),
                })
                .collect(),
        }
    }
}

/// Parse a path segment into a [`JobId`]. A malformed id names no job, so
/// it is reported the same way as an unknown one.
pub(crate) fn parse_job_id(raw: &str) -> mf_core::Result<JobId> {
    raw.parse().map_err(|_| mf_core::Error::not_found("job", raw))
}

/// GET /status/{job_id}
#[utoipa::path(
    get,
    path = "/status/{job_id}",
    params(("job_id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Unknown or malformed job id")
    )
)]
pub async fn get_status(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let id = parse_job_id(&job_id).for_request(&request_id)?;
    let job = ctx.store.get(id).for_request(&request_id)?;
    Ok(Json(JobStatusResponse::from_job(&job)))
}

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    responses(
        (status = 200, description = "All retained jobs, oldest first", body = Vec<JobStatusResponse>)
    )
)]
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobStatusResponse>> {
    Json(
        ctx.store
            .list()
            .iter()
            .map(JobStatusResponse::from_job)
            .collect(),
    )
}
