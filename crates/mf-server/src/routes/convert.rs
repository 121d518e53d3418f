//! Batch submission route.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use mf_jobs::{FileSink, StagedBatch};

use crate::context::AppContext;
use crate::error::{AppError, ResultExt};
use crate::middleware::request_id::RequestId;

/// Response for an accepted batch.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConvertResponse {
    pub job_id: String,
    pub status_url: String,
}

/// POST /convert
///
/// Multipart form; every part carrying a file name is an upload. The
/// browser UI sends them under the field name `videos`. Parts are written
/// to the job's scratch directory as they arrive.
#[utoipa::path(
    post,
    path = "/convert",
    request_body(content_type = "multipart/form-data", description = "Video files to convert"),
    responses(
        (status = 202, description = "Job accepted", body = ConvertResponse),
        (status = 400, description = "Empty batch or unsupported formats"),
        (status = 413, description = "A file exceeds the size limit")
    )
)]
pub async fn submit_conversion(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ConvertResponse>), AppError> {
    let staged = stage_uploads(&ctx, &mut multipart).await;
    let batch = match staged {
        Ok(batch) => batch,
        Err(e) => {
            // Read out the rest of the body so the client sees the error
            // instead of a reset connection.
            drain(&mut multipart).await;
            return Err(AppError::new(e).with_request_id(request_id.0.clone()));
        }
    };

    let job_id = ctx.runner.submit(batch).await.for_request(&request_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            job_id: job_id.to_string(),
            status_url: format!("/status/{job_id}"),
        }),
    ))
}

/// Stream every file part into a new staged batch.
async fn stage_uploads(ctx: &AppContext, multipart: &mut Multipart) -> mf_core::Result<StagedBatch> {
    let mut batch = StagedBatch::new(ctx.runner.limits())?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if let Some(sink) = batch.begin_file(&file_name).await? {
            write_field(field, sink).await?;
        }
    }

    Ok(batch)
}

/// Copy one part into its sink chunk by chunk.
async fn write_field(mut field: Field<'_>, mut sink: FileSink) -> mf_core::Result<()> {
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        sink.write(&chunk).await?;
    }
    sink.finish().await
}

async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

fn multipart_error(e: MultipartError) -> mf_core::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        mf_core::Error::PayloadTooLarge(e.body_text())
    } else {
        mf_core::Error::InvalidInput(format!("malformed upload: {}", e.body_text()))
    }
}
