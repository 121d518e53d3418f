//! Result archive packaging.
//!
//! Once a job is terminal its MP3s are bundled into a ZIP archive, together
//! with an `errors.txt` manifest when some files failed. The first archive
//! built for a job is cached in the [`JobStore`] and the job's scratch
//! directory is released, so later downloads return identical bytes.
//! Builds of different jobs run independently.

use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use mf_core::{Error, JobId, Result};

use crate::model::{Job, TaskState};
use crate::store::JobStore;

/// File name offered to clients for the archive.
pub const ARCHIVE_FILE_NAME: &str = "converted_audio.zip";

/// Archive entry listing the files that failed.
pub const MANIFEST_NAME: &str = "errors.txt";

/// Builds and caches result archives.
pub struct ResultPackager {
    store: Arc<JobStore>,
}

impl ResultPackager {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Return the job's result archive, building it on first request.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the job is unknown (or already evicted).
    /// - [`Error::NotReady`] if the job is still pending or running.
    pub async fn package(&self, id: JobId) -> Result<Bytes> {
        let cell = self.store.archive_cell(id)?;
        if let Some(archive) = cell.get() {
            return Ok(archive.clone());
        }

        // Builds read outputs that are deleted right after, so only one per
        // job may run. Other callers for the same job wait on the cell.
        let archive = cell.get_or_try_init(|| self.build(id)).await?;
        Ok(archive.clone())
    }

    async fn build(&self, id: JobId) -> Result<Bytes> {
        let job = self.store.get(id)?;
        if !job.status.is_terminal() {
            return Err(Error::NotReady(format!(
                "job {id} is {}; {} of {} files processed",
                job.status,
                job.processed_files(),
                job.total_files()
            )));
        }

        let archive = tokio::task::spawn_blocking(move || build_archive(&job))
            .await
            .map_err(|e| Error::Internal(format!("archive task failed: {e}")))??;

        self.store.release_scratch(id)?;
        tracing::info!(job_id = %id, bytes = archive.len(), "Result archive built");
        Ok(archive)
    }
}

/// Write the archive for a terminal job: converted files in submission order,
/// then the error manifest if any file failed.
pub fn build_archive(job: &Job) -> Result<Bytes> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for task in job.files.iter().filter(|f| f.state == TaskState::Done) {
        let Some(output) = task.output_ref.as_ref() else {
            continue;
        };
        let mut file = std::fs::File::open(output).map_err(|e| {
            Error::Archive(format!("cannot read output for {}: {e}", task.source_name))
        })?;
        zip.start_file(task.archive_name.as_str(), options)
            .map_err(|e| Error::Archive(e.to_string()))?;
        std::io::copy(&mut file, &mut zip)?;
    }

    let errors = job.error_lines();
    if !errors.is_empty() {
        zip.start_file(MANIFEST_NAME, options)
            .map_err(|e| Error::Archive(e.to_string()))?;
        for line in errors {
            writeln!(zip, "{line}")?;
        }
    }

    let cursor = zip.finish().map_err(|e| Error::Archive(e.to_string()))?;
    Ok(Bytes::from(cursor.into_inner()))
}
