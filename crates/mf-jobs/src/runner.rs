//! Batch job runner.
//!
//! [`BatchRunner::submit`] takes a staged upload batch, registers the job,
//! and spawns one worker per file. Workers share a semaphore that
//! bounds how many conversions run at once. A failing file never affects
//! its siblings.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use mf_av::MediaConverter;
use mf_core::config::{JobsConfig, UploadConfig};
use mf_core::events::{EventBus, EventPayload};
use mf_core::{JobId, Result};

use crate::model::{Job, JobStatus, TaskUpdate};
use crate::store::JobStore;
use crate::upload::StagedBatch;

/// Accepts batches and drives their conversions.
#[derive(Clone)]
pub struct BatchRunner {
    store: Arc<JobStore>,
    converter: Arc<dyn MediaConverter>,
    events: Arc<EventBus>,
    permits: Arc<Semaphore>,
    limits: UploadConfig,
}

impl BatchRunner {
    pub fn new(
        store: Arc<JobStore>,
        converter: Arc<dyn MediaConverter>,
        events: Arc<EventBus>,
        limits: UploadConfig,
        jobs: &JobsConfig,
    ) -> Self {
        Self {
            store,
            converter,
            events,
            permits: Arc::new(Semaphore::new(jobs.max_concurrent_conversions.max(1))),
            limits,
        }
    }

    /// The store this runner records jobs in.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Upload limits applied to batches staged for this runner.
    pub fn limits(&self) -> &UploadConfig {
        &self.limits
    }

    /// Close a staged batch, create the job and start converting. Returns
    /// as soon as the workers are spawned.
    ///
    /// A rejected batch creates no job and its scratch directory is deleted.
    pub async fn submit(&self, batch: StagedBatch) -> Result<JobId> {
        let (scratch, staged) = batch.finish()?;
        let inputs: Vec<(PathBuf, PathBuf)> = staged
            .iter()
            .enumerate()
            .map(|(index, upload)| (upload.path.clone(), scratch.output_path(index)))
            .collect();

        let names = staged.into_iter().map(|u| u.source_name).collect();
        let job_id = self.store.create(names)?;
        self.store.attach_scratch(job_id, scratch)?;

        tracing::info!(job_id = %job_id, files = inputs.len(), "Job queued");
        self.events.broadcast(EventPayload::JobQueued {
            job_id,
            total_files: inputs.len(),
        });

        for (index, (input, output)) in inputs.into_iter().enumerate() {
            let runner = self.clone();
            tokio::spawn(async move {
                runner.run_file_task(job_id, index, input, output).await;
            });
        }

        Ok(job_id)
    }

    async fn run_file_task(&self, job_id: JobId, index: usize, input: PathBuf, output: PathBuf) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record(job_id, index, TaskUpdate::Error {
                    message: "conversion queue closed".into(),
                });
                return;
            }
        };

        let job = match self.store.update_file_task(job_id, index, TaskUpdate::Converting) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = %job_id, index, "Cannot start file task: {e}");
                return;
            }
        };
        let name = job.files[index].source_name.clone();
        tracing::debug!(job_id = %job_id, index, file = %name, "Converting");
        self.events.broadcast(EventPayload::FileStarted {
            job_id,
            index,
            name: name.clone(),
        });

        let runner = self.clone();
        let report = move |percent: u8| runner.report_progress(job_id, index, percent);
        let result = self
            .converter
            .convert_with_progress(&input, &output, &report)
            .await;
        drop(permit);

        if let Err(e) = tokio::fs::remove_file(&input).await {
            tracing::debug!(job_id = %job_id, index, "Failed to remove upload {}: {e}", input.display());
        }

        let update = match result {
            Ok(()) => {
                tracing::info!(job_id = %job_id, index, file = %name, "Converted");
                TaskUpdate::Done { output_ref: output }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, index, file = %name, "Conversion failed: {e}");
                TaskUpdate::Error {
                    message: e.to_string(),
                }
            }
        };
        self.record(job_id, index, update);
    }

    fn report_progress(&self, job_id: JobId, index: usize, percent: u8) {
        match self
            .store
            .update_file_task(job_id, index, TaskUpdate::Progress { percent })
        {
            Ok(_) => self.events.broadcast(EventPayload::FileProgress {
                job_id,
                index,
                percent,
            }),
            Err(e) => tracing::debug!(job_id = %job_id, index, "Progress not recorded: {e}"),
        }
    }

    /// Apply a finishing update, emit its event and wrap up the job when it
    /// was the last outstanding task.
    fn record(&self, job_id: JobId, index: usize, update: TaskUpdate) {
        let job = match self.store.update_file_task(job_id, index, update) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = %job_id, index, "Failed to record file result: {e}");
                return;
            }
        };

        let task = &job.files[index];
        let name = task.source_name.clone();
        match &task.error_message {
            Some(error) => self.events.broadcast(EventPayload::FileFailed {
                job_id,
                index,
                name,
                error: error.clone(),
            }),
            None => self.events.broadcast(EventPayload::FileCompleted { job_id, index, name }),
        }

        if job.status.is_terminal() {
            self.finish(&job);
        }
    }

    fn finish(&self, job: &Job) {
        if job.status == JobStatus::FailedAll {
            if let Err(e) = self.store.release_scratch(job.id) {
                tracing::warn!(job_id = %job.id, "Failed to release scratch dir: {e}");
            }
        }

        tracing::info!(
            job_id = %job.id,
            status = %job.status,
            converted = job.converted(),
            total = job.total_files(),
            "Job finished"
        );
        self.events.broadcast(EventPayload::JobFinished {
            job_id: job.id,
            status: job.status.as_str().to_string(),
        });
    }
}
