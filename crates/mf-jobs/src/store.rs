//! In-memory job store.
//!
//! The [`JobStore`] exclusively owns job records and the artifacts tied to
//! them (scratch directory, cached archive). Each job sits behind its own
//! lock inside a sharded map, so updates to one job never block another.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::OnceCell;

use mf_core::{Error, JobId, Result};

use crate::model::{Job, TaskUpdate};
use crate::scratch::ScratchDir;

/// A job record plus the resources that live and die with it.
#[derive(Debug)]
struct JobEntry {
    job: Job,
    scratch: Option<ScratchDir>,
    /// Filled once per job; concurrent builders of the same job wait on it.
    archive: Arc<OnceCell<Bytes>>,
}

/// Thread-safe registry of batch jobs.
#[derive(Debug)]
pub struct JobStore {
    jobs: DashMap<JobId, Arc<RwLock<JobEntry>>>,
    retention: chrono::Duration,
}

impl JobStore {
    /// Create a store that keeps finished jobs for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::MAX),
        }
    }

    fn entry(&self, id: JobId) -> Result<Arc<RwLock<JobEntry>>> {
        // Clone the Arc so the shard lock is released before the entry is locked.
        self.jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::not_found("job", id))
    }

    /// Allocate a job with one queued task per file name.
    pub fn create(&self, file_names: Vec<String>) -> Result<JobId> {
        let job = Job::new(file_names)?;
        let id = job.id;
        self.jobs.insert(
            id,
            Arc::new(RwLock::new(JobEntry {
                job,
                scratch: None,
                archive: Arc::new(OnceCell::new()),
            })),
        );
        Ok(id)
    }

    /// Consistent snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<Job> {
        Ok(self.entry(id)?.read().job.clone())
    }

    /// Atomically update one task and re-derive the job status. Returns the
    /// job as it stands after the update.
    pub fn update_file_task(&self, id: JobId, index: usize, update: TaskUpdate) -> Result<Job> {
        let entry = self.entry(id)?;
        let mut guard = entry.write();
        guard.job.apply(index, update, Utc::now())?;
        Ok(guard.job.clone())
    }

    /// Remove terminal jobs whose `completed_at + retention <= now`,
    /// returning their ids. Dropping an entry deletes its scratch directory.
    pub fn evict_expired_ids(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|e| {
                let guard = e.value().read();
                guard
                    .job
                    .completed_at
                    .and_then(|at| at.checked_add_signed(self.retention))
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter(|id| self.jobs.remove(id).is_some())
            .collect()
    }

    /// Remove expired jobs and return how many were evicted.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.evict_expired_ids(now).len()
    }

    /// Hand the job's scratch directory to the store.
    pub fn attach_scratch(&self, id: JobId, scratch: ScratchDir) -> Result<()> {
        self.entry(id)?.write().scratch = Some(scratch);
        Ok(())
    }

    /// Root of the job's scratch directory, if it still exists.
    pub fn scratch_path(&self, id: JobId) -> Result<Option<PathBuf>> {
        Ok(self
            .entry(id)?
            .read()
            .scratch
            .as_ref()
            .map(|s| s.path().to_path_buf()))
    }

    /// Delete the job's scratch directory now. No-op if already released.
    pub fn release_scratch(&self, id: JobId) -> Result<()> {
        let scratch = self.entry(id)?.write().scratch.take();
        if let Some(scratch) = scratch {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                tracing::warn!(job_id = %id, "Failed to remove scratch dir {}: {e}", path.display());
            } else {
                tracing::debug!(job_id = %id, "Removed scratch dir {}", path.display());
            }
        }
        Ok(())
    }

    /// The cached result archive, if one has been built.
    pub fn cached_archive(&self, id: JobId) -> Result<Option<Bytes>> {
        Ok(self.entry(id)?.read().archive.get().cloned())
    }

    /// The job's archive slot. The first value set wins, so every caller
    /// hands out identical bytes.
    pub fn archive_cell(&self, id: JobId) -> Result<Arc<OnceCell<Bytes>>> {
        Ok(Arc::clone(&self.entry(id)?.read().archive))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshots of all jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().read().job.clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}
