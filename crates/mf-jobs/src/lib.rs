//! mf-jobs: batch conversion jobs.
//!
//! - [`JobStore`] owns job records and their per-job artifacts.
//! - [`StagedBatch`] streams an upload batch to disk, enforcing the limits.
//! - [`BatchRunner`] turns a staged batch into a job and converts every
//!   file concurrently through a [`mf_av::MediaConverter`].
//! - [`ResultPackager`] bundles the results of a finished job into a ZIP
//!   archive with an error manifest.

pub mod model;
pub mod packager;
pub mod runner;
pub mod scratch;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

pub use model::{derive_status, FileTask, Job, JobStatus, TaskState, TaskUpdate};
pub use packager::{ResultPackager, ARCHIVE_FILE_NAME, MANIFEST_NAME};
pub use runner::BatchRunner;
pub use store::JobStore;
pub use upload::{FileSink, StagedBatch, StagedUpload};
