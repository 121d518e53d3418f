//! Job and file-task records.
//!
//! A [`Job`]'s status and message are never set directly: they are derived
//! from the states of its [`FileTask`]s every time one of them changes.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mf_core::{Error, JobId, Result};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Aggregate status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    FailedPartial,
    FailedAll,
}

impl JobStatus {
    /// `completed`, `failed_partial` and `failed_all` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::FailedPartial | JobStatus::FailedAll
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::FailedPartial => "failed_partial",
            JobStatus::FailedAll => "failed_all",
        }
    }

    /// Human-readable progress message shown to clients.
    pub fn message(self) -> &'static str {
        match self {
            JobStatus::Pending => "Preparing conversion...",
            JobStatus::Running => "Converting videos...",
            JobStatus::Completed => "Conversion completed!",
            JobStatus::FailedPartial => "Conversion completed with some errors.",
            JobStatus::FailedAll => "Conversion failed for all uploaded videos.",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Converting,
    Done,
    Error,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error)
    }
}

/// Derive the job status from the states of its tasks.
pub fn derive_status<I>(states: I) -> JobStatus
where
    I: IntoIterator<Item = TaskState>,
{
    let (mut queued, mut converting, mut done, mut error) = (0usize, 0usize, 0usize, 0usize);
    for state in states {
        match state {
            TaskState::Queued => queued += 1,
            TaskState::Converting => converting += 1,
            TaskState::Done => done += 1,
            TaskState::Error => error += 1,
        }
    }

    if converting == 0 && done == 0 && error == 0 {
        JobStatus::Pending
    } else if queued > 0 || converting > 0 {
        JobStatus::Running
    } else if error == 0 {
        JobStatus::Completed
    } else if done == 0 {
        JobStatus::FailedAll
    } else {
        JobStatus::FailedPartial
    }
}

// ---------------------------------------------------------------------------
// FileTask
// ---------------------------------------------------------------------------

/// A requested change to a file task.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    Converting,
    /// Percent complete of a converting task.
    Progress { percent: u8 },
    Done { output_ref: PathBuf },
    Error { message: String },
}

/// Per-file conversion unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTask {
    /// Sanitised relative path of the upload.
    pub source_name: String,
    /// Entry name inside the result archive.
    pub archive_name: String,
    pub state: TaskState,
    /// Percent complete, 0-100. Reaches 100 when the task is done.
    pub progress: u8,
    pub error_message: Option<String>,
    pub output_ref: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FileTask {
    fn new(source_name: String, archive_name: String) -> Self {
        Self {
            source_name,
            archive_name,
            state: TaskState::Queued,
            progress: 0,
            error_message: None,
            output_ref: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply an update, rejecting transitions out of a finished state,
    /// `queued -> done` and progress outside `converting`.
    fn apply(&mut self, update: TaskUpdate, now: DateTime<Utc>) -> Result<()> {
        match (self.state, update) {
            (TaskState::Queued, TaskUpdate::Converting) => {
                self.state = TaskState::Converting;
                self.started_at = Some(now);
            }
            (TaskState::Converting, TaskUpdate::Progress { percent }) => {
                self.progress = percent.min(100);
            }
            (TaskState::Converting, TaskUpdate::Done { output_ref }) => {
                self.state = TaskState::Done;
                self.progress = 100;
                self.output_ref = Some(output_ref);
                self.finished_at = Some(now);
            }
            (TaskState::Queued | TaskState::Converting, TaskUpdate::Error { message }) => {
                self.state = TaskState::Error;
                self.error_message = Some(message);
                self.finished_at = Some(now);
            }
            (state, update) => {
                return Err(Error::InvalidInput(format!(
                    "illegal transition for '{}': {state:?} -> {update:?}",
                    self.source_name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One batch conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
    /// Tasks in submission order.
    pub files: Vec<FileTask>,
    pub created_at: DateTime<Utc>,
    /// Set when the status first becomes terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job with one queued task per file name.
    pub fn new(source_names: Vec<String>) -> Result<Self> {
        if source_names.is_empty() {
            return Err(Error::InvalidInput("a job needs at least one file".into()));
        }

        let archive_names = assign_archive_names(&source_names);
        let files = source_names
            .into_iter()
            .zip(archive_names)
            .map(|(source, archive)| FileTask::new(source, archive))
            .collect();

        let status = JobStatus::Pending;
        Ok(Self {
            id: JobId::new(),
            status,
            message: status.message().to_string(),
            files,
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    /// Apply an update to the task at `index` and re-derive the status.
    pub fn apply(&mut self, index: usize, update: TaskUpdate, now: DateTime<Utc>) -> Result<()> {
        let id = self.id;
        let task = self
            .files
            .get_mut(index)
            .ok_or_else(|| Error::not_found("file task", format!("{id}/{index}")))?;
        task.apply(update, now)?;

        self.status = derive_status(self.files.iter().map(|f| f.state));
        self.message = self.status.message().to_string();
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    /// The first task currently converting, if any.
    pub fn current_file(&self) -> Option<&FileTask> {
        self.files
            .iter()
            .find(|f| f.state == TaskState::Converting)
    }

    /// Tasks that have finished, successfully or not.
    pub fn processed_files(&self) -> usize {
        self.files.iter().filter(|f| f.state.is_finished()).count()
    }

    /// Tasks that produced an MP3.
    pub fn converted(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.state == TaskState::Done)
            .count()
    }

    /// `source_name: error_message` for every failed task, in submission order.
    pub fn error_lines(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|f| {
                f.error_message
                    .as_ref()
                    .map(|msg| format!("{}: {msg}", f.source_name))
            })
            .collect()
    }
}

/// Replace each name's extension with `.mp3`, appending ` (n)` to the stem
/// where two uploads would otherwise collide.
pub fn assign_archive_names(source_names: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    source_names
        .iter()
        .map(|source| {
            let base = Path::new(source).with_extension("mp3");
            let mut candidate = to_posix(&base);
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                let stem = base
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                candidate = to_posix(&base.with_file_name(format!("{stem} ({n}).mp3")));
                n += 1;
            }
            candidate
        })
        .collect()
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
