//! Per-job scratch directories.
//!
//! A [`ScratchDir`] holds a job's uploaded inputs and converted outputs:
//!
//! ```text
//! convert_job_XXXX/
//!   uploads/<index>/<sanitised name>
//!   outputs/<index>.mp3
//! ```
//!
//! The directory is deleted when the value is dropped (or [`ScratchDir::close`]d).

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of every scratch directory name.
pub const SCRATCH_PREFIX: &str = "convert_job_";

/// Temporary directory tree owned by one job.
#[derive(Debug)]
pub struct ScratchDir {
    temp_dir: TempDir,
}

impl ScratchDir {
    /// Create a new scratch directory under `parent`, or under the system
    /// temp directory when `parent` is `None`.
    pub fn create(parent: Option<&Path>) -> mf_core::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        let temp_dir = match parent {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };

        std::fs::create_dir(temp_dir.path().join("uploads"))?;
        std::fs::create_dir(temp_dir.path().join("outputs"))?;

        Ok(Self { temp_dir })
    }

    /// Root of the scratch tree.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where the upload at `index` is stored. Each upload gets its own
    /// subdirectory so identical names never collide.
    pub fn upload_path(&self, index: usize, source_name: &str) -> PathBuf {
        self.temp_dir
            .path()
            .join("uploads")
            .join(index.to_string())
            .join(source_name)
    }

    /// Where the MP3 for the upload at `index` is written.
    pub fn output_path(&self, index: usize) -> PathBuf {
        self.temp_dir
            .path()
            .join("outputs")
            .join(format!("{index}.mp3"))
    }

    /// Delete the directory tree now, reporting failures.
    pub fn close(self) -> std::io::Result<()> {
        self.temp_dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_custom_parent() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(&parent.path().join("jobs"))).unwrap();

        assert!(scratch.path().starts_with(parent.path()));
        let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(SCRATCH_PREFIX));
        assert!(scratch.path().join("uploads").is_dir());
        assert!(scratch.path().join("outputs").is_dir());

        assert_eq!(
            scratch.upload_path(3, "day1/a.mp4"),
            scratch.path().join("uploads/3/day1/a.mp4")
        );
        assert_eq!(scratch.output_path(3), scratch.path().join("outputs/3.mp3"));
    }

    #[test]
    fn drop_removes_tree() {
        let scratch = ScratchDir::create(None).unwrap();
        let root = scratch.path().to_path_buf();
        std::fs::write(scratch.output_path(0), b"mp3").unwrap();
        drop(scratch);
        assert!(!root.exists());
    }

    #[test]
    fn close_removes_tree() {
        let scratch = ScratchDir::create(None).unwrap();
        let root = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!root.exists());
    }
}
