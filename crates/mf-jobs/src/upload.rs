//! Upload staging and filename sanitisation.
//!
//! A [`StagedBatch`] writes each uploaded part straight into a fresh scratch
//! directory while it is still arriving, checking the batch limits as it
//! goes. Nothing is buffered in memory. Dropping a batch that was not
//! accepted deletes everything it wrote.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use mf_core::config::{is_supported_file, UploadConfig};
use mf_core::{Error, Result};

use crate::scratch::ScratchDir;

/// Fallback name for uploads whose path has no usable component.
const FALLBACK_NAME: &str = "uploaded_file";

/// Reduce a client-supplied path to a safe relative path using `/`
/// separators. Empty, `.` and `..` components are dropped, as are leading
/// separators and Windows drive prefixes.
pub fn sanitize_relative_path(file_name: &str) -> String {
    let parts: Vec<&str> = file_name
        .split(['/', '\\'])
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .collect();

    let parts = match parts.split_first() {
        Some((first, rest)) if is_drive_prefix(first) => rest,
        _ => &parts[..],
    };

    if parts.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        parts.join("/")
    }
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// An upload written to scratch, carrying its sanitised name.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub source_name: String,
    pub path: PathBuf,
}

/// A batch of uploads being written to a scratch directory.
///
/// Parts with an empty file name are ignored. Limits are enforced as parts
/// arrive: the file count when a part starts, the per-file size while its
/// bytes are written. Unsupported extensions are collected and reported
/// together by [`StagedBatch::finish`]; once one is seen, later parts are
/// no longer written.
#[derive(Debug)]
pub struct StagedBatch {
    scratch: ScratchDir,
    limits: UploadConfig,
    files: Vec<StagedUpload>,
    unsupported: Vec<String>,
}

impl StagedBatch {
    /// Open a batch backed by a new scratch directory.
    pub fn new(limits: &UploadConfig) -> Result<Self> {
        Ok(Self {
            scratch: ScratchDir::create(limits.scratch_dir.as_deref())?,
            limits: limits.clone(),
            files: Vec::new(),
            unsupported: Vec::new(),
        })
    }

    /// Number of named parts seen so far.
    pub fn len(&self) -> usize {
        self.files.len() + self.unsupported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new part. Returns the sink its bytes must be written to, or
    /// `None` when the part is not kept and its body can be skipped.
    pub async fn begin_file(&mut self, file_name: &str) -> Result<Option<FileSink>> {
        if file_name.trim().is_empty() {
            return Ok(None);
        }
        if self.len() >= self.limits.max_files {
            return Err(Error::InvalidInput(format!(
                "Too many files: at most {} allowed",
                self.limits.max_files
            )));
        }

        let source_name = sanitize_relative_path(file_name);
        if !is_supported_file(&source_name) {
            self.unsupported.push(source_name);
            return Ok(None);
        }

        let path = self.scratch.upload_path(self.files.len(), &source_name);
        if !self.unsupported.is_empty() {
            // The batch is already rejected; only the count still matters.
            self.files.push(StagedUpload { source_name, path });
            return Ok(None);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;
        let sink = FileSink {
            file,
            name: source_name.clone(),
            written: 0,
            max_bytes: self.limits.max_file_size_bytes(),
            max_mb: self.limits.max_file_size_mb,
        };
        self.files.push(StagedUpload { source_name, path });
        Ok(Some(sink))
    }

    /// Close the batch. On success the caller takes ownership of the
    /// scratch directory and the staged files in submission order.
    pub fn finish(mut self) -> Result<(ScratchDir, Vec<StagedUpload>)> {
        if !self.unsupported.is_empty() {
            return Err(Error::unsupported_format(std::mem::take(&mut self.unsupported)));
        }
        if self.files.is_empty() {
            return Err(Error::InvalidInput("No files were uploaded.".into()));
        }
        Ok((self.scratch, self.files))
    }

    /// Stage a batch from in-memory parts.
    #[cfg(test)]
    pub(crate) async fn from_parts(limits: &UploadConfig, parts: &[(&str, &str)]) -> Result<Self> {
        let mut batch = Self::new(limits)?;
        for (name, data) in parts {
            if let Some(mut sink) = batch.begin_file(name).await? {
                sink.write(data.as_bytes()).await?;
                sink.finish().await?;
            }
        }
        Ok(batch)
    }
}

/// Destination of one part's bytes.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    name: String,
    written: u64,
    max_bytes: u64,
    max_mb: u64,
}

impl FileSink {
    /// Append a chunk, failing as soon as the file grows past the limit.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.written += chunk.len() as u64;
        if self.written > self.max_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "{} exceeds the {} MB limit",
                self.name, self.max_mb
            )));
        }
        self.file.write_all(chunk).await?;
        Ok(())
    }

    /// Flush the file to disk.
    pub async fn finish(mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_files: usize, max_file_size_mb: u64) -> UploadConfig {
        UploadConfig {
            max_files,
            max_file_size_mb,
            scratch_dir: None,
        }
    }

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_relative_path("a.mp4"), "a.mp4");
        assert_eq!(sanitize_relative_path("../../etc/passwd.mp4"), "etc/passwd.mp4");
        assert_eq!(sanitize_relative_path("/abs/./clip.mov"), "abs/clip.mov");
        assert_eq!(sanitize_relative_path("folder\\sub\\clip.mkv"), "folder/sub/clip.mkv");
        assert_eq!(sanitize_relative_path("C:\\Videos\\clip.avi"), "Videos/clip.avi");
        assert_eq!(sanitize_relative_path(".."), "uploaded_file");
        assert_eq!(sanitize_relative_path("./"), "uploaded_file");
    }

    fn limits_in(scratch: &std::path::Path, max_files: usize) -> UploadConfig {
        UploadConfig {
            scratch_dir: Some(scratch.to_path_buf()),
            ..limits(max_files, 1)
        }
    }

    fn leftover_dirs(scratch: &std::path::Path) -> usize {
        std::fs::read_dir(scratch).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn parts_are_written_to_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let batch = StagedBatch::from_parts(
            &limits_in(dir.path(), 10),
            &[("a.mp4", "aaa"), ("../dir/B.MKV", "bbb")],
        )
        .await
        .unwrap();

        let (scratch, files) = batch.finish().unwrap();
        let names: Vec<&str> = files.iter().map(|u| u.source_name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "dir/B.MKV"]);
        assert_eq!(files[1].path, scratch.upload_path(1, "dir/B.MKV"));
        assert_eq!(std::fs::read(&files[0].path).unwrap(), b"aaa");
        assert_eq!(std::fs::read(&files[1].path).unwrap(), b"bbb");
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let batch = StagedBatch::new(&limits_in(dir.path(), 10)).unwrap();
        assert!(batch.is_empty());
        let err = batch.finish().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(leftover_dirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn parts_without_name_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let batch = StagedBatch::from_parts(&limits_in(dir.path(), 1), &[("", "x")])
            .await
            .unwrap();
        assert!(matches!(batch.finish(), Err(Error::InvalidInput(_))));

        let batch = StagedBatch::from_parts(&limits_in(dir.path(), 1), &[("", "x"), ("a.mp4", "x")])
            .await
            .unwrap();
        assert_eq!(batch.finish().unwrap().1.len(), 1);
    }

    #[tokio::test]
    async fn too_many_files_fail_on_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = StagedBatch::new(&limits_in(dir.path(), 2)).unwrap();
        assert!(batch.begin_file("0.mp4").await.unwrap().is_some());
        assert!(batch.begin_file("1.txt").await.unwrap().is_none());
        let err = batch.begin_file("2.mp4").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        drop(batch);
        assert_eq!(leftover_dirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_file_fails_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = StagedBatch::new(&limits_in(dir.path(), 2)).unwrap();
        let mut sink = batch.begin_file("big.mp4").await.unwrap().unwrap();

        let chunk = vec![0u8; 512 * 1024];
        sink.write(&chunk).await.unwrap();
        sink.write(&chunk).await.unwrap();
        let err = sink.write(&[0u8]).await.unwrap_err();
        assert_eq!(err.http_status(), 413);

        drop(sink);
        drop(batch);
        assert_eq!(leftover_dirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn unsupported_files_reject_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let batch = StagedBatch::from_parts(
            &limits_in(dir.path(), 10),
            &[("a.mp4", "x"), ("notes.txt", "x"), ("b.mp4", "x"), ("cover.jpg", "x")],
        )
        .await
        .unwrap();
        assert_eq!(batch.len(), 4);

        match batch.finish().unwrap_err() {
            Error::UnsupportedFormat { files } => {
                assert_eq!(files, vec!["cover.jpg", "notes.txt"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(leftover_dirs(dir.path()), 0);
    }

    #[tokio::test]
    async fn parts_after_rejection_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = StagedBatch::new(&limits_in(dir.path(), 10)).unwrap();
        assert!(batch.begin_file("notes.txt").await.unwrap().is_none());
        assert!(batch.begin_file("a.mp4").await.unwrap().is_none());
        assert_eq!(batch.len(), 2);
    }
}
