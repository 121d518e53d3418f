//! Audio extraction: the [`MediaConverter`] capability and its ffmpeg
//! implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use mf_core::config::AudioConfig;

use crate::command::{CommandError, ToolCommand};
use crate::tools::{ToolRegistry, FFMPEG};

/// Why a single file could not be converted. Recorded on the file task;
/// never fatal to the job.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{tool} is not installed or not on PATH")]
    ToolNotFound { tool: String },

    #[error("Video '{file}' has no audio track")]
    NoAudioTrack { file: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("conversion timed out after {} seconds", .after.as_secs())]
    TimedOut { after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives percent complete (0-100) while a conversion runs.
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// Extracts the audio track of a video file into an MP3 file.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Convert `input` into an MP3 at `output`. Parent directories of
    /// `output` are created as needed.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;

    /// Same as [`convert`](Self::convert), reporting progress when the
    /// converter can measure it. The default never reports.
    async fn convert_with_progress(
        &self,
        input: &Path,
        output: &Path,
        _progress: &ProgressFn,
    ) -> Result<(), ConversionError> {
        self.convert(input, output).await
    }
}

/// [`MediaConverter`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    ffmpeg: Option<PathBuf>,
    bitrate: String,
    timeout: Duration,
}

impl FfmpegConverter {
    /// Build a converter from discovered tools and audio settings.
    ///
    /// A missing ffmpeg is not an error here; every conversion then fails
    /// with [`ConversionError::ToolNotFound`].
    pub fn new(tools: &ToolRegistry, audio: &AudioConfig) -> Self {
        Self {
            ffmpeg: tools.path_of(FFMPEG).map(Path::to_path_buf),
            bitrate: audio.bitrate.clone(),
            timeout: Duration::from_secs(audio.timeout_secs.max(1)),
        }
    }

    /// Whether an ffmpeg executable was found.
    pub fn is_available(&self) -> bool {
        self.ffmpeg.is_some()
    }

    fn command(&self, ffmpeg: &Path, input: &Path, output: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(["-y", "-nostdin", "-hide_banner", "-nostats", "-progress", "pipe:2", "-i"])
            .arg(input.to_string_lossy())
            .args(["-map", "0:a:0", "-vn", "-c:a", "libmp3lame", "-b:a"])
            .arg(self.bitrate.as_str())
            .arg(output.to_string_lossy())
            .timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        self.convert_with_progress(input, output, &|_| {}).await
    }

    async fn convert_with_progress(
        &self,
        input: &Path,
        output: &Path,
        progress: &ProgressFn,
    ) -> Result<(), ConversionError> {
        let Some(ffmpeg) = self.ffmpeg.as_deref() else {
            return Err(ConversionError::ToolNotFound {
                tool: FFMPEG.to_string(),
            });
        };

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(input = %input.display(), output = %output.display(), "Running ffmpeg");

        let mut parser = ProgressParser::default();
        let result = self
            .command(ffmpeg, input, output)
            .run_with_stderr_callback(|line| {
                if let Some(percent) = parser.feed(line) {
                    progress(percent);
                }
            })
            .await;
        let out = match result {
            Ok(out) => out,
            Err(CommandError::TimedOut { timeout, .. }) => {
                let _ = tokio::fs::remove_file(output).await;
                return Err(ConversionError::TimedOut { after: timeout });
            }
            Err(CommandError::Spawn { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(ConversionError::ToolNotFound {
                    tool: FFMPEG.to_string(),
                });
            }
            Err(e) => return Err(ConversionError::Failed { message: e.to_string() }),
        };

        if !out.status.success() {
            let _ = tokio::fs::remove_file(output).await;
            return Err(classify_failure(input, &out.stderr, out.status.code()));
        }

        let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            let _ = tokio::fs::remove_file(output).await;
            return Err(ConversionError::Failed {
                message: "ffmpeg produced no output".into(),
            });
        }

        Ok(())
    }
}

/// Map a failed ffmpeg run to a [`ConversionError`] using its stderr.
pub fn classify_failure(input: &Path, stderr: &str, code: Option<i32>) -> ConversionError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("matches no streams")
        || lowered.contains("does not contain any stream")
        || lowered.contains("output file #0 does not contain")
    {
        let file = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.display().to_string());
        return ConversionError::NoAudioTrack { file };
    }

    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_progress_line(l))
        .last()
        .map(|l| format!("ffmpeg failed: {l}"))
        .unwrap_or_else(|| match code {
            Some(c) => format!("ffmpeg exited with status {c}"),
            None => "ffmpeg was terminated by a signal".to_string(),
        });
    ConversionError::Failed { message }
}

/// `key=value` lines written by `-progress`.
fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'))
}

/// Turns ffmpeg stderr (input header plus `-progress` blocks) into whole
/// percentages of the input duration.
#[derive(Debug, Default)]
struct ProgressParser {
    duration_us: Option<i64>,
    out_time_us: Option<i64>,
    last_percent: Option<u8>,
}

impl ProgressParser {
    /// Feed one stderr line. Returns a percentage at the end of each
    /// progress block, when it differs from the last one reported.
    fn feed(&mut self, line: &str) -> Option<u8> {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("out_time_us=") {
            self.out_time_us = value.parse().ok();
            return None;
        }
        if line.starts_with("progress=") {
            let (Some(done), Some(total)) = (self.out_time_us, self.duration_us) else {
                return None;
            };
            if total <= 0 {
                return None;
            }
            let percent = (done as f64 / total as f64 * 100.0).round().clamp(0.0, 100.0) as u8;
            if self.last_percent == Some(percent) {
                return None;
            }
            self.last_percent = Some(percent);
            return Some(percent);
        }
        if self.duration_us.is_none() {
            self.duration_us = parse_duration_us(line);
        }
        None
    }
}

/// Parse the `Duration: HH:MM:SS.ss, ...` line ffmpeg prints for its input.
fn parse_duration_us(line: &str) -> Option<i64> {
    let rest = line.strip_prefix("Duration:")?.trim_start();
    let stamp = rest.split(',').next()?.trim();
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let total = (hours * 3600.0 + minutes * 60.0 + seconds) * 1_000_000.0;
    Some(total.round() as i64)
}
