//! Builder for executing external tool commands with timeout support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// Failure to run a process to completion. A non-zero exit is not one of
/// these; it is reported through [`ToolOutput::status`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl From<CommandError> for mf_core::Error {
    fn from(e: CommandError) -> Self {
        let tool = match &e {
            CommandError::Spawn { program, .. }
            | CommandError::Wait { program, .. }
            | CommandError::TimedOut { program, .. } => program.clone(),
        };
        mf_core::Error::tool(tool, e.to_string())
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use mf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> mf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-hide_banner")
///     .arg("-version")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn spawn(&self, program: &str) -> Result<Child, CommandError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })
    }

    /// Run the command to completion, capturing stdout and stderr, whatever
    /// the exit status. The child is killed if the timeout expires.
    pub async fn run(&self) -> Result<ToolOutput, CommandError> {
        let program = self.program_name();
        let child = self.spawn(&program)?;

        // Dropping the timed-out future drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(source)) => Err(CommandError::Wait { program, source }),
            Err(_elapsed) => Err(CommandError::TimedOut {
                program,
                timeout: self.timeout,
            }),
        }
    }

    /// Like [`run`](Self::run), but hands every stderr line to `on_line` as
    /// it arrives. Used to follow ffmpeg `-progress pipe:2` output.
    pub async fn run_with_stderr_callback<F>(&self, mut on_line: F) -> Result<ToolOutput, CommandError>
    where
        F: FnMut(&str) + Send,
    {
        let program = self.program_name();
        let mut child = self.spawn(&program)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let work = async {
            let read_stdout = async {
                let mut buf = Vec::new();
                if let Some(mut out) = stdout {
                    out.read_to_end(&mut buf).await?;
                }
                Ok::<_, std::io::Error>(buf)
            };
            let read_stderr = async {
                let mut collected = String::new();
                if let Some(err) = stderr {
                    let mut reader = BufReader::new(err);
                    let mut raw = Vec::new();
                    while reader.read_until(b'\n', &mut raw).await? > 0 {
                        let line = String::from_utf8_lossy(&raw);
                        let line = line.trim_end_matches(['\r', '\n']);
                        on_line(line);
                        collected.push_str(line);
                        collected.push('\n');
                        raw.clear();
                    }
                }
                Ok::<_, std::io::Error>(collected)
            };

            let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(ToolOutput {
                status,
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr,
            })
        };

        // On timeout `work` is dropped first, then `child`, which kills it.
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(CommandError::Wait { program, source }),
            Err(_elapsed) => Err(CommandError::TimedOut {
                program,
                timeout: self.timeout,
            }),
        }
    }

    /// Execute the command and require a successful exit.
    ///
    /// # Errors
    ///
    /// Returns [`mf_core::Error::Tool`] if spawning fails, the process times
    /// out, or it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> mf_core::Result<ToolOutput> {
        let output = self.run().await?;

        if !output.status.success() {
            return Err(mf_core::Error::tool(
                self.program_name(),
                format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            ));
        }

        Ok(output)
    }
}
