//! Builder and runners for executing external tool commands.
//!
//! A [`ToolCommand`] describes one invocation. A [`ProcessRunner`] executes
//! it: [`SystemRunner`] spawns a real child process, tests substitute
//! scripted fakes, and [`BoundedRunner`] wraps either to cap concurrency.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Process exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// A builder describing one external tool invocation.
///
/// # Example
///
/// ```no_run
/// use fp_av::{SystemRunner, ToolCommand};
/// use std::path::PathBuf;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> fp_core::Result<()> {
/// let mut cmd = ToolCommand::new(PathBuf::from("ffprobe"));
/// cmd.args(["-v", "error", "-show_format", "/path/to/video.mkv"]);
/// let output = cmd.run(&SystemRunner, &CancellationToken::new()).await?;
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

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Short program name for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// The command line as it would be typed, for debug logging.
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Execute this command with the given runner.
    pub async fn run(
        &self,
        runner: &dyn ProcessRunner,
        cancel: &CancellationToken,
    ) -> fp_core::Result<ToolOutput> {
        runner.run(self, cancel).await
    }
}

/// Executes [`ToolCommand`]s.
///
/// A process that starts and exits (with any status) yields `Ok`; the exit
/// code is data for the caller to interpret. `Err` is reserved for spawn
/// failures, timeouts, and cancellation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> fp_core::Result<ToolOutput>;
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

enum Waited {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> fp_core::Result<ToolOutput> {
        let program_name = command.program_name();
        tracing::debug!("exec: {}", command.display());

        let mut cmd = Command::new(command.program());
        cmd.args(command.arg_list());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| fp_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Drain both pipes concurrently so a chatty stderr cannot fill its
        // buffer and stall the child.
        let stdout_task = tokio::spawn(read_to_string(child.stdout.take()));
        let stderr_task = tokio::spawn(read_to_string(child.stderr.take()));

        let waited = tokio::select! {
            res = child.wait() => Waited::Exited(res),
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = tokio::time::sleep(command.timeout_duration()) => Waited::TimedOut,
        };

        let status = match waited {
            Waited::Exited(Ok(status)) => status,
            Waited::Exited(Err(e)) => {
                return Err(fp_core::Error::tool(
                    program_name,
                    format!("I/O error waiting for process: {e}"),
                ));
            }
            Waited::Cancelled => {
                let _ = child.kill().await;
                tracing::debug!("{program_name} killed after cancellation");
                return Err(fp_core::Error::Cancelled);
            }
            Waited::TimedOut => {
                let _ = child.kill().await;
                return Err(fp_core::Error::tool(
                    program_name,
                    format!("timed out after {:?}", command.timeout_duration()),
                ));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

async fn read_to_string<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Caps the number of simultaneous invocations of an inner runner.
#[derive(Clone)]
pub struct BoundedRunner {
    inner: Arc<dyn ProcessRunner>,
    permits: Arc<Semaphore>,
}

impl BoundedRunner {
    /// Wrap `inner` with a pool of `max_concurrent` permits (at least one).
    pub fn new(inner: Arc<dyn ProcessRunner>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Permits not currently held by a running invocation.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl std::fmt::Debug for BoundedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRunner")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProcessRunner for BoundedRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> fp_core::Result<ToolOutput> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fp_core::Error::Cancelled),
            permit = self.permits.acquire() => permit
                .map_err(|_| fp_core::Error::Internal("process permit pool closed".into()))?,
        };
        self.inner.run(command, cancel).await
    }
}
