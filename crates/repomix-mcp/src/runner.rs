//! Repomix execution and output retrieval.
//!
//! Each call runs repomix once, pointed at a not-yet-existing file inside a
//! fresh private temporary directory, and reads back either the file size or
//! its full content. The directory is removed on every path out of
//! [`Runner::run`], success or failure.
//!
//! Repomix runs in its own process group. A timeout or a cancelled call kills
//! the whole group, so helpers spawned by `npx` die with it.
//!
//! ## Command line
//!
//! ```text
//! <command> [path] [--style S] [--compress] [--include P] [--ignore P] [--remote URL] --output FILE
//! ```
//!
//! Arguments are passed as argv, never through a shell, so glob lists with
//! commas always arrive as a single token.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::helpers::format_estimate;
use crate::models::{Operation, PackRequest};

/// Base invocation used when none is configured.
pub const DEFAULT_COMMAND: &str = "npx repomix";

/// Default wall-clock limit for one repomix run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default cap on output returned by `pack` (64 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors from building the runner configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("repomix command is empty")]
    EmptyCommand,
    #[error("repomix command has unbalanced quotes: {0}")]
    MalformedCommand(String),
}

/// Errors from a single repomix run.
///
/// Variants raised after the process has run carry its stderr so the caller
/// sees why repomix failed, not just that it did.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("failed to create temporary output directory: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("failed to run {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command failed: {command} ({status})")]
    Exit {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },
    #[error("Failed to estimate output size: {reason}")]
    Estimate { reason: String, stderr: String },
    #[error("Failed to read repomix output: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        stderr: String,
    },
    #[error("repomix output is {size} bytes, over the {limit} byte limit; narrow it with include/ignore or compress")]
    TooLarge { size: u64, limit: u64, stderr: String },
}

impl PackError {
    /// Captured stderr of the repomix process, if any was produced.
    pub fn stderr(&self) -> Option<&str> {
        let stderr = match self {
            PackError::Exit { stderr, .. }
            | PackError::Estimate { stderr, .. }
            | PackError::Read { stderr, .. }
            | PackError::TooLarge { stderr, .. } => stderr.as_str(),
            PackError::TempFile(_) | PackError::Launch { .. } | PackError::Timeout { .. } => "",
        };
        if stderr.is_empty() { None } else { Some(stderr) }
    }

    /// Re-label a failure that happened while producing an estimate.
    fn into_estimate(self) -> Self {
        match self {
            e @ PackError::Estimate { .. } => e,
            other => {
                let stderr = other.stderr().unwrap_or_default().to_string();
                PackError::Estimate {
                    reason: other.to_string(),
                    stderr,
                }
            }
        }
    }

    /// Text returned to the MCP client in an error result.
    pub fn to_message(&self) -> String {
        let mut message = format!("Error executing repomix: {self}");
        if let Some(stderr) = self.stderr() {
            message.push_str("\nStderr: ");
            message.push_str(stderr);
        }
        message
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// How repomix is launched and what limits apply to each run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    program: String,
    base_args: Vec<String>,
    timeout: Option<Duration>,
    max_output_bytes: Option<u64>,
}

impl RunnerConfig {
    /// Parse a base command such as `npx repomix` or `/usr/local/bin/repomix`.
    ///
    /// The string is split with shell quoting rules but never run by a shell.
    pub fn new(command: &str) -> Result<Self, ConfigError> {
        let mut parts = shlex::split(command)
            .ok_or_else(|| ConfigError::MalformedCommand(command.to_string()))?;
        if parts.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            base_args: parts,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_output_bytes: Some(DEFAULT_MAX_OUTPUT_BYTES),
        })
    }

    /// Set the run timeout. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `pack` output cap. `None` returns output of any size.
    pub fn with_max_output_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_output_bytes(&self) -> Option<u64> {
        self.max_output_bytes
    }
}

// ============================================================================
// Command Construction
// ============================================================================

/// A fully built repomix invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackCommand {
    program: String,
    args: Vec<String>,
}

impl PackCommand {
    /// Build the argv for `request`, writing output to `output`.
    ///
    /// Flag order follows the repomix CLI grammar. `--compress` is only
    /// passed when true; there is no negative form.
    pub fn build(config: &RunnerConfig, request: &PackRequest, output: &Path) -> Self {
        let mut args = config.base_args.clone();

        if let Some(path) = &request.path {
            args.push(path.clone());
        }
        if let Some(style) = request.style {
            args.push("--style".to_string());
            args.push(style.as_ref().to_string());
        }
        if request.compress_enabled() {
            args.push("--compress".to_string());
        }
        if let Some(include) = &request.include {
            args.push("--include".to_string());
            args.push(include.clone());
        }
        if let Some(ignore) = &request.ignore {
            args.push("--ignore".to_string());
            args.push(ignore.clone());
        }
        if let Some(remote) = &request.remote {
            args.push("--remote".to_string());
            args.push(remote.clone());
        }
        args.push("--output".to_string());
        args.push(output.to_string_lossy().into_owned());

        Self {
            program: config.program.clone(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Shell-quoted rendering, for logs and error messages only.
impl fmt::Display for PackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in std::iter::once(&self.program).chain(&self.args).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match shlex::try_quote(part) {
                Ok(quoted) => f.write_str(&quoted)?,
                Err(_) => f.write_str(part)?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Output Artifact
// ============================================================================

/// Where repomix writes its output.
///
/// `<tmp>/repomix-output-<random>/output.txt`. The directory is private to
/// this process and the file does not exist until repomix creates it, so a
/// run that exits cleanly without writing anything is caught as a read
/// failure. Removed by [`cleanup`](Self::cleanup) or on drop, whichever comes
/// first; removal errors are logged and otherwise ignored.
#[derive(Debug)]
pub struct OutputArtifact {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl OutputArtifact {
    const FILE_NAME: &'static str = "output.txt";

    /// Reserve a fresh, unpredictable output path.
    pub fn create() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("repomix-output-")
            .rand_bytes(16)
            .tempdir()?;
        Ok(Self {
            path: dir.path().join(Self::FILE_NAME),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory and anything in it. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::debug!(path = %self.path.display(), error = %e, "Output cleanup failed");
            }
        }
    }
}

impl Drop for OutputArtifact {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Runs repomix for `pack` and `pack-estimate` calls.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    working_dir: PathBuf,
}

struct ExecOutput {
    stderr: String,
}

/// Kills a child's whole process group on drop unless disarmed.
///
/// The child is spawned as the leader of a new group, so its pid is the
/// group id. Killing the group also reaches grandchildren such as the node
/// process `npx` starts.
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    /// The group finished on its own; leave it alone.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        unsafe {
            // A negative pid addresses every process in the group.
            let _ = libc::kill(-pgid, libc::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

impl Runner {
    /// Create a runner whose child processes start in `working_dir`.
    pub fn new(config: RunnerConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            working_dir: working_dir.into(),
        }
    }

    /// Run repomix for one request and return the text for the caller.
    ///
    /// The output file never outlives this call.
    pub async fn run(&self, operation: Operation, request: &PackRequest) -> Result<String, PackError> {
        let mut artifact = OutputArtifact::create().map_err(PackError::TempFile)?;
        let result = self.run_with(operation, request, &artifact).await;
        artifact.cleanup();
        result
    }

    async fn run_with(
        &self,
        operation: Operation,
        request: &PackRequest,
        artifact: &OutputArtifact,
    ) -> Result<String, PackError> {
        let command = PackCommand::build(&self.config, request, artifact.path());
        let executed = self.execute(&command).await;

        if operation.is_estimate() {
            let output = executed.map_err(PackError::into_estimate)?;
            let size = tokio::fs::metadata(artifact.path())
                .await
                .map_err(|e| PackError::Estimate {
                    reason: e.to_string(),
                    stderr: output.stderr.clone(),
                })?
                .len();
            tracing::info!(bytes = size, "Estimated repomix output");
            return Ok(format_estimate(size, request.compress_enabled()));
        }

        let output = executed?;
        if let Some(limit) = self.config.max_output_bytes {
            let size = tokio::fs::metadata(artifact.path())
                .await
                .map_err(|source| PackError::Read {
                    source,
                    stderr: output.stderr.clone(),
                })?
                .len();
            if size > limit {
                return Err(PackError::TooLarge {
                    size,
                    limit,
                    stderr: output.stderr,
                });
            }
        }

        let bytes = tokio::fs::read(artifact.path())
            .await
            .map_err(|source| PackError::Read {
                source,
                stderr: output.stderr.clone(),
            })?;
        tracing::info!(bytes = bytes.len(), "Read repomix output");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn execute(&self, command: &PackCommand) -> Result<ExecOutput, PackError> {
        let start = Instant::now();
        tracing::info!(command = %command, cwd = %self.working_dir.display(), "Running repomix");

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| PackError::Launch {
            command: command.to_string(),
            source,
        })?;
        // Declared after `child` so it drops first, while the leader is unreaped.
        let mut group = ProcessGroup::of(&child);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let waited = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };
        let waited = match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, waited)
                .await
                .map_err(|_| timeout),
            None => Ok(waited.await),
        };

        let (status, stdout, stderr) = match waited {
            Ok(Ok(output)) => {
                group.disarm();
                output
            }
            Ok(Err(source)) => {
                return Err(PackError::Launch {
                    command: command.to_string(),
                    source,
                });
            }
            Err(timeout) => {
                tracing::warn!(command = %command, timeout = ?timeout, "repomix timed out");
                group.kill();
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "repomix already gone after timeout");
                }
                return Err(PackError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        tracing::debug!(stdout = %String::from_utf8_lossy(&stdout), "repomix stdout");

        if !status.success() {
            tracing::warn!(
                command = %command,
                status = %status,
                stderr = %stderr,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "repomix failed"
            );
            return Err(PackError::Exit {
                command: command.to_string(),
                status,
                stderr,
            });
        }

        tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "repomix finished");
        Ok(ExecOutput { stderr })
    }
}
