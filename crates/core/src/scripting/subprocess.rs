//! Subprocess management for the interpreter runner.
//!
//! Provides [`run_command`]: spawn a prepared [`tokio::process::Command`],
//! drain stdout and stderr line by line on two independent tasks, wait for
//! exit under a timeout and report what was observed.
//!
//! Both streams are always drained concurrently, never one after the other.

use std::io;
use std::process::Stdio;
use std::time::Instant;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinError;

use super::executor::{ExecutionResult, ScriptError, ScriptInput};
use super::stderr::{classify_stderr_line, StderrClass};

/// Maximum bytes retained per captured line group (10 MiB).
///
/// Lines past the cap are still logged; they are only left out of the
/// returned [`ExecutionResult`].
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// `CREATE_NO_WINDOW` process creation flag.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Spawn `cmd`, drain its output streams and wait for it to exit.
///
/// The caller sets the program and arguments. Environment variables,
/// working directory and timeout come from [`ScriptInput`]. Stdin is closed.
/// On timeout the child is killed and [`ScriptError::Timeout`] is returned.
pub async fn run_command(
    cmd: &mut Command,
    input: ScriptInput,
) -> Result<ExecutionResult, ScriptError> {
    // `kill_on_drop(true)` ensures the child is killed if this future is dropped.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }

    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let started_at = Utc::now();
    let start = Instant::now();

    let mut child = cmd.spawn()?;
    tracing::info!(pid = ?child.id(), "Process started");

    let stdout_task = tokio::spawn(drain_stdout(child.stdout.take()));
    let stderr_task = tokio::spawn(drain_stderr(child.stderr.take()));
    let stdout_abort = stdout_task.abort_handle();
    let stderr_abort = stderr_task.abort_handle();

    // Both streams reach end-of-stream before the exit status is collected.
    let finished = tokio::time::timeout(input.timeout, async {
        let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
        let stdout = join_output(stdout)?;
        let stderr = join_output(stderr)?;
        let status = child.wait().await?;
        Ok::<_, io::Error>((stdout, stderr, status))
    })
    .await;

    let elapsed_ms = start.elapsed().as_millis() as u64;

    let (stdout, stderr, status) = match finished {
        Ok(result) => result?,
        Err(_elapsed) => {
            stdout_abort.abort();
            stderr_abort.abort();
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed-out process");
            }
            tracing::error!(elapsed_ms, "Process timed out and was killed");
            return Err(ScriptError::Timeout { elapsed_ms });
        }
    };

    let finished_at = Utc::now();
    let exit_code = status.code();

    tracing::info!(
        exit_code = ?exit_code,
        elapsed_ms,
        started_at = %started_at,
        finished_at = %finished_at,
        stdout_lines = stdout.lines.len(),
        warnings = stderr.warnings.lines.len(),
        failures = stderr.failures.lines.len(),
        "Process exited",
    );

    let truncated = stdout.truncated || stderr.warnings.truncated || stderr.failures.truncated;

    Ok(ExecutionResult {
        exit_code,
        stdout: stdout.lines,
        warnings: stderr.warnings.lines,
        failures: stderr.failures.lines,
        started_at,
        finished_at,
        duration_ms: elapsed_ms,
        truncated,
    })
}

// ---------------------------------------------------------------------------
// Stream draining
// ---------------------------------------------------------------------------

/// Lines retained from one stream, bounded by a byte budget.
#[derive(Debug)]
struct CapturedLines {
    lines: Vec<String>,
    bytes: usize,
    limit: usize,
    truncated: bool,
}

impl Default for CapturedLines {
    fn default() -> Self {
        Self::with_limit(MAX_OUTPUT_BYTES)
    }
}

impl CapturedLines {
    fn with_limit(limit: usize) -> Self {
        Self {
            lines: Vec::new(),
            bytes: 0,
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, line: String) {
        if self.truncated || self.bytes + line.len() > self.limit {
            self.truncated = true;
            return;
        }
        self.bytes += line.len();
        self.lines.push(line);
    }
}

#[derive(Debug, Default)]
struct StderrCapture {
    warnings: CapturedLines,
    failures: CapturedLines,
}

async fn drain_stdout<R: AsyncRead + Unpin>(handle: Option<R>) -> io::Result<CapturedLines> {
    let mut captured = CapturedLines::default();
    read_lines(handle, |line| {
        tracing::info!(target: "etl::stdout", "{line}");
        captured.push(line);
    })
    .await?;
    Ok(captured)
}

async fn drain_stderr<R: AsyncRead + Unpin>(handle: Option<R>) -> io::Result<StderrCapture> {
    let mut captured = StderrCapture::default();
    read_lines(handle, |line| match classify_stderr_line(&line) {
        None => {}
        Some(StderrClass::Warning) => {
            tracing::warn!(target: "etl::stderr", "{line}");
            captured.warnings.push(line);
        }
        Some(StderrClass::Failure) => {
            tracing::error!(target: "etl::stderr", "Non-warning output from script: {line}");
            captured.failures.push(line);
        }
    })
    .await?;
    Ok(captured)
}

/// Feed every line of `handle` to `on_line`, including a trailing line
/// that has no terminating newline.
async fn read_lines<R, F>(handle: Option<R>, mut on_line: F) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let Some(handle) = handle else {
        return Ok(());
    };

    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        on_line(decode_line(&buf));
    }
}

/// Strip the line terminator and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn join_output<T>(joined: Result<io::Result<T>, JoinError>) -> io::Result<T> {
    joined.map_err(io::Error::other)?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
