//! Process spawning and supervision
//!
//! [`run_to_completion`] runs a compiler and collects its output.
//! [`supervise`] runs a worker through the status protocol: a startup phase
//! until the entry point is located, then the execution phase under the
//! deadline. Whatever happens, the worker's process group is killed and
//! reaped before returning.

use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Lines};
use tokio::net::unix::pipe;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;
use crate::sandbox::command::SandboxCommand;
use crate::sandbox::status::WorkerStatus;

/// How long readers may keep draining output after the process group died
const READER_GRACE: Duration = Duration::from_secs(1);

/// Output of a process run to completion
#[derive(Debug, Clone)]
pub struct CollectedOutput {
    /// Exit status (`None` if the process had to be killed)
    pub status: Option<ExitStatus>,
    /// stdout and stderr in arrival order
    pub output: String,
    /// Whether the time limit was hit
    pub timed_out: bool,
    /// Wall-clock duration
    pub elapsed: Duration,
}

impl CollectedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }
}

/// Phase deadlines of a worker
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    /// Budget for locating the entry point
    pub startup: Duration,
    /// Budget for guest code, counted from `ready`
    pub execution: Duration,
}

/// What a worker reported before it was reaped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReport {
    /// Entry point could not be located; guest code never ran
    EntryMissing(String),
    /// Entry point returned before the deadline
    Completed,
    /// Entry point raised an uncaught throwable
    Crashed(String),
    /// The process ended during execution without a terminal status
    Vanished,
    /// The execution deadline elapsed
    TimedOut,
    /// The worker never became ready
    StartupFailed(String),
}

/// Result of a supervised worker
#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub report: WorkerReport,
    /// Time from `ready` until the report (zero if never ready)
    pub elapsed: Duration,
    /// stdout and stderr in arrival order
    pub output: String,
    /// Exit status after reaping
    pub exit: Option<ExitStatus>,
}

/// Shared, size-capped output sink for stdout and stderr
#[derive(Debug, Clone)]
struct OutputBuffer {
    inner: Arc<Mutex<Captured>>,
    limit: usize,
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    full: bool,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Captured::default())),
            limit,
        }
    }

    /// Append a chunk. Once the cap is reached the buffer is cut back to the
    /// last complete UTF-8 character and ignores further input.
    fn append(&self, chunk: &[u8]) {
        let mut buf = match self.inner.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        if buf.full {
            return;
        }
        let room = self.limit.saturating_sub(buf.bytes.len());
        if chunk.len() <= room {
            buf.bytes.extend_from_slice(chunk);
            return;
        }
        buf.bytes.extend_from_slice(&chunk[..room]);
        let keep = complete_prefix_len(&buf.bytes);
        buf.bytes.truncate(keep);
        buf.full = true;
    }

    fn take(&self) -> String {
        let mut buf = match self.inner.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&std::mem::take(&mut buf.bytes)).into_owned()
    }
}

/// Length of `bytes` without a trailing, incomplete UTF-8 sequence
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let start = len - back;
        let width = match bytes[start] {
            0x80..=0xBF => continue,
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            _ => 4,
        };
        return if start + width > len { start } else { len };
    }
    len
}

/// Drain a pipe into the buffer until EOF. Bytes beyond the cap are read
/// and dropped so the child never blocks on a full pipe.
fn spawn_reader<R>(reader: Option<R>, buffer: OutputBuffer) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.append(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "output reader stopped");
                    break;
                }
            }
        }
    }))
}

fn spawn_readers(child: &mut Child, buffer: &OutputBuffer) -> Vec<JoinHandle<()>> {
    [
        spawn_reader(child.stdout.take(), buffer.clone()),
        spawn_reader(child.stderr.take(), buffer.clone()),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Wait for readers to hit EOF. A guest that escaped its process group can
/// hold the pipes open, so readers still running after the grace period are
/// aborted.
async fn join_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
            warn!("output pipe still open after worker exit, abandoning reader");
            reader.abort();
        }
    }
}

/// Kill the whole process group led by `child`
fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        // SAFETY: signalling a process group has no memory-safety requirements
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
}

async fn reap(child: &mut Child) -> Option<ExitStatus> {
    kill_group(child);
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(error = %e, "failed to reap child");
            None
        }
    }
}

fn spawn(command: SandboxCommand) -> Result<Child, SandboxError> {
    let program = command.program().to_string();
    command
        .build()?
        .spawn()
        .map_err(|source| SandboxError::SpawnFailed { program, source })
}

/// Run a command until it exits or `limit` elapses, capturing its output
#[instrument(skip(command), fields(program = command.program()))]
pub async fn run_to_completion(
    command: SandboxCommand,
    limit: Duration,
    max_output: usize,
) -> Result<CollectedOutput, SandboxError> {
    debug!(args = ?command.args(), "running command");

    let started = Instant::now();
    let mut child = spawn(command)?;
    let buffer = OutputBuffer::new(max_output);
    let readers = spawn_readers(&mut child, &buffer);

    let (status, timed_out) = match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => {
            // Children left behind in the group must not outlive the command
            kill_group(&mut child);
            (Some(status), false)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to wait for child");
            (reap(&mut child).await, false)
        }
        Err(_) => {
            warn!(?limit, "command timed out");
            reap(&mut child).await;
            (None, true)
        }
    };

    join_readers(readers).await;
    let elapsed = started.elapsed();

    debug!(?status, timed_out, ?elapsed, "command finished");

    Ok(CollectedOutput {
        status,
        output: buffer.take(),
        timed_out,
        elapsed,
    })
}

/// Create the status pipe. Both ends are close-on-exec; the write end is
/// moved to the status descriptor only in the child.
fn status_pipe() -> Result<(OwnedFd, OwnedFd), SandboxError> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe2 writes
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(SandboxError::StatusPipe(std::io::Error::last_os_error()));
    }
    // SAFETY: pipe2 succeeded, so both descriptors are open and owned by us
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((read, write))
}

type StatusLines = Lines<BufReader<pipe::Receiver>>;

/// Next well-formed status record, or `None` at EOF
async fn next_status(lines: &mut StatusLines, line_number: &mut usize) -> Option<WorkerStatus> {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "status pipe read failed");
                return None;
            }
        };
        *line_number += 1;
        match WorkerStatus::try_parse_line(&line, *line_number) {
            Ok(status) => return Some(status),
            Err(e) => warn!(error = %e, "ignoring malformed status record"),
        }
    }
}

/// Run a worker under the status protocol
///
/// The startup phase lasts until the worker reports `ready` or `missing`.
/// The execution deadline starts at `ready`, so runtime start-up never
/// counts against guest code.
#[instrument(skip(command), fields(program = command.program()))]
pub async fn supervise(
    command: SandboxCommand,
    deadlines: Deadlines,
    max_output: usize,
) -> Result<WorkerRun, SandboxError> {
    let (status_read, status_write) = status_pipe()?;
    let command = command.status_fd(status_write.as_raw_fd());
    debug!(args = ?command.args(), "spawning worker");

    let mut child = spawn(command)?;
    // Only the child may hold the write end, so EOF means the worker is gone
    drop(status_write);

    let buffer = OutputBuffer::new(max_output);
    let readers = spawn_readers(&mut child, &buffer);

    let receiver = pipe::Receiver::from_file(File::from(status_read))
        .map_err(SandboxError::StatusPipe)?;
    let mut lines = BufReader::new(receiver).lines();
    let mut line_number = 0;

    let startup = tokio::time::timeout(
        deadlines.startup,
        next_status(&mut lines, &mut line_number),
    )
    .await;

    let mut elapsed = Duration::ZERO;
    let report = match startup {
        Err(_) => WorkerReport::StartupFailed(format!(
            "worker did not locate the entry point within {}ms",
            deadlines.startup.as_millis()
        )),
        Ok(None) => WorkerReport::StartupFailed("worker exited during startup".to_string()),
        Ok(Some(WorkerStatus::Missing(message))) => WorkerReport::EntryMissing(message),
        Ok(Some(WorkerStatus::Ready)) => {
            let ready_at = Instant::now();
            let deadline = tokio::time::Instant::from_std(ready_at + deadlines.execution);
            debug!(timeout = ?deadlines.execution, "worker ready, deadline started");

            let report = loop {
                match tokio::time::timeout_at(deadline, next_status(&mut lines, &mut line_number))
                    .await
                {
                    Err(_) => break WorkerReport::TimedOut,
                    Ok(None) => break WorkerReport::Vanished,
                    Ok(Some(WorkerStatus::Completed)) => break WorkerReport::Completed,
                    Ok(Some(WorkerStatus::Crashed(message))) => {
                        break WorkerReport::Crashed(message);
                    }
                    Ok(Some(other)) => warn!(status = %other, "unexpected status after ready"),
                }
            };
            elapsed = ready_at.elapsed();
            report
        }
        Ok(Some(other)) => {
            WorkerReport::StartupFailed(format!("unexpected status before ready: {other}"))
        }
    };

    let exit = reap(&mut child).await;
    join_readers(readers).await;

    debug!(?report, ?elapsed, ?exit, "worker finished");

    Ok(WorkerRun {
        report,
        elapsed,
        output: buffer.take(),
        exit,
    })
}
