//! Process supervisor for the external prober
//!
//! Drives one probe run from spawn to verdict:
//!
//! ```text
//! spawn ──► read loop (poll every `poll_interval`)
//!              │
//!              ├─ line ─────► success indicator? ──► grace wait ──► drain ──► classify
//!              ├─ idle ─────► exited? ───────────────────────────► drain ──► classify
//!              │              silent > stall_timeout? ──► kill ──► Stalled
//!              ├─ elapsed > timeout ──► kill ──► Timeout
//!              └─ cancelled ──────────► kill ──► Cancelled
//! ```
//!
//! The child is spawned with `kill_on_drop`, and the output reader tasks are
//! aborted when the guard drops, so an early return (including `?`) never
//! leaves the process or its pipes behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ProbeCommand, ProbeRun, ProbeVerdict};
use crate::config::ProbeConfig;
use crate::error::Result;
use crate::traits::ProbeRunner;

/// Read buffer size for the output streams
const READ_CHUNK: usize = 4096;

/// Characters of output included in failure logs
const FAILURE_EXCERPT_CHARS: usize = 200;

/// Supervises one external probe process at a time per call
///
/// The supervisor is stateless between runs and can be shared; every call
/// to [`ProcessSupervisor::run`] owns its own child process.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    /// Wall-clock budget for the whole run
    timeout: Duration,
    /// Silence window measured from the last output line
    stall_timeout: Duration,
    /// Time the process gets to exit after reporting completion
    success_grace: Duration,
    /// Read loop poll granularity
    poll_interval: Duration,
    /// Substrings that mean "results written"
    success_indicators: Vec<String>,
}

impl ProcessSupervisor {
    /// Create a supervisor from probe configuration
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: config.timeout(),
            stall_timeout: config.stall_timeout(),
            success_grace: config.success_grace(),
            poll_interval: config.poll_interval(),
            success_indicators: usable_indicators(config.success_indicators.iter().cloned()),
        }
    }

    /// Override the wall-clock budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the silence window
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    /// Override the post-completion grace period
    pub fn with_success_grace(mut self, success_grace: Duration) -> Self {
        self.success_grace = success_grace;
        self
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replace the success indicators
    pub fn with_success_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.success_indicators = usable_indicators(indicators.into_iter().map(Into::into));
        self
    }

    /// Whether a line of probe output signals completion
    pub fn is_success_line(&self, line: &str) -> bool {
        self.success_indicators
            .iter()
            .any(|indicator| line.contains(indicator.as_str()))
    }

    /// Run the probe to a verdict
    ///
    /// # Returns
    ///
    /// - `Ok(ProbeRun)`: the run concluded; inspect `verdict`
    /// - `Err(Error)`: the run could not be set up or monitored (I/O failure
    ///   other than a missing executable)
    pub async fn run(&self, command: &ProbeCommand, cancel: &CancellationToken) -> Result<ProbeRun> {
        let mut log = RunLog::new(command.clone());

        if !command.executable.is_file() {
            warn!("Probe tool not found: {}", command.executable.display());
            return Ok(log.finish(ProbeVerdict::ToolMissing));
        }

        tokio::fs::create_dir_all(&command.work_dir).await?;
        remove_stale_output(&command.output_path).await?;

        info!(
            "Starting probe: {} {:?} (cwd: {})",
            command.executable.display(),
            command.args,
            command.work_dir.display()
        );

        let mut child = match ChildGuard::spawn(command) {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Probe tool could not be started: {}", e);
                return Ok(log.finish(ProbeVerdict::ToolMissing));
            }
            Err(e) => return Err(e.into()),
        };

        let mut last_output = Instant::now();

        let fatal = loop {
            if log.start.elapsed() >= self.timeout {
                error!("Probe timed out after {:?}", self.timeout);
                child.terminate().await;
                break Some(ProbeVerdict::Timeout {
                    after: self.timeout,
                });
            }

            let tick = tokio::select! {
                biased;
                () = cancel.cancelled() => Tick::Cancelled,
                line = child.next_line(self.poll_interval) => match line {
                    Some(line) => Tick::Line(line),
                    None => Tick::Idle,
                },
            };

            match tick {
                Tick::Cancelled => {
                    warn!("Probe cancelled, terminating process");
                    child.terminate().await;
                    break Some(ProbeVerdict::Cancelled);
                }
                Tick::Line(line) => {
                    last_output = Instant::now();
                    let completes = !log.success_observed && self.is_success_line(&line);
                    debug!(target: "cfopt::probe::output", "{}", line);
                    if completes {
                        info!("Probe reported completion: {}", line.trim());
                        log.success_observed = true;
                    }
                    log.output.push(line);

                    if completes {
                        let grace = self.grace_budget(log.start.elapsed());
                        match self.wait_after_success(&mut child, grace, cancel).await {
                            GraceWait::Exited(status) => {
                                log.exit_code = status?.code();
                                break None;
                            }
                            GraceWait::Expired => {
                                debug!(
                                    "Probe still running {:?} after completion, terminating",
                                    grace
                                );
                                child.terminate().await;
                                break None;
                            }
                            GraceWait::Cancelled => {
                                warn!("Probe cancelled during completion grace period");
                                child.terminate().await;
                                break Some(ProbeVerdict::Cancelled);
                            }
                        }
                    }
                }
                Tick::Idle => {
                    if let Some(status) = child.try_exit()? {
                        debug!("Probe exited: {}", status);
                        log.exit_code = status.code();
                        break None;
                    }
                    if last_output.elapsed() >= self.stall_timeout {
                        error!(
                            "Probe unresponsive: no output for {:?}",
                            self.stall_timeout
                        );
                        child.terminate().await;
                        break Some(ProbeVerdict::Stalled {
                            silent_for: self.stall_timeout,
                        });
                    }
                }
            }
        };

        if let Some(verdict) = fatal {
            return Ok(log.finish(verdict));
        }

        for line in child.drain(self.poll_interval).await {
            if !log.success_observed && self.is_success_line(&line) {
                log.success_observed = true;
            }
            log.output.push(line);
        }
        drop(child);

        let verdict = self.classify(&log).await;
        match &verdict {
            ProbeVerdict::Success => info!(
                "Probe finished in {:?} (exit code: {:?}), results at {}",
                log.start.elapsed(),
                log.exit_code,
                log.command.output_path.display()
            ),
            other => {
                let run = log.finish(other.clone());
                error!(
                    "Probe {}: {}",
                    other,
                    run.output_excerpt(FAILURE_EXCERPT_CHARS)
                );
                return Ok(run);
            }
        }

        Ok(log.finish(verdict))
    }

    /// Grace period after completion, capped by what is left of the timeout
    fn grace_budget(&self, elapsed: Duration) -> Duration {
        self.success_grace.min(self.timeout.saturating_sub(elapsed))
    }

    /// Give a process that reported completion a chance to exit on its own
    async fn wait_after_success(
        &self,
        child: &mut ChildGuard,
        grace: Duration,
        cancel: &CancellationToken,
    ) -> GraceWait {
        tokio::select! {
            biased;
            () = cancel.cancelled() => GraceWait::Cancelled,
            waited = tokio::time::timeout(grace, child.wait()) => match waited {
                Ok(status) => GraceWait::Exited(status),
                Err(_) => GraceWait::Expired,
            },
        }
    }

    /// Verdict for a run that ended without a fatal condition
    ///
    /// A non-zero exit is survivable when the indicator was seen and the
    /// output file is present and non-empty.
    async fn classify(&self, log: &RunLog) -> ProbeVerdict {
        let indicator_seen =
            log.success_observed || log.output.iter().any(|line| self.is_success_line(line));
        if !indicator_seen {
            return ProbeVerdict::NonZeroExit {
                code: log.exit_code,
            };
        }

        if log.exit_code == Some(0) || output_written(&log.command.output_path).await {
            ProbeVerdict::Success
        } else {
            ProbeVerdict::NonZeroExit {
                code: log.exit_code,
            }
        }
    }
}

#[async_trait]
impl ProbeRunner for ProcessSupervisor {
    async fn run(&self, command: &ProbeCommand, cancel: &CancellationToken) -> Result<ProbeRun> {
        ProcessSupervisor::run(self, command, cancel).await
    }
}

/// One read loop iteration
enum Tick {
    Line(String),
    Idle,
    Cancelled,
}

/// Outcome of the post-completion wait
enum GraceWait {
    Exited(std::io::Result<ExitStatus>),
    Expired,
    Cancelled,
}

/// Accumulated state of a run in progress
struct RunLog {
    command: ProbeCommand,
    started_at: DateTime<Utc>,
    start: Instant,
    output: Vec<String>,
    exit_code: Option<i32>,
    success_observed: bool,
}

impl RunLog {
    fn new(command: ProbeCommand) -> Self {
        Self {
            command,
            started_at: Utc::now(),
            start: Instant::now(),
            output: Vec::new(),
            exit_code: None,
            success_observed: false,
        }
    }

    fn finish(self, verdict: ProbeVerdict) -> ProbeRun {
        ProbeRun {
            command: self.command,
            started_at: self.started_at,
            elapsed: self.start.elapsed(),
            output: self.output,
            exit_code: self.exit_code,
            success_observed: self.success_observed,
            verdict,
        }
    }
}

/// Owns the child process and its output readers for one run
struct ChildGuard {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    streams_open: bool,
    readers: Vec<JoinHandle<()>>,
}

impl ChildGuard {
    /// Spawn the probe with stdout and stderr merged into one line channel
    fn spawn(command: &ProbeCommand) -> std::io::Result<Self> {
        let mut child = Command::new(&command.executable)
            .args(&command.args)
            .current_dir(&command.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, lines) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx));
        }

        Ok(Self {
            child,
            lines,
            streams_open: true,
            readers,
        })
    }

    /// Wait up to `poll` for the next output line
    async fn next_line(&mut self, poll: Duration) -> Option<String> {
        if !self.streams_open {
            tokio::time::sleep(poll).await;
            return None;
        }
        match tokio::time::timeout(poll, self.lines.recv()).await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                self.streams_open = false;
                None
            }
            Err(_) => None,
        }
    }

    /// Collect output still buffered after the process ended
    ///
    /// Stops at end-of-stream, or after `poll` of silence in case a
    /// descendant keeps the pipes open.
    async fn drain(&mut self, poll: Duration) -> Vec<String> {
        let mut drained = Vec::new();
        while self.streams_open {
            match tokio::time::timeout(poll, self.lines.recv()).await {
                Ok(Some(line)) => drained.push(line),
                Ok(None) => self.streams_open = false,
                Err(_) => break,
            }
        }
        drained
    }

    fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the process and reap it
    async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Probe process kill: {}", e);
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Forward a byte stream as lines, splitting on `\n` and `\r`
///
/// Probers redraw progress bars with bare carriage returns; each redraw
/// counts as output for stall detection.
fn spawn_line_reader<R>(mut reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Probe output stream error: {}", e);
                    break;
                }
            };
            pending.extend_from_slice(&buf[..n]);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let segment: Vec<u8> = pending.drain(..=pos).collect();
                if let Some(line) = decode_line(&segment)
                    && tx.send(line).is_err()
                {
                    return;
                }
            }
        }

        if let Some(line) = decode_line(&pending) {
            let _ = tx.send(line);
        }
    })
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim_end_matches(['\r', '\n']);
    (!line.trim().is_empty()).then(|| line.to_string())
}

/// Remove a result file left over from an earlier run
async fn remove_stale_output(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed stale result file: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Drop blank indicators; an empty substring matches every line
fn usable_indicators(indicators: impl Iterator<Item = String>) -> Vec<String> {
    indicators.filter(|s| !s.trim().is_empty()).collect()
}

async fn output_written(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
