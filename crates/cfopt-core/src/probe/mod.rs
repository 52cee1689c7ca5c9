//! Probe runs
//!
//! A probe run is one invocation of the external latency prober. The
//! [`ProcessSupervisor`] owns the child process for the duration of the run
//! and hands back a [`ProbeRun`] describing what happened.
//!
//! ## Verdict
//!
//! ```text
//! Success  = (exit 0            AND indicator seen)
//!         OR (indicator seen    AND output file non-empty)
//! ```
//!
//! A prober may exit non-zero after writing valid results; the output file is
//! the tie-breaker. Everything that is not `Success` maps to an [`Error`]
//! through [`ProbeRun::failure`].

mod supervisor;

pub use supervisor::ProcessSupervisor;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Executable, arguments, and file locations for one probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    /// Probe executable
    pub executable: PathBuf,
    /// Arguments, including the output flag
    pub args: Vec<String>,
    /// Working directory for the child
    pub work_dir: PathBuf,
    /// File the probe writes its results to
    pub output_path: PathBuf,
}

/// Terminal state of a probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Results were produced
    Success,
    /// The wall-clock budget ran out
    Timeout {
        /// Budget that was exceeded
        after: Duration,
    },
    /// The prober went silent for longer than the stall window
    Stalled {
        /// Silence window that was exceeded
        silent_for: Duration,
    },
    /// The prober finished without a verifiable success signal
    NonZeroExit {
        /// Exit code, if the process exited on its own
        code: Option<i32>,
    },
    /// The executable was not found
    ToolMissing,
    /// The run was cancelled from outside
    Cancelled,
}

impl std::fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeVerdict::Success => f.write_str("success"),
            ProbeVerdict::Timeout { after } => write!(f, "timeout after {:?}", after),
            ProbeVerdict::Stalled { silent_for } => write!(f, "stalled for {:?}", silent_for),
            ProbeVerdict::NonZeroExit { code: Some(code) } => write!(f, "failed (exit {})", code),
            ProbeVerdict::NonZeroExit { code: None } => f.write_str("failed (no exit code)"),
            ProbeVerdict::ToolMissing => f.write_str("tool missing"),
            ProbeVerdict::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Record of one probe invocation
#[derive(Debug, Clone)]
pub struct ProbeRun {
    /// Command that was run
    pub command: ProbeCommand,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// How long the run took
    pub elapsed: Duration,
    /// Merged stdout/stderr lines, in arrival order
    pub output: Vec<String>,
    /// Exit code, if the process exited on its own
    pub exit_code: Option<i32>,
    /// Whether a success indicator appeared in the output
    pub success_observed: bool,
    /// Terminal verdict
    pub verdict: ProbeVerdict,
}

impl ProbeRun {
    /// Whether the run produced results
    pub fn is_success(&self) -> bool {
        self.verdict == ProbeVerdict::Success
    }

    /// The classified failure for a run that did not succeed
    pub fn failure(&self) -> Option<Error> {
        match &self.verdict {
            ProbeVerdict::Success => None,
            ProbeVerdict::Timeout { after } => Some(Error::ProcessTimeout(*after)),
            ProbeVerdict::Stalled { silent_for } => Some(Error::ProcessStalled(*silent_for)),
            ProbeVerdict::NonZeroExit { code } => Some(Error::ProcessNonZeroExit { code: *code }),
            ProbeVerdict::ToolMissing => Some(Error::ToolMissing(self.command.executable.clone())),
            ProbeVerdict::Cancelled => Some(Error::ProcessCancelled),
        }
    }

    /// The first `max_chars` characters of the collected output
    pub fn output_excerpt(&self, max_chars: usize) -> String {
        let joined = self.output.join("\n");
        match joined.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &joined[..cut]),
            None => joined,
        }
    }
}
