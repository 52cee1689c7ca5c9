//! Reports returned by the orchestrator

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::error::Error;
use crate::probe::{ProbeRun, ProbeVerdict};
use crate::reconcile::ReconcileAction;
use crate::results::{self, Candidate};
use crate::traits::TargetKey;

/// DNS stage of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    /// The run ended before DNS was touched
    Skipped,
    /// A write was accepted
    Applied {
        action: ReconcileAction,
        /// Attempts used, including the successful one
        attempts: usize,
    },
    /// Every attempt failed
    Failed { attempts: usize },
}

/// Result of one orchestration cycle
#[derive(Debug)]
pub struct RunOutcome {
    /// Record the run targeted
    pub target: TargetKey,
    /// Probe verdict, when the probe ran
    pub verdict: Option<ProbeVerdict>,
    /// Lowest-latency candidate, when one was found
    pub selected: Option<Candidate>,
    /// What happened at the DNS provider
    pub dns: DnsOutcome,
    /// Why the run did not apply a record
    pub failure: Option<Error>,
}

impl RunOutcome {
    pub(crate) fn new(target: TargetKey) -> Self {
        Self {
            target,
            verdict: None,
            selected: None,
            dns: DnsOutcome::Skipped,
            failure: None,
        }
    }

    pub(crate) fn failed(mut self, error: Error) -> Self {
        self.failure = Some(error);
        self
    }

    /// Whether the probe produced results
    pub fn probe_succeeded(&self) -> bool {
        self.verdict == Some(ProbeVerdict::Success)
    }

    /// Whether the record now points at the selected candidate
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && matches!(self.dns, DnsOutcome::Applied { .. })
    }
}

/// Result of a probe-only run
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// The probe invocation
    pub run: ProbeRun,
    /// Usable rows from the result file, in file order
    pub candidates: Vec<Candidate>,
}

impl ProbeReport {
    /// The lowest-latency candidate
    pub fn best(&self) -> Option<&Candidate> {
        results::select_best(&self.candidates)
    }

    /// The `n` best candidates
    pub fn top(&self, n: usize) -> Vec<&Candidate> {
        results::top_candidates(&self.candidates, n)
    }
}

/// Snapshot of the probe tool and settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeStatus {
    /// Resolved probe executable
    pub executable: PathBuf,
    /// Whether the executable exists
    pub tool_present: bool,
    /// Result file location
    pub result_file: PathBuf,
    /// Result file size, when it exists
    pub result_size: Option<u64>,
    /// Result file modification time, when known
    pub result_modified: Option<DateTime<Utc>>,
    /// Fully-qualified record name
    pub record_name: String,
    /// Required settings that are not set
    pub missing_fields: Vec<&'static str>,
}

impl ProbeStatus {
    /// Whether a run could start right now
    pub fn is_ready(&self) -> bool {
        self.tool_present && self.missing_fields.is_empty()
    }
}
