//! Update orchestrator
//!
//! The UpdateOrchestrator is responsible for:
//! - Running the latency probe via ProbeRunner
//! - Selecting the lowest-latency candidate from the result file
//! - Pointing the DNS record at it via DnsReconciler, with retry
//! - Repeating the cycle on an interval until cancelled
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ProbeRun    ┌──────────────────────┐
//! │ ProbeRunner │──────────────►│ UpdateOrchestrator   │
//! └─────────────┘               └──────────────────────┘
//!                                          │
//!         ┌────────────────────────────────┼──────────────────────┐
//!         │                                │                      │
//!         ▼                                ▼                      ▼
//! ┌───────────────┐             ┌──────────────────┐      ┌─────────────┐
//! │ results       │             │ DnsReconciler    │      │   Events    │
//! │ (select best) │             │ (lookup + write) │      │  (notify)   │
//! └───────────────┘             └──────────────────┘      └─────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Acquire the per-target gate
//! 2. Check required settings
//! 3. Run the probe; anything but `Success` ends the run before DNS
//! 4. Load and select the best candidate
//! 5. Reconcile, retrying up to `retry_count` attempts with a fixed delay
//! 6. Emit events for monitoring/logging

mod gate;
mod outcome;

pub use gate::TargetGate;
pub use outcome::{DnsOutcome, ProbeReport, ProbeStatus, RunOutcome};

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::CfoptConfig;
use crate::error::{Error, Result};
use crate::probe::{ProbeRun, ProbeVerdict};
use crate::reconcile::DnsReconciler;
use crate::results::{self, Candidate};
use crate::traits::{DnsProvider, ProbeRunner, RecordTarget};

/// Events emitted by the UpdateOrchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A run acquired its target and started
    RunStarted { target: String },

    /// The probe reached a verdict
    ProbeFinished {
        verdict: ProbeVerdict,
        elapsed: Duration,
    },

    /// A candidate was chosen for the record
    CandidateSelected { address: String, latency_ms: f64 },

    /// One DNS attempt failed
    ReconcileAttemptFailed {
        target: String,
        attempt: usize,
        error: String,
    },

    /// The record now points at the selected candidate
    RecordApplied {
        target: String,
        content: String,
        created: bool,
        attempts: usize,
    },

    /// The run ended without applying a record
    RunFailed { target: String, error: String },

    /// The periodic loop exited
    LoopStopped { reason: String },
}

/// Probe → select → reconcile orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateOrchestrator::new()`]
/// 2. Call [`UpdateOrchestrator::run_once()`] on demand, or
///    [`UpdateOrchestrator::run_periodically()`] for the background loop
/// 3. Cancel the token passed to the loop to stop it
///
/// ## Concurrency
///
/// Runs for the same (zone, name, type) are serialized by a [`TargetGate`].
/// Orchestrators that should exclude each other must share one gate via
/// [`UpdateOrchestrator::with_gate()`].
///
/// ## Load Resistance
///
/// - **Bounded event channel**: Prevents unbounded memory growth
/// - **Event dropping**: When the channel is full, new events are dropped (logged)
/// - **Error cooldown**: The periodic loop pauses after unexpected errors
pub struct UpdateOrchestrator {
    /// Optimizer configuration
    config: CfoptConfig,

    /// Probe runner
    runner: Box<dyn ProbeRunner>,

    /// DNS reconciliation over the configured provider
    reconciler: DnsReconciler,

    /// Per-target run serialization
    gate: TargetGate,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl UpdateOrchestrator {
    /// Create a new orchestrator
    ///
    /// Required settings (credential, zone, domain) are checked per run, not
    /// here, so a loop can start before they are filled in.
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver) where event_receiver yields engine events
    pub fn new(
        config: CfoptConfig,
        runner: Box<dyn ProbeRunner>,
        provider: Box<dyn DnsProvider>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.probe.validate()?;
        config.engine.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let orchestrator = Self {
            config,
            runner,
            reconciler: DnsReconciler::new(provider),
            gate: TargetGate::new(),
            event_tx: tx,
        };

        Ok((orchestrator, rx))
    }

    /// Share a gate with other orchestrators
    pub fn with_gate(mut self, gate: TargetGate) -> Self {
        self.gate = gate;
        self
    }

    /// The gate this orchestrator serializes on
    pub fn gate(&self) -> &TargetGate {
        &self.gate
    }

    /// The configuration this orchestrator runs with
    pub fn config(&self) -> &CfoptConfig {
        &self.config
    }

    /// Run one full cycle
    ///
    /// Never fails: every failure is reported in [`RunOutcome::failure`].
    pub async fn run_once(&self) -> RunOutcome {
        self.run_once_with(&CancellationToken::new()).await
    }

    /// Run one full cycle, killing the probe if `cancel` fires
    pub async fn run_once_with(&self, cancel: &CancellationToken) -> RunOutcome {
        match self.try_run_once(cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Run aborted: {}", e);
                let target = self.config.record.target();
                self.emit_event(EngineEvent::RunFailed {
                    target: target.name.clone(),
                    error: e.to_string(),
                });
                RunOutcome::new(target.key()).failed(e)
            }
        }
    }

    /// Run one full cycle
    ///
    /// # Returns
    ///
    /// - `Ok(RunOutcome)`: the cycle concluded; pipeline failures (probe,
    ///   selection, DNS) are in `failure`
    /// - `Err(Error)`: an unexpected error (I/O) interrupted the cycle
    pub async fn try_run_once(&self, cancel: &CancellationToken) -> Result<RunOutcome> {
        let target = self.config.record.target();
        let key = target.key();
        let span = info_span!("run", target = %key);

        async {
            let _guard = match self.gate.try_acquire(&key) {
                Some(guard) => guard,
                None => {
                    info!("Another run for {} is in progress, waiting", key);
                    self.gate.acquire(&key).await
                }
            };

            self.emit_event(EngineEvent::RunStarted {
                target: target.name.clone(),
            });

            let outcome = self.run_pipeline(&target, cancel).await?;
            match &outcome.failure {
                Some(e) => {
                    error!("Run failed: {}", e);
                    self.emit_event(EngineEvent::RunFailed {
                        target: target.name.clone(),
                        error: e.to_string(),
                    });
                }
                None => info!("Run complete"),
            }
            Ok::<_, Error>(outcome)
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &self,
        target: &RecordTarget,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let mut outcome = RunOutcome::new(target.key());

        if let Err(e) = self.check_settings() {
            return Ok(outcome.failed(e));
        }

        let run = self.probe(cancel).await?;
        outcome.verdict = Some(run.verdict.clone());
        if let Some(failure) = run.failure() {
            return Ok(outcome.failed(failure));
        }

        let candidates = match results::load_candidates(&run.command.output_path).await {
            Ok(candidates) => candidates,
            Err(e @ Error::ResultFileMissing(_)) => return Ok(outcome.failed(e)),
            Err(e) => return Err(e),
        };
        let best = match results::select_best(&candidates) {
            Some(best) => best.clone(),
            None => return Ok(outcome.failed(Error::NoValidCandidate)),
        };
        self.announce_selection(&best, candidates.len());
        outcome.selected = Some(best.clone());

        let (dns, failure) = self.reconcile_with_retry(target, &best.address).await;
        outcome.dns = dns;
        outcome.failure = failure;
        Ok(outcome)
    }

    /// Required settings present and record settings valid
    fn check_settings(&self) -> Result<()> {
        let missing = self.config.missing_fields();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )));
        }
        self.config.record.validate()
    }

    /// Run the probe and report its verdict
    async fn probe(&self, cancel: &CancellationToken) -> Result<ProbeRun> {
        let command = self.config.probe.command();
        let run = self.runner.run(&command, cancel).await?;

        debug!(
            "Probe verdict: {} after {:?} ({} output lines)",
            run.verdict,
            run.elapsed,
            run.output.len()
        );
        self.emit_event(EngineEvent::ProbeFinished {
            verdict: run.verdict.clone(),
            elapsed: run.elapsed,
        });
        Ok(run)
    }

    fn announce_selection(&self, best: &Candidate, pool: usize) {
        info!(
            "Selected {} ({:.2} ms) from {} candidates",
            best.address, best.latency_ms, pool
        );
        self.emit_event(EngineEvent::CandidateSelected {
            address: best.address.clone(),
            latency_ms: best.latency_ms,
        });
    }

    /// Reconcile with a fixed number of attempts
    ///
    /// Each attempt performs its own lookup, so a record id is never reused
    /// across attempts.
    async fn reconcile_with_retry(
        &self,
        target: &RecordTarget,
        content: &str,
    ) -> (DnsOutcome, Option<Error>) {
        let attempts = self.config.engine.retry_count.max(1);
        let delay = self.config.engine.retry_interval();

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.reconciler.reconcile(target, content).await {
                Ok(action) => {
                    self.emit_event(EngineEvent::RecordApplied {
                        target: target.name.clone(),
                        content: content.to_string(),
                        created: matches!(action, crate::reconcile::ReconcileAction::Created(_)),
                        attempts: attempt,
                    });
                    return (
                        DnsOutcome::Applied {
                            action,
                            attempts: attempt,
                        },
                        None,
                    );
                }
                Err(e) => {
                    warn!(
                        "DNS attempt {}/{} for {} failed: {}",
                        attempt, attempts, target.name, e
                    );
                    self.emit_event(EngineEvent::ReconcileAttemptFailed {
                        target: target.name.clone(),
                        attempt,
                        error: e.to_string(),
                    });
                    last_error = Some(e);

                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| Error::Other("No DNS attempt was made".to_string()));
        (DnsOutcome::Failed { attempts }, Some(error))
    }

    /// Run the probe and selection without touching DNS
    ///
    /// # Returns
    ///
    /// - `Ok(ProbeReport)`: the probe succeeded; candidates may be empty
    /// - `Err(Error)`: the probe failed or the result file is missing
    pub async fn probe_only(&self, cancel: &CancellationToken) -> Result<ProbeReport> {
        let key = self.config.record.target().key();
        let _guard = self.gate.acquire(&key).await;

        let run = self.probe(cancel).await?;
        if let Some(failure) = run.failure() {
            return Err(failure);
        }

        let candidates = results::load_candidates(&run.command.output_path).await?;
        if let Some(best) = results::select_best(&candidates) {
            self.announce_selection(best, candidates.len());
        }
        Ok(ProbeReport { run, candidates })
    }

    /// Report tool presence, result file state, and missing settings
    pub async fn status(&self) -> ProbeStatus {
        let executable = self.config.probe.resolve_executable();
        let result_file = self.config.probe.output_path();

        let tool_present = tokio::fs::metadata(&executable)
            .await
            .is_ok_and(|meta| meta.is_file());

        let (result_size, result_modified) = match tokio::fs::metadata(&result_file).await {
            Ok(meta) if meta.is_file() => (
                Some(meta.len()),
                meta.modified().ok().map(DateTime::<Utc>::from),
            ),
            _ => (None, None),
        };

        ProbeStatus {
            executable,
            tool_present,
            result_file,
            result_size,
            result_modified,
            record_name: self.config.record.full_name(),
            missing_fields: self.config.missing_fields(),
        }
    }

    /// Run cycles on the configured interval until `cancel` fires
    ///
    /// Each iteration sleeps first, then skips the cycle (with a warning)
    /// when required settings are missing. Cancellation is observed while
    /// sleeping; a cycle in flight runs to completion unless
    /// `propagate_cancellation` is set, in which case the probe is killed.
    pub async fn run_periodically(&self, cancel: &CancellationToken) {
        let interval = self.config.engine.interval();
        let cooldown = self.config.engine.error_cooldown();
        info!(
            "Periodic runs for {} every {:?}",
            self.config.record.full_name(),
            interval
        );

        let probe_cancel = if self.config.engine.propagate_cancellation {
            cancel.clone()
        } else {
            CancellationToken::new()
        };

        loop {
            if !sleep_or_cancel(interval, cancel).await {
                break;
            }

            let missing = self.config.missing_fields();
            if !missing.is_empty() {
                warn!(
                    "Skipping run, missing required settings: {}",
                    missing.join(", ")
                );
                continue;
            }

            match self.try_run_once(&probe_cancel).await {
                Ok(outcome) if outcome.is_success() => {
                    debug!("Periodic run applied {:?}", outcome.selected.map(|c| c.address));
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        "Unexpected error in periodic run, cooling down for {:?}: {}",
                        cooldown, e
                    );
                    if !sleep_or_cancel(cooldown, cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Periodic loop stopped");
        self.emit_event(EngineEvent::LoopStopped {
            reason: "Cancelled".to_string(),
        });
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Full channel: drop the event rather than block a run
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Sleep for `duration`; `false` when cancelled first
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
