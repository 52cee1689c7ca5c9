//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without spawning real probes or calling real DNS APIs.

#![allow(dead_code)]

use cfopt_core::config::{CfoptConfig, EngineConfig, ProbeConfig, ProviderConfig, RecordConfig};
use cfopt_core::error::{Error, Result};
use cfopt_core::probe::{ProbeCommand, ProbeRun, ProbeVerdict};
use cfopt_core::traits::{DnsProvider, DnsRecord, ProbeRunner, RecordTarget};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A two-row result file whose best candidate is `1.0.0.1`
pub const RESULTS: &str = "IP,Sent,Recv,Loss,Latency\n1.1.1.1,4,4,0,20.5\n1.0.0.1,4,4,0,15.2\n";

/// A ProbeRunner that writes canned results instead of spawning a process
pub struct ScriptedProbeRunner {
    /// Verdict to report
    verdict: ProbeVerdict,
    /// Result file content to write, if any
    results: Option<String>,
    /// Simulated probe duration
    delay: Duration,
    /// Block until cancelled instead of sleeping
    until_cancelled: bool,
    /// Fail with an I/O error instead of reporting a verdict
    io_error: bool,
    /// Call counter for run()
    run_call_count: Arc<AtomicUsize>,
    /// Runs currently in progress
    active: Arc<AtomicUsize>,
    /// Highest number of overlapping runs seen
    max_active: Arc<AtomicUsize>,
}

impl ScriptedProbeRunner {
    /// A probe that succeeds and writes `results`
    pub fn succeeding(results: &str) -> Self {
        Self::with_verdict(ProbeVerdict::Success, Some(results.to_string()))
    }

    /// A probe that fails with `verdict` and writes nothing
    pub fn failing(verdict: ProbeVerdict) -> Self {
        Self::with_verdict(verdict, None)
    }

    fn with_verdict(verdict: ProbeVerdict, results: Option<String>) -> Self {
        Self {
            verdict,
            results,
            delay: Duration::ZERO,
            until_cancelled: false,
            io_error: false,
            run_call_count: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take `delay` to conclude
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run until the cancellation token fires, then report `Cancelled`
    pub fn until_cancelled(mut self) -> Self {
        self.until_cancelled = true;
        self
    }

    /// Fail every run with an I/O error
    pub fn erroring(mut self) -> Self {
        self.io_error = true;
        self
    }

    /// Get the number of times run() was called
    pub fn run_call_count(&self) -> usize {
        self.run_call_count.load(Ordering::SeqCst)
    }

    /// Get the highest number of overlapping runs
    pub fn max_concurrent_runs(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Create a new ScriptedProbeRunner that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            verdict: other.verdict.clone(),
            results: other.results.clone(),
            delay: other.delay,
            until_cancelled: other.until_cancelled,
            io_error: other.io_error,
            run_call_count: Arc::clone(&other.run_call_count),
            active: Arc::clone(&other.active),
            max_active: Arc::clone(&other.max_active),
        }
    }
}

#[async_trait::async_trait]
impl ProbeRunner for ScriptedProbeRunner {
    async fn run(&self, command: &ProbeCommand, cancel: &CancellationToken) -> Result<ProbeRun> {
        self.run_call_count.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let started_at = chrono::Utc::now();
        let verdict = if self.until_cancelled {
            cancel.cancelled().await;
            ProbeVerdict::Cancelled
        } else {
            tokio::time::sleep(self.delay).await;
            self.verdict.clone()
        };

        if let Some(results) = &self.results {
            std::fs::create_dir_all(&command.work_dir)?;
            std::fs::write(&command.output_path, results)?;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.io_error {
            return Err(Error::Io(std::io::Error::other("disk unavailable")));
        }

        Ok(ProbeRun {
            command: command.clone(),
            started_at,
            elapsed: self.delay,
            output: vec!["scripted probe".to_string()],
            exit_code: Some(0),
            success_observed: verdict == ProbeVerdict::Success,
            verdict,
        })
    }
}

/// How the mock answers lookups
#[derive(Debug, Clone)]
pub enum LookupBehavior {
    /// A record with this id exists
    Found(String),
    /// No matching record
    Absent,
    /// The lookup call fails
    Fails,
}

/// How the mock answers writes
#[derive(Debug, Clone, Copy)]
pub enum WriteBehavior {
    /// Every write is accepted
    Accept,
    /// Every write is rejected with `success: false`
    Reject,
    /// Every write fails in transport
    Transport,
    /// The first `n` writes are rejected, later ones accepted
    RejectFirst(usize),
}

/// A mock DnsProvider that tracks calls
pub struct MockDnsProvider {
    lookup: LookupBehavior,
    write: WriteBehavior,
    /// Call counter for find_record()
    find_call_count: Arc<AtomicUsize>,
    /// Call counter for create_record()
    create_call_count: Arc<AtomicUsize>,
    /// Call counter for update_record()
    update_call_count: Arc<AtomicUsize>,
    /// Content of every write, in call order
    written_contents: Arc<Mutex<Vec<String>>>,
    /// Record ids passed to update_record()
    updated_ids: Arc<Mutex<Vec<String>>>,
}

impl MockDnsProvider {
    pub fn new(lookup: LookupBehavior, write: WriteBehavior) -> Self {
        Self {
            lookup,
            write,
            find_call_count: Arc::new(AtomicUsize::new(0)),
            create_call_count: Arc::new(AtomicUsize::new(0)),
            update_call_count: Arc::new(AtomicUsize::new(0)),
            written_contents: Arc::new(Mutex::new(Vec::new())),
            updated_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose record exists and accepts writes
    pub fn existing(record_id: &str) -> Self {
        Self::new(LookupBehavior::Found(record_id.to_string()), WriteBehavior::Accept)
    }

    /// A provider with no record that accepts writes
    pub fn empty() -> Self {
        Self::new(LookupBehavior::Absent, WriteBehavior::Accept)
    }

    pub fn find_call_count(&self) -> usize {
        self.find_call_count.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_call_count.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.update_call_count.load(Ordering::SeqCst)
    }

    /// Total calls of any kind
    pub fn total_call_count(&self) -> usize {
        self.find_call_count() + self.create_call_count() + self.update_call_count()
    }

    pub fn written_contents(&self) -> Vec<String> {
        self.written_contents.lock().unwrap().clone()
    }

    pub fn updated_ids(&self) -> Vec<String> {
        self.updated_ids.lock().unwrap().clone()
    }

    /// Create a new MockDnsProvider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            lookup: other.lookup.clone(),
            write: other.write,
            find_call_count: Arc::clone(&other.find_call_count),
            create_call_count: Arc::clone(&other.create_call_count),
            update_call_count: Arc::clone(&other.update_call_count),
            written_contents: Arc::clone(&other.written_contents),
            updated_ids: Arc::clone(&other.updated_ids),
        }
    }

    fn write_result(&self, target: &RecordTarget, id: &str, content: &str) -> Result<DnsRecord> {
        let writes = self.create_call_count() + self.update_call_count();
        self.written_contents.lock().unwrap().push(content.to_string());

        let accepted = match self.write {
            WriteBehavior::Accept => true,
            WriteBehavior::Reject => false,
            WriteBehavior::Transport => {
                return Err(Error::dns_transport("connection reset by peer"));
            }
            WriteBehavior::RejectFirst(n) => writes > n,
        };

        if !accepted {
            return Err(Error::dns_rejected("[1004] DNS Validation Error"));
        }
        Ok(DnsRecord {
            id: id.to_string(),
            name: target.name.clone(),
            record_type: target.record_type,
            content: content.to_string(),
            ttl: Some(target.ttl),
            proxied: Some(target.proxied),
        })
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn find_record(&self, target: &RecordTarget) -> Result<Option<DnsRecord>> {
        self.find_call_count.fetch_add(1, Ordering::SeqCst);
        match &self.lookup {
            LookupBehavior::Found(id) => Ok(Some(DnsRecord {
                id: id.clone(),
                name: target.name.clone(),
                record_type: target.record_type,
                content: "104.16.0.1".to_string(),
                ttl: Some(1),
                proxied: Some(false),
            })),
            LookupBehavior::Absent => Ok(None),
            LookupBehavior::Fails => Err(Error::dns_lookup("HTTP 502 Bad Gateway")),
        }
    }

    async fn create_record(&self, target: &RecordTarget, content: &str) -> Result<DnsRecord> {
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.write_result(target, "created-id", content)
    }

    async fn update_record(
        &self,
        target: &RecordTarget,
        record_id: &str,
        content: &str,
    ) -> Result<DnsRecord> {
        self.update_call_count.fetch_add(1, Ordering::SeqCst);
        self.updated_ids.lock().unwrap().push(record_id.to_string());
        self.write_result(target, record_id, content)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Helper to create a minimal CfoptConfig for testing
///
/// The probe works in `work_dir`; DNS retries have no delay.
pub fn minimal_config(work_dir: &Path) -> CfoptConfig {
    CfoptConfig {
        provider: ProviderConfig::Cloudflare {
            api_token: "test-token".to_string(),
            api_base: None,
            dry_run: false,
        },
        record: RecordConfig::new("zone-1", "example.com").with_sub_domain("edge"),
        probe: ProbeConfig {
            executable: Some(work_dir.join("cfst")),
            work_dir: work_dir.to_path_buf(),
            ..ProbeConfig::default()
        },
        engine: EngineConfig {
            retry_count: 3,
            retry_interval_secs: 0,
            interval_secs: 1,
            error_cooldown_secs: 300,
            propagate_cancellation: false,
            event_channel_capacity: 100,
        },
    }
}
