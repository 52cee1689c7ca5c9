//! DNS reconciliation
//!
//! One reconciliation attempt points a record at new content:
//!
//! 1. Look the record up by exact name and type
//! 2. Found: update it in place. Not found: create it.
//!
//! A failed lookup is logged and treated as "not found", so the attempt
//! falls through to a create. Nothing here retries; the orchestrator owns
//! retry and calls [`DnsReconciler::reconcile`] once per attempt, which
//! re-resolves the record id every time.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::traits::{DnsProvider, DnsRecord, RecordTarget};

/// What a successful reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No record existed; one was created
    Created(DnsRecord),
    /// An existing record was overwritten
    Updated(DnsRecord),
}

impl ReconcileAction {
    /// The record as the provider reported it after the write
    pub fn record(&self) -> &DnsRecord {
        match self {
            ReconcileAction::Created(record) | ReconcileAction::Updated(record) => record,
        }
    }

    /// Past-tense verb for logs
    pub fn verb(&self) -> &'static str {
        match self {
            ReconcileAction::Created(_) => "created",
            ReconcileAction::Updated(_) => "updated",
        }
    }
}

/// Creates or updates one remote record per call
pub struct DnsReconciler {
    provider: Box<dyn DnsProvider>,
}

impl DnsReconciler {
    /// Wrap a provider
    pub fn new(provider: Box<dyn DnsProvider>) -> Self {
        Self { provider }
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Look up the target record
    ///
    /// Lookup failures are logged and reported as `None`.
    pub async fn lookup(&self, target: &RecordTarget) -> Option<DnsRecord> {
        match self.provider.find_record(target).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "Lookup of {} via {} failed, treating as absent: {}",
                    target.name,
                    self.provider_name(),
                    e
                );
                None
            }
        }
    }

    /// Point the target record at `content`
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileAction)`: the write was accepted
    /// - `Err(Error::DnsWriteRejected)`: the provider refused the write
    /// - `Err(Error::DnsTransport)`: the write never reached a verdict
    pub async fn reconcile(&self, target: &RecordTarget, content: &str) -> Result<ReconcileAction> {
        match self.lookup(target).await {
            Some(existing) => {
                debug!(
                    "Found {} record {} (id {}) -> {}",
                    target.record_type, existing.name, existing.id, existing.content
                );
                let record = self
                    .provider
                    .update_record(target, &existing.id, content)
                    .await?;
                info!(
                    "Updated {} record {}: {} -> {}",
                    target.record_type, target.name, existing.content, content
                );
                Ok(ReconcileAction::Updated(record))
            }
            None => {
                debug!(
                    "No {} record named {}, creating",
                    target.record_type, target.name
                );
                let record = self.provider.create_record(target, content).await?;
                info!(
                    "Created {} record {} -> {}",
                    target.record_type, target.name, content
                );
                Ok(ReconcileAction::Created(record))
            }
        }
    }
}

impl std::fmt::Debug for DnsReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsReconciler")
            .field("provider", &self.provider_name())
            .finish()
    }
}
