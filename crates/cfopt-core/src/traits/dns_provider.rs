// # DNS Provider Trait
//
// Defines the interface for reading and writing DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `cfopt-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfopt_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//     let target = /* RecordTarget */;
//
//     match provider.find_record(&target).await? {
//         Some(record) => provider.update_record(&target, &record.id, "104.16.1.1").await?,
//         None => provider.create_record(&target, "104.16.1.1").await?,
//     };
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RecordType;

/// The remote record a reconciliation targets
///
/// Identity is (zone, name, type); ttl and proxied are write settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordTarget {
    /// Zone that owns the record
    pub zone_id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// TTL written with the record (1 = automatic)
    pub ttl: u32,
    /// Proxied flag written with the record
    pub proxied: bool,
}

impl RecordTarget {
    /// Key used to serialize runs against the same remote record
    pub fn key(&self) -> TargetKey {
        TargetKey {
            zone_id: self.zone_id.clone(),
            name: self.name.clone(),
            record_type: self.record_type,
        }
    }

    /// Body for a create or update call
    pub fn payload(&self, content: &str) -> RecordPayload {
        RecordPayload {
            record_type: self.record_type,
            name: self.name.clone(),
            content: content.to_string(),
            ttl: self.ttl,
            proxied: self.proxied,
        }
    }
}

/// (zone, name, type) identity of a remote record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub zone_id: String,
    pub name: String,
    pub record_type: RecordType,
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.zone_id, self.name, self.record_type)
    }
}

/// Body of a create or update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// A DNS record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// The record ID (provider-assigned, opaque)
    pub id: String,
    /// The record name
    pub name: String,
    /// The record type
    pub record_type: RecordType,
    /// Current content
    pub content: String,
    /// Time-to-live for the record
    pub ttl: Option<u32>,
    /// Proxied flag, when the provider has one
    pub proxied: Option<bool>,
}

/// Trait for DNS provider implementations
///
/// Each method is exactly one API call. Implementations must be
/// thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the orchestrator handles retry)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff (owned by `UpdateOrchestrator`)
/// - ❌ Cache record ids between calls (every attempt re-resolves the id)
/// - ❌ Decide between create and update (owned by `DnsReconciler`)
///
/// ## Error Classification
///
/// - `Error::DnsLookupFailed`: `find_record` could not list records
/// - `Error::DnsWriteRejected`: the provider answered with `success: false`
/// - `Error::DnsTransport`: the request failed before the provider gave a verdict
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up a record by exact name and type
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: the record exists
    /// - `Ok(None)`: the zone has no matching record
    /// - `Err(Error)`: the lookup could not be completed
    async fn find_record(&self, target: &RecordTarget) -> Result<Option<DnsRecord>, crate::Error>;

    /// Create a record with the given content
    async fn create_record(
        &self,
        target: &RecordTarget,
        content: &str,
    ) -> Result<DnsRecord, crate::Error>;

    /// Overwrite the content of an existing record
    ///
    /// # Parameters
    ///
    /// - `record_id`: id returned by `find_record` in the same attempt
    async fn update_record(
        &self,
        target: &RecordTarget,
        record_id: &str,
        content: &str,
    ) -> Result<DnsRecord, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
