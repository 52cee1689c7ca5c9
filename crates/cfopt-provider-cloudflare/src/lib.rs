// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of `DnsProvider`.
//
// - ✅ One HTTP request per trait call
// - ✅ Full error propagation (the orchestrator owns retry)
// - ✅ Per-request timeout (10 seconds)
// - ✅ `success` flag checked on every response, independent of HTTP status
// - ✅ Dry-run mode for safe testing
// - ✅ Configurable API base URL
// - ❌ NO retry or backoff (owned by UpdateOrchestrator)
// - ❌ NO record id caching (re-resolved on every attempt)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

pub mod types;

use async_trait::async_trait;
use cfopt_core::config::ProviderConfig;
use cfopt_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, RecordTarget};
use cfopt_core::{Error, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

use types::{ApiFailure, CloudflareDnsRecord};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is isolated, stateless, and single-shot. All coordination
/// (retries, scheduling, create-or-update decisions) is owned by the core.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform lookups
/// - Log the intended POST/PUT payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL, without trailing slash
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform lookups but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `api_base`: API base URL override (defaults to [`CLOUDFLARE_API_BASE`])
    /// - `dry_run`: If true, perform lookups but skip writes
    pub fn new(api_token: impl Into<String>, api_base: Option<&str>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            api_base: api_base
                .unwrap_or(CLOUDFLARE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            client,
            dry_run,
        })
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// `/zones/{zone}/dns_records`
    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, zone_id)
    }

    /// `/zones/{zone}/dns_records/{id}`
    fn record_url(&self, zone_id: &str, record_id: &str) -> String {
        format!("{}/{}", self.records_url(zone_id), record_id)
    }

    /// Send one authenticated request and classify the answer
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> std::result::Result<T, ApiFailure> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(describe_request_error(&e)))?;

        let status = response.status();
        tracing::debug!("Cloudflare responded: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| ApiFailure::Transport(format!("Failed to read response: {}", e)))?;

        types::interpret(status.as_u16(), &body)
    }

    fn into_record(record: CloudflareDnsRecord, target: &RecordTarget) -> DnsRecord {
        DnsRecord {
            id: record.id,
            name: record.name,
            record_type: record.record_type.parse().unwrap_or(target.record_type),
            content: record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        }
    }

    /// What a skipped write would have produced
    fn dry_run_record(target: &RecordTarget, record_id: &str, content: &str) -> DnsRecord {
        DnsRecord {
            id: record_id.to_string(),
            name: target.name.clone(),
            record_type: target.record_type,
            content: content.to_string(),
            ttl: Some(target.ttl),
            proxied: Some(target.proxied),
        }
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Request timed out after {:?}", REQUEST_TIMEOUT)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("HTTP request failed: {}", e)
    }
}

fn write_error(failure: ApiFailure) -> Error {
    match failure {
        ApiFailure::Rejected(message) => Error::dns_rejected(message),
        ApiFailure::Transport(message) => Error::dns_transport(message),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=edge.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(&self, target: &RecordTarget) -> Result<Option<DnsRecord>> {
        tracing::debug!(
            "Looking up {} record {} in zone {}",
            target.record_type,
            target.name,
            target.zone_id
        );

        let request = self
            .client
            .get(self.records_url(&target.zone_id))
            .query(&[("name", target.name.as_str()), ("type", target.record_type.as_str())]);

        let records: Vec<CloudflareDnsRecord> = self
            .send(request)
            .await
            .map_err(|failure| Error::dns_lookup(failure.to_string()))?;

        let found = records
            .into_iter()
            .find(|r| types::record_matches(r, &target.name, target.record_type.as_str()))
            .map(|r| Self::into_record(r, target));

        match &found {
            Some(record) => tracing::debug!("Found record id {} -> {}", record.id, record.content),
            None => tracing::debug!("No matching record"),
        }
        Ok(found)
    }

    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// { "type": "A", "name": "edge.example.com", "content": "104.16.1.1", "ttl": 1, "proxied": false }
    /// ```
    async fn create_record(&self, target: &RecordTarget, content: &str) -> Result<DnsRecord> {
        let payload = target.payload(content);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.records_url(&target.zone_id),
                serde_json::to_string(&payload)?
            );
            return Ok(Self::dry_run_record(target, "dry-run", content));
        }

        let request = self
            .client
            .post(self.records_url(&target.zone_id))
            .json(&payload);

        let record: CloudflareDnsRecord = self.send(request).await.map_err(write_error)?;
        tracing::debug!("Cloudflare created record id {}", record.id);
        Ok(Self::into_record(record, target))
    }

    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// { "type": "A", "name": "edge.example.com", "content": "104.16.1.1", "ttl": 1, "proxied": false }
    /// ```
    async fn update_record(
        &self,
        target: &RecordTarget,
        record_id: &str,
        content: &str,
    ) -> Result<DnsRecord> {
        let payload = target.payload(content);
        let url = self.record_url(&target.zone_id, record_id);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                serde_json::to_string(&payload)?
            );
            return Ok(Self::dry_run_record(target, record_id, content));
        }

        let request = self.client.put(url).json(&payload);

        let record: CloudflareDnsRecord = self.send(request).await.map_err(write_error)?;
        Ok(Self::into_record(record, target))
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                api_base,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    api_base.as_deref(),
                    *dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use cfopt_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// cfopt_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &cfopt_core::ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
