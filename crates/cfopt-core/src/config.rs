//! Configuration types for the edge optimizer
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::probe::ProbeCommand;
use crate::traits::RecordTarget;

/// Main optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfoptConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// DNS record to keep pointed at the best candidate
    pub record: RecordConfig,

    /// Probe tool configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl CfoptConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            provider: ProviderConfig::default(),
            record: RecordConfig::default(),
            probe: ProbeConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Names of required settings that are not set
    ///
    /// The periodic loop checks this on every tick and skips the run
    /// instead of failing when something is missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.provider.credential().is_some_and(str::is_empty) {
            missing.push("cf_token");
        }
        if self.record.zone_id.trim().is_empty() {
            missing.push("zone_id");
        }
        if self.record.main_domain.trim().is_empty() {
            missing.push("main_domain");
        }
        missing
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(crate::Error::config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )));
        }

        self.provider.validate()?;
        self.record.validate()?;
        self.probe.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl Default for CfoptConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// API base URL override
        #[serde(default)]
        api_base: Option<String>,
        /// Perform lookups but skip writes
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                api_base,
                ..
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if let Some(base) = api_base
                    && !base.starts_with("https://")
                    && !base.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "Cloudflare API base must be an HTTP(S) URL. Got: {}",
                        base
                    )));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }

    /// The bearer credential, for providers that take one
    pub fn credential(&self) -> Option<&str> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => Some(api_token),
            ProviderConfig::Custom { .. } => None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            api_token: String::new(),
            api_base: None,
            dry_run: false,
        }
    }
}

/// DNS record configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Zone that owns the record
    pub zone_id: String,

    /// Main domain (e.g., "example.com")
    pub main_domain: String,

    /// Optional sub-domain label(s) prepended to the main domain
    #[serde(default)]
    pub sub_domain: Option<String>,

    /// Record type
    #[serde(default)]
    pub record_type: RecordType,

    /// Record TTL; 1 means automatic
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Whether the record is proxied by the provider
    #[serde(default)]
    pub proxied: bool,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(zone_id: impl Into<String>, main_domain: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            main_domain: main_domain.into(),
            sub_domain: None,
            record_type: RecordType::A,
            ttl: default_ttl(),
            proxied: false,
        }
    }

    /// Set the sub-domain
    pub fn with_sub_domain(mut self, sub_domain: impl Into<String>) -> Self {
        let sub_domain = sub_domain.into();
        self.sub_domain = (!sub_domain.is_empty()).then_some(sub_domain);
        self
    }

    /// Set the record type
    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    /// Fully-qualified record name
    pub fn full_name(&self) -> String {
        match self.sub_domain.as_deref().map(str::trim) {
            Some(sub) if !sub.is_empty() => format!("{}.{}", sub, self.main_domain.trim()),
            _ => self.main_domain.trim().to_string(),
        }
    }

    /// The remote record this configuration points at
    pub fn target(&self) -> RecordTarget {
        RecordTarget {
            zone_id: self.zone_id.trim().to_string(),
            name: self.full_name(),
            record_type: self.record_type,
            ttl: self.ttl,
            proxied: self.proxied,
        }
    }

    /// Validate the record configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let name = self.full_name();
        if name.len() > 253 {
            return Err(crate::Error::config(format!(
                "Record name too long: {} chars (max 253)",
                name.len()
            )));
        }
        if name.split('.').any(str::is_empty) {
            return Err(crate::Error::config(format!(
                "Record name has an empty label: '{}'",
                name
            )));
        }
        if self.ttl != 1 && !(60..=86400).contains(&self.ttl) {
            return Err(crate::Error::config(format!(
                "Record TTL must be 1 (automatic) or between 60 and 86400. Got: {}",
                self.ttl
            )));
        }
        Ok(())
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// A record (IPv4)
    #[default]
    A,
    /// AAAA record (IPv6)
    Aaaa,
    Cname,
    Mx,
    Txt,
    Srv,
    Loc,
    Ns,
    Cert,
    Dnskey,
    Ds,
    Naptr,
    Smimea,
    Sshfp,
    Tlsa,
    Uri,
}

impl RecordType {
    /// All supported record types
    pub const ALL: [RecordType; 16] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Srv,
        RecordType::Loc,
        RecordType::Ns,
        RecordType::Cert,
        RecordType::Dnskey,
        RecordType::Ds,
        RecordType::Naptr,
        RecordType::Smimea,
        RecordType::Sshfp,
        RecordType::Tlsa,
        RecordType::Uri,
    ];

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Loc => "LOC",
            RecordType::Ns => "NS",
            RecordType::Cert => "CERT",
            RecordType::Dnskey => "DNSKEY",
            RecordType::Ds => "DS",
            RecordType::Naptr => "NAPTR",
            RecordType::Smimea => "SMIMEA",
            RecordType::Sshfp => "SSHFP",
            RecordType::Tlsa => "TLSA",
            RecordType::Uri => "URI",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let valid: Vec<&str> = RecordType::ALL.iter().map(RecordType::as_str).collect();
                crate::Error::config(format!(
                    "Invalid record type '{}'. Valid: {}",
                    wanted,
                    valid.join(", ")
                ))
            })
    }
}

/// Probe tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Explicit path to the probe executable
    ///
    /// When unset, the executable is discovered inside `work_dir`.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Working directory the probe runs in
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Result file name, relative to `work_dir`
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Latency test threads (`-n`)
    #[serde(default)]
    pub threads: Option<u32>,

    /// Latency test count per address (`-t`)
    #[serde(default)]
    pub ping_times: Option<u32>,

    /// Additional arguments passed through verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Wall-clock budget for one probe run (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,

    /// Silence window before the probe is considered stalled (in seconds)
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Time the probe gets to exit after reporting completion (in seconds)
    #[serde(default = "default_success_grace_secs")]
    pub success_grace_secs: u64,

    /// Read loop poll interval (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Output substrings that mean the probe finished and wrote its results
    ///
    /// These are the probe tool's own (localized) messages, so they change
    /// with the tool version.
    #[serde(default = "default_success_indicators")]
    pub success_indicators: Vec<String>,
}

impl ProbeConfig {
    /// Absolute-or-relative path of the result file
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_file)
    }

    /// Hard timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Silence window
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// Grace period after a success indicator
    pub fn success_grace(&self) -> Duration {
        Duration::from_secs(self.success_grace_secs)
    }

    /// Read loop poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve the probe executable
    ///
    /// Uses the explicit path when configured, otherwise the first known
    /// tool name present in `work_dir`, otherwise the platform default name
    /// (which then surfaces as `ToolMissing` when run).
    pub fn resolve_executable(&self) -> PathBuf {
        if let Some(path) = &self.executable {
            return path.clone();
        }
        discover_executable(&self.work_dir)
    }

    /// Build the command for one probe run
    ///
    /// `-n`/`-t` are added from the tunables, and `-o` is appended only when
    /// the extra arguments don't already name an output file.
    pub fn command(&self) -> ProbeCommand {
        let mut args = self.extra_args.clone();
        if let Some(threads) = self.threads {
            args.push("-n".to_string());
            args.push(threads.to_string());
        }
        if let Some(times) = self.ping_times {
            args.push("-t".to_string());
            args.push(times.to_string());
        }

        let output_path = match args.iter().position(|a| a == "-o") {
            Some(i) => match args.get(i + 1) {
                Some(file) => self.work_dir.join(file),
                None => {
                    args.push(self.output_file.clone());
                    self.output_path()
                }
            },
            None => {
                // The child runs in work_dir, so the file name is passed as-is
                args.push("-o".to_string());
                args.push(self.output_file.clone());
                self.output_path()
            }
        };

        ProbeCommand {
            executable: self.resolve_executable(),
            args,
            work_dir: self.work_dir.clone(),
            output_path,
        }
    }

    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.output_file.trim().is_empty() {
            return Err(crate::Error::config("Probe output file cannot be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Probe timeout must be > 0"));
        }
        if self.stall_timeout_secs == 0 {
            return Err(crate::Error::config("Probe stall timeout must be > 0"));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 5_000 {
            return Err(crate::Error::config(format!(
                "Probe poll interval must be between 1 and 5000 ms. Got: {}",
                self.poll_interval_ms
            )));
        }
        if self.success_indicators.iter().all(|s| s.trim().is_empty()) {
            return Err(crate::Error::config(
                "At least one probe success indicator is required",
            ));
        }
        if matches!(self.threads, Some(0)) {
            return Err(crate::Error::config("Probe threads must be > 0"));
        }
        if matches!(self.ping_times, Some(0)) {
            return Err(crate::Error::config("Probe ping count must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            work_dir: default_work_dir(),
            output_file: default_output_file(),
            threads: None,
            ping_times: None,
            extra_args: Vec::new(),
            timeout_secs: default_probe_timeout_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
            success_grace_secs: default_success_grace_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            success_indicators: default_success_indicators(),
        }
    }
}

/// Known names of the probe executable, in lookup order
fn executable_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["cfst.exe", "CloudflareSpeedTest.exe"]
    } else {
        &["cfst", "CloudflareSpeedTest"]
    }
}

fn discover_executable(work_dir: &Path) -> PathBuf {
    let names = executable_names();
    for name in names {
        let candidate = work_dir.join(name);
        if candidate.is_file() {
            tracing::debug!("Discovered probe executable: {}", candidate.display());
            return candidate;
        }
    }
    // Last name is the upstream release binary name
    work_dir.join(names[names.len() - 1])
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of DNS reconciliation attempts per run
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    /// Delay between reconciliation attempts (in seconds)
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Interval between periodic runs (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Pause after an unexpected error in the periodic loop (in seconds)
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,

    /// Kill an in-flight probe when the periodic loop is cancelled
    ///
    /// Off by default: cancellation waits for the in-flight run to finish.
    #[serde(default)]
    pub propagate_cancellation: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Delay between reconciliation attempts
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Interval between periodic runs
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Pause after an unexpected error
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.retry_count == 0 {
            return Err(crate::Error::config("Retry count must be at least 1"));
        }
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Run interval must be > 0"));
        }
        if self.interval_secs < 60 {
            tracing::warn!(
                "Run interval of {}s is short and may cause excessive API requests",
                self.interval_secs
            );
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_interval_secs: default_retry_interval_secs(),
            interval_secs: default_interval_secs(),
            error_cooldown_secs: default_error_cooldown_secs(),
            propagate_cancellation: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_ttl() -> u32 {
    1
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("cfst")
}

fn default_output_file() -> String {
    "result.csv".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    600
}

fn default_stall_timeout_secs() -> u64 {
    120
}

fn default_success_grace_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_success_indicators() -> Vec<String> {
    [
        "延迟测速完成",
        "完整测速结果已写入",
        "测试完成",
        "完成测试",
        "测试结束",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_retry_count() -> usize {
    3
}

fn default_retry_interval_secs() -> u64 {
    5
}

fn default_interval_secs() -> u64 {
    300
}

fn default_error_cooldown_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    1000
}
