// # cfoptd - Edge Optimizer Daemon
//
// This is a THIN integration layer:
// - DO NOT add probe logic, DNS logic, or retry logic here
// - All optimizer logic lives in cfopt-core
// - Configuration is via environment variables ONLY
//
// The cfoptd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering providers
// 4. Dispatching to the selected mode
//
// ## Modes (`CFOPT_MODE`)
//
// - `periodic` (default): probe and update on a timer until SIGTERM/SIGINT
// - `once`: one probe-and-update run; exits 2 if the record was not applied
// - `probe`: run the probe and print the best candidates, no DNS calls
// - `status`: print tool and result file state, run nothing
//
// ## Configuration
//
// ### Cloudflare
// - `CFOPT_CF_TOKEN`: API token (required for `once` and `periodic`)
// - `CFOPT_ZONE_ID`: Zone ID
// - `CFOPT_MAIN_DOMAIN`: Main domain, e.g. `example.com`
// - `CFOPT_SUB_DOMAIN`: Sub-domain label(s), e.g. `edge`
// - `CFOPT_RECORD_TYPE`: Record type (default `A`)
// - `CFOPT_API_BASE`: API base URL override
// - `CFOPT_DRY_RUN`: `true` to look up records without writing
//
// ### Probe
// - `CFOPT_PROBE_PATH`: Probe executable (default: discovered in the probe dir)
// - `CFOPT_PROBE_DIR`: Probe working directory
// - `CFOPT_PROBE_THREADS`: Latency test threads (`-n`)
// - `CFOPT_PROBE_COUNT`: Latency test count (`-t`)
// - `CFOPT_PROBE_TIMEOUT_SECS`: Hard timeout for one probe run
// - `CFOPT_PROBE_STALL_SECS`: Silence window before the probe counts as stalled
// - `CFOPT_PROBE_GRACE_SECS`: Time the probe gets to exit after reporting completion
// - `CFOPT_PROBE_POLL_MS`: Output read loop poll interval
//
// ### Engine
// - `CFOPT_INTERVAL_SECS`: Interval between periodic runs
// - `CFOPT_RETRY_COUNT`: DNS attempts per run
// - `CFOPT_RETRY_INTERVAL_SECS`: Delay between DNS attempts
// - `CFOPT_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export CFOPT_CF_TOKEN=your_token
// export CFOPT_ZONE_ID=023e105f4ecef8ad9ca31a8372d0c353
// export CFOPT_MAIN_DOMAIN=example.com
// export CFOPT_SUB_DOMAIN=edge
// export CFOPT_PROBE_DIR=/opt/cfst
//
// cfoptd
// ```

use anyhow::Result;
use async_trait::async_trait;
use cfopt_core::{
    CfoptConfig, DnsProvider, DnsRecord, EngineConfig, ProbeConfig, ProcessSupervisor,
    ProviderConfig, RecordConfig, RecordTarget, RecordType, UpdateOrchestrator,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Number of candidates printed in `probe` mode
const REPORT_TOP: usize = 5;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum CfoptExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error, including a `once` run that did not apply the record
    RuntimeError = 2,
}

impl From<CfoptExitCode> for ExitCode {
    fn from(code: CfoptExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What the daemon does after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Periodic,
    Probe,
    Status,
}

impl Mode {
    /// Whether this mode talks to the DNS provider
    fn needs_dns(self) -> bool {
        matches!(self, Mode::Once | Mode::Periodic)
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(Mode::Once),
            "periodic" => Ok(Mode::Periodic),
            "probe" => Ok(Mode::Probe),
            "status" => Ok(Mode::Status),
            other => anyhow::bail!(
                "CFOPT_MODE '{}' is not valid. Valid modes: once, periodic, probe, status",
                other
            ),
        }
    }
}

/// Application configuration
struct Config {
    mode: Mode,
    cf_token: String,
    zone_id: String,
    main_domain: String,
    sub_domain: Option<String>,
    record_type: RecordType,
    api_base: Option<String>,
    dry_run: bool,
    probe_path: Option<PathBuf>,
    probe_dir: PathBuf,
    probe_threads: Option<u32>,
    probe_count: Option<u32>,
    probe_timeout_secs: Option<u64>,
    probe_stall_secs: Option<u64>,
    probe_grace_secs: Option<u64>,
    probe_poll_ms: Option<u64>,
    interval_secs: Option<u64>,
    retry_count: Option<usize>,
    retry_interval_secs: Option<u64>,
    log_level: String,
}

/// Read an optional variable, treating blank values as unset
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an optional numeric variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, raw, e)),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mode = match var("CFOPT_MODE") {
            Some(raw) => raw.parse()?,
            None => Mode::Periodic,
        };
        let record_type = match var("CFOPT_RECORD_TYPE") {
            Some(raw) => raw.parse()?,
            None => RecordType::A,
        };

        Ok(Self {
            mode,
            cf_token: var("CFOPT_CF_TOKEN").unwrap_or_default(),
            zone_id: var("CFOPT_ZONE_ID").unwrap_or_default(),
            main_domain: var("CFOPT_MAIN_DOMAIN").unwrap_or_default(),
            sub_domain: var("CFOPT_SUB_DOMAIN"),
            record_type,
            api_base: var("CFOPT_API_BASE"),
            dry_run: var("CFOPT_DRY_RUN")
                .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")),
            probe_path: var("CFOPT_PROBE_PATH").map(PathBuf::from),
            probe_dir: var("CFOPT_PROBE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| ProbeConfig::default().work_dir),
            probe_threads: parse_var("CFOPT_PROBE_THREADS")?,
            probe_count: parse_var("CFOPT_PROBE_COUNT")?,
            probe_timeout_secs: parse_var("CFOPT_PROBE_TIMEOUT_SECS")?,
            probe_stall_secs: parse_var("CFOPT_PROBE_STALL_SECS")?,
            probe_grace_secs: parse_var("CFOPT_PROBE_GRACE_SECS")?,
            probe_poll_ms: parse_var("CFOPT_PROBE_POLL_MS")?,
            interval_secs: parse_var("CFOPT_INTERVAL_SECS")?,
            retry_count: parse_var("CFOPT_RETRY_COUNT")?,
            retry_interval_secs: parse_var("CFOPT_RETRY_INTERVAL_SECS")?,
            log_level: var("CFOPT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Required Cloudflare settings are only enforced for modes that write
    /// DNS; `probe` and `status` work without them.
    fn validate(&self) -> Result<()> {
        if self.mode.needs_dns() {
            if self.cf_token.is_empty() {
                anyhow::bail!(
                    "CFOPT_CF_TOKEN is required. Set it via: export CFOPT_CF_TOKEN=your_token"
                );
            }

            // Check for obvious placeholder tokens (common mistake)
            let token_lower = self.cf_token.to_lowercase();
            if token_lower.contains("your_token") || token_lower.contains("replace_me") {
                anyhow::bail!(
                    "CFOPT_CF_TOKEN appears to be a placeholder. \
                    Use an actual API token from the Cloudflare dashboard."
                );
            }

            if self.zone_id.is_empty() {
                anyhow::bail!("CFOPT_ZONE_ID is required");
            }
            if self.main_domain.is_empty() {
                anyhow::bail!(
                    "CFOPT_MAIN_DOMAIN is required. Set it via: export CFOPT_MAIN_DOMAIN=example.com"
                );
            }
            validate_domain_name(&self.full_name())?;
        }

        if let Some(base) = &self.api_base
            && !base.starts_with("https://")
            && !base.starts_with("http://")
        {
            anyhow::bail!("CFOPT_API_BASE must use HTTP or HTTPS scheme. Got: {}", base);
        }

        if let Some(interval) = self.interval_secs
            && !(60..=86_400).contains(&interval)
        {
            anyhow::bail!(
                "CFOPT_INTERVAL_SECS must be between 60 and 86400 seconds. Got: {}",
                interval
            );
        }

        if let Some(retry_count) = self.retry_count
            && (retry_count == 0 || retry_count > 10)
        {
            anyhow::bail!("CFOPT_RETRY_COUNT must be between 1 and 10. Got: {}", retry_count);
        }

        if let Some(retry_interval) = self.retry_interval_secs
            && retry_interval > 300
        {
            anyhow::bail!(
                "CFOPT_RETRY_INTERVAL_SECS must be at most 300 seconds. Got: {}",
                retry_interval
            );
        }

        if let Some(timeout) = self.probe_timeout_secs
            && !(30..=7_200).contains(&timeout)
        {
            anyhow::bail!(
                "CFOPT_PROBE_TIMEOUT_SECS must be between 30 and 7200 seconds. Got: {}",
                timeout
            );
        }

        if let Some(stall) = self.probe_stall_secs
            && !(10..=3_600).contains(&stall)
        {
            anyhow::bail!(
                "CFOPT_PROBE_STALL_SECS must be between 10 and 3600 seconds. Got: {}",
                stall
            );
        }

        if let Some(grace) = self.probe_grace_secs
            && grace > 300
        {
            anyhow::bail!(
                "CFOPT_PROBE_GRACE_SECS must be at most 300 seconds. Got: {}",
                grace
            );
        }

        if let Some(poll) = self.probe_poll_ms
            && !(1..=5_000).contains(&poll)
        {
            anyhow::bail!(
                "CFOPT_PROBE_POLL_MS must be between 1 and 5000 ms. Got: {}",
                poll
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CFOPT_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn full_name(&self) -> String {
        self.record().full_name()
    }

    fn record(&self) -> RecordConfig {
        let record = RecordConfig::new(self.zone_id.clone(), self.main_domain.clone())
            .with_record_type(self.record_type);
        match &self.sub_domain {
            Some(sub) => record.with_sub_domain(sub.clone()),
            None => record,
        }
    }

    /// Build the core configuration
    fn to_core(&self) -> CfoptConfig {
        let mut probe = ProbeConfig {
            executable: self.probe_path.clone(),
            work_dir: self.probe_dir.clone(),
            threads: self.probe_threads,
            ping_times: self.probe_count,
            ..ProbeConfig::default()
        };
        if let Some(timeout) = self.probe_timeout_secs {
            probe.timeout_secs = timeout;
        }
        if let Some(stall) = self.probe_stall_secs {
            probe.stall_timeout_secs = stall;
        }
        if let Some(grace) = self.probe_grace_secs {
            probe.success_grace_secs = grace;
        }
        if let Some(poll) = self.probe_poll_ms {
            probe.poll_interval_ms = poll;
        }

        let mut engine = EngineConfig::default();
        if let Some(interval) = self.interval_secs {
            engine.interval_secs = interval;
        }
        if let Some(retry_count) = self.retry_count {
            engine.retry_count = retry_count;
        }
        if let Some(retry_interval) = self.retry_interval_secs {
            engine.retry_interval_secs = retry_interval;
        }

        CfoptConfig {
            provider: ProviderConfig::Cloudflare {
                api_token: self.cf_token.clone(),
                api_base: self.api_base.clone(),
                dry_run: self.dry_run,
            },
            record: self.record(),
            probe,
            engine,
        }
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        // Wildcard labels are allowed, otherwise alphanumeric and hyphen
        if label != "*" && !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CfoptExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CfoptExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CfoptExitCode::ConfigError.into();
    }

    info!("Starting cfoptd in {:?} mode", config.mode);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CfoptExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Build the orchestrator and dispatch on the mode
async fn run_daemon(config: Config) -> CfoptExitCode {
    let core_config = config.to_core();

    let orchestrator = match build_orchestrator(core_config, config.mode) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Startup failed: {}", e);
            return CfoptExitCode::ConfigError;
        }
    };

    let result = match config.mode {
        Mode::Status => {
            print_status(&orchestrator).await;
            Ok(CfoptExitCode::CleanShutdown)
        }
        Mode::Probe => run_probe(&orchestrator).await,
        Mode::Once => Ok(run_once(&orchestrator).await),
        Mode::Periodic => run_periodic(&orchestrator).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Daemon error: {}", e);
            CfoptExitCode::RuntimeError
        }
    }
}

/// Stand-in provider for modes that never reach DNS
///
/// Lets `probe` and `status` start without Cloudflare credentials.
struct DnsDisabled;

#[async_trait]
impl DnsProvider for DnsDisabled {
    async fn find_record(&self, _target: &RecordTarget) -> cfopt_core::Result<Option<DnsRecord>> {
        Err(cfopt_core::Error::config("DNS is disabled in this mode"))
    }

    async fn create_record(
        &self,
        _target: &RecordTarget,
        _content: &str,
    ) -> cfopt_core::Result<DnsRecord> {
        Err(cfopt_core::Error::config("DNS is disabled in this mode"))
    }

    async fn update_record(
        &self,
        _target: &RecordTarget,
        _record_id: &str,
        _content: &str,
    ) -> cfopt_core::Result<DnsRecord> {
        Err(cfopt_core::Error::config("DNS is disabled in this mode"))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

fn build_orchestrator(config: CfoptConfig, mode: Mode) -> Result<UpdateOrchestrator> {
    let provider: Box<dyn DnsProvider> = if mode.needs_dns() {
        let registry = cfopt_core::ProviderRegistry::new();

        #[cfg(feature = "cloudflare")]
        {
            info!("Registering Cloudflare provider");
            cfopt_provider_cloudflare::register(&registry);
        }

        registry.create_provider(&config.provider)?
    } else {
        Box::new(DnsDisabled)
    };
    let supervisor = ProcessSupervisor::new(&config.probe);

    let (orchestrator, mut event_rx) =
        UpdateOrchestrator::new(config, Box::new(supervisor), provider)?;

    // Events are already logged by the engine; drain so the channel never fills
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::debug!("Engine event: {:?}", event);
        }
    });

    Ok(orchestrator)
}

async fn print_status(orchestrator: &UpdateOrchestrator) {
    let status = orchestrator.status().await;

    println!("record:       {}", status.record_name);
    println!(
        "probe tool:   {} ({})",
        status.executable.display(),
        if status.tool_present { "present" } else { "missing" }
    );
    match (status.result_size, status.result_modified) {
        (Some(size), Some(modified)) => println!(
            "result file:  {} ({} bytes, modified {})",
            status.result_file.display(),
            size,
            modified.to_rfc3339()
        ),
        (Some(size), None) => println!(
            "result file:  {} ({} bytes)",
            status.result_file.display(),
            size
        ),
        _ => println!("result file:  {} (absent)", status.result_file.display()),
    }
    if !status.missing_fields.is_empty() {
        println!("missing:      {}", status.missing_fields.join(", "));
    }
    println!("ready:        {}", status.is_ready());
}

async fn run_probe(orchestrator: &UpdateOrchestrator) -> Result<CfoptExitCode> {
    let report = orchestrator.probe_only(&CancellationToken::new()).await?;

    info!(
        "Probe finished in {:?} with {} candidate(s)",
        report.run.elapsed,
        report.candidates.len()
    );

    let top = report.top(REPORT_TOP);
    if top.is_empty() {
        warn!("Result file has no usable rows");
        return Ok(CfoptExitCode::RuntimeError);
    }

    println!("{:<40} {:>12} {:>8}", "address", "latency (ms)", "loss");
    for candidate in top {
        println!(
            "{:<40} {:>12.2} {:>8}",
            candidate.address,
            candidate.latency_ms,
            candidate
                .loss_rate
                .map(|l| format!("{:.2}", l))
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(CfoptExitCode::CleanShutdown)
}

async fn run_once(orchestrator: &UpdateOrchestrator) -> CfoptExitCode {
    let outcome = orchestrator.run_once().await;

    match &outcome.failure {
        None if outcome.is_success() => {
            info!("Run completed: {:?}", outcome.dns);
            CfoptExitCode::CleanShutdown
        }
        Some(e) => {
            error!("Run failed for {}: {}", outcome.target, e);
            CfoptExitCode::RuntimeError
        }
        None => {
            error!("Run for {} ended without applying a record", outcome.target);
            CfoptExitCode::RuntimeError
        }
    }
}

async fn run_periodic(orchestrator: &UpdateOrchestrator) -> Result<CfoptExitCode> {
    let cancel = CancellationToken::new();

    let shutdown = {
        let cancel = cancel.clone();
        let mut signals = ShutdownSignals::install()?;
        tokio::spawn(async move {
            let signal = signals.recv().await;
            info!("Received shutdown signal: {}", signal);
            cancel.cancel();
        })
    };

    info!(
        "Running every {:?}",
        orchestrator.config().engine.interval()
    );
    orchestrator.run_periodically(&cancel).await;

    shutdown.abort();
    info!("Shutting down daemon");
    Ok(CfoptExitCode::CleanShutdown)
}

/// SIGTERM/SIGINT listeners
///
/// Installed before the loop starts so a signal during the first sleep is
/// not lost.
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms (CTRL-C only)
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: Mode) -> Config {
        Config {
            mode,
            cf_token: "0123456789abcdef0123456789abcdef01234567".to_string(),
            zone_id: "zone-1".to_string(),
            main_domain: "example.com".to_string(),
            sub_domain: Some("edge".to_string()),
            record_type: RecordType::A,
            api_base: None,
            dry_run: false,
            probe_path: None,
            probe_dir: PathBuf::from("/opt/cfst"),
            probe_threads: Some(200),
            probe_count: None,
            probe_timeout_secs: None,
            probe_stall_secs: None,
            probe_grace_secs: None,
            probe_poll_ms: None,
            interval_secs: None,
            retry_count: None,
            retry_interval_secs: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("once".parse::<Mode>().unwrap(), Mode::Once);
        assert_eq!(" Periodic ".parse::<Mode>().unwrap(), Mode::Periodic);
        assert_eq!("probe".parse::<Mode>().unwrap(), Mode::Probe);
        assert_eq!("status".parse::<Mode>().unwrap(), Mode::Status);
        assert!("daemon".parse::<Mode>().is_err());
    }

    #[test]
    fn test_valid_config() {
        assert!(config(Mode::Periodic).validate().is_ok());
    }

    #[test]
    fn test_dns_modes_require_credentials() {
        let mut cfg = config(Mode::Once);
        cfg.cf_token.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Periodic);
        cfg.zone_id.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Probe);
        cfg.cf_token.clear();
        cfg.zone_id.clear();
        cfg.main_domain.clear();
        assert!(cfg.validate().is_ok(), "probe mode never touches DNS");
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let mut cfg = config(Mode::Once);
        cfg.cf_token = "your_token_here".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_range_checks() {
        let mut cfg = config(Mode::Periodic);
        cfg.interval_secs = Some(10);
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Periodic);
        cfg.retry_count = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Periodic);
        cfg.retry_interval_secs = Some(301);
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Periodic);
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_domain_validation() {
        assert!(validate_domain_name("edge.example.com").is_ok());
        assert!(validate_domain_name("*.example.com").is_ok());
        assert!(validate_domain_name("edge..example.com").is_err());
        assert!(validate_domain_name("-edge.example.com").is_err());
        assert!(validate_domain_name("ed_ge.example.com").is_err());
    }

    #[test]
    fn test_core_config_mapping() {
        let mut cfg = config(Mode::Periodic);
        cfg.retry_count = Some(5);
        cfg.interval_secs = Some(600);

        let core = cfg.to_core();
        assert!(core.validate().is_ok());
        assert_eq!(core.record.full_name(), "edge.example.com");
        assert_eq!(core.probe.threads, Some(200));
        assert_eq!(core.probe.work_dir, PathBuf::from("/opt/cfst"));
        assert_eq!(core.engine.retry_count, 5);
        assert_eq!(core.engine.interval_secs, 600);
        assert_eq!(core.provider.type_name(), "cloudflare");
    }

    #[test]
    fn test_probe_timing_mapping_and_ranges() {
        let mut cfg = config(Mode::Probe);
        cfg.probe_stall_secs = Some(90);
        cfg.probe_grace_secs = Some(3);
        cfg.probe_poll_ms = Some(250);
        assert!(cfg.validate().is_ok());

        let probe = cfg.to_core().probe;
        assert_eq!(probe.stall_timeout_secs, 90);
        assert_eq!(probe.success_grace_secs, 3);
        assert_eq!(probe.poll_interval_ms, 250);
        assert!(probe.validate().is_ok());

        let mut cfg = config(Mode::Probe);
        cfg.probe_stall_secs = Some(5);
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Probe);
        cfg.probe_grace_secs = Some(301);
        assert!(cfg.validate().is_err());

        let mut cfg = config(Mode::Probe);
        cfg.probe_poll_ms = Some(0);
        assert!(cfg.validate().is_err());
    }

    fn without_credentials(mode: Mode) -> Config {
        let mut cfg = config(mode);
        cfg.cf_token.clear();
        cfg.zone_id.clear();
        cfg.main_domain.clear();
        cfg
    }

    #[tokio::test]
    async fn test_offline_modes_start_without_credentials() {
        for mode in [Mode::Probe, Mode::Status] {
            let cfg = without_credentials(mode);
            assert!(cfg.validate().is_ok());

            let orchestrator = build_orchestrator(cfg.to_core(), mode)
                .unwrap_or_else(|e| panic!("{:?} mode failed to start: {}", mode, e));

            let status = orchestrator.status().await;
            assert!(status.missing_fields.contains(&"cf_token"));
            assert!(!status.is_ready());
        }
    }

    #[tokio::test]
    async fn test_dns_modes_still_build_a_real_provider() {
        let cfg = without_credentials(Mode::Once);
        assert!(build_orchestrator(cfg.to_core(), Mode::Once).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_refuses_calls() {
        let target = RecordConfig::new("zone-1", "example.com").target();

        assert_eq!(DnsDisabled.provider_name(), "disabled");
        assert!(DnsDisabled.find_record(&target).await.is_err());
        assert!(DnsDisabled.create_record(&target, "1.1.1.1").await.is_err());
        assert!(
            DnsDisabled
                .update_record(&target, "rec-1", "1.1.1.1")
                .await
                .is_err()
        );
    }
}
