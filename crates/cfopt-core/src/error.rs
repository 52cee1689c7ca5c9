//! Error types for the edge optimizer
//!
//! Every failure the pipeline can report is a variant here. Each one renders
//! a human-readable reason through `Display`, so a caller never has to report
//! an absent result without saying why.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for optimizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the optimizer
#[derive(Error, Debug)]
pub enum Error {
    /// The probe executable does not exist at the configured path
    #[error("Probe tool not found at {}", .0.display())]
    ToolMissing(PathBuf),

    /// The probe exceeded its wall-clock budget and was killed
    #[error("Probe timed out after {0:?}")]
    ProcessTimeout(Duration),

    /// The probe stopped producing output and was killed
    #[error("Probe stalled: no output for {0:?}")]
    ProcessStalled(Duration),

    /// The probe ended without a verifiable success signal
    #[error("Probe failed (exit code: {})", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    ProcessNonZeroExit {
        /// Exit code, if the process exited on its own
        code: Option<i32>,
    },

    /// The probe was killed because the run was cancelled
    #[error("Probe cancelled")]
    ProcessCancelled,

    /// The probe result file is missing
    #[error("Result file not found: {}", .0.display())]
    ResultFileMissing(PathBuf),

    /// The result file had no usable rows
    #[error("No valid candidate in probe results")]
    NoValidCandidate,

    /// Listing the zone's records failed
    #[error("DNS lookup failed: {0}")]
    DnsLookupFailed(String),

    /// The provider answered `success: false`
    #[error("DNS write rejected: {0}")]
    DnsWriteRejected(String),

    /// The request never produced a provider verdict
    #[error("DNS transport error: {0}")]
    DnsTransport(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lookup error
    pub fn dns_lookup(msg: impl Into<String>) -> Self {
        Self::DnsLookupFailed(msg.into())
    }

    /// Create a rejected-write error
    pub fn dns_rejected(msg: impl Into<String>) -> Self {
        Self::DnsWriteRejected(msg.into())
    }

    /// Create a transport error
    pub fn dns_transport(msg: impl Into<String>) -> Self {
        Self::DnsTransport(msg.into())
    }

    /// Whether this error came from the probe stage
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolMissing(_)
                | Self::ProcessTimeout(_)
                | Self::ProcessStalled(_)
                | Self::ProcessNonZeroExit { .. }
                | Self::ProcessCancelled
        )
    }

    /// Whether this error came from the DNS stage
    pub fn is_dns_failure(&self) -> bool {
        matches!(
            self,
            Self::DnsLookupFailed(_) | Self::DnsWriteRejected(_) | Self::DnsTransport(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
