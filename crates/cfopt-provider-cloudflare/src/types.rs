//! Cloudflare API v4 wire types and response classification
//!
//! Every response is wrapped in the same envelope:
//!
//! ```json
//! { "success": false, "errors": [{ "code": 1004, "message": "DNS Validation Error" }], "result": null }
//! ```
//!
//! `success` is authoritative; a 2xx status alone does not mean the call
//! worked.

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Longest raw body excerpt carried in an error message
const BODY_EXCERPT_CHARS: usize = 200;

/// Cloudflare API response envelope
#[derive(Debug, Deserialize)]
pub struct CloudflareResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<CloudflareError>>,
}

/// One entry of the envelope's `errors` list
#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareError {
    pub code: i64,
    pub message: String,
}

/// DNS record as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareDnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub proxied: Option<bool>,
}

/// Why an API call did not yield a result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiFailure {
    /// Cloudflare answered and said no
    #[error("{0}")]
    Rejected(String),

    /// No usable answer: network failure, timeout, or an unparseable reply
    #[error("{0}")]
    Transport(String),
}

/// Classify an HTTP response
///
/// - envelope with `success: false`: [`ApiFailure::Rejected`], whatever the status
/// - 2xx envelope with `success: true`: the `result`
/// - anything else: [`ApiFailure::Transport`]
pub fn interpret<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiFailure> {
    let ok_status = (200..300).contains(&status);

    let envelope: CloudflareResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if ok_status => {
            return Err(ApiFailure::Transport(format!(
                "Invalid response body: {}",
                e
            )));
        }
        Err(_) => {
            return Err(ApiFailure::Transport(format!(
                "HTTP {}: {}",
                status,
                excerpt(body)
            )));
        }
    };

    if !envelope.success {
        return Err(ApiFailure::Rejected(describe_errors(
            envelope.errors.as_deref().unwrap_or_default(),
        )));
    }
    if !ok_status {
        return Err(ApiFailure::Transport(format!("HTTP {}", status)));
    }

    envelope
        .result
        .ok_or_else(|| ApiFailure::Transport("Response has no result".to_string()))
}

/// Render the envelope's error list as `[code] message; ...`
pub fn describe_errors(errors: &[CloudflareError]) -> String {
    if errors.is_empty() {
        return "Request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None if body.is_empty() => "<empty body>".to_string(),
        None => body.to_string(),
    }
}

/// Whether an API record is the one a target names
///
/// Names compare case-insensitively and ignore a trailing root dot.
pub fn record_matches(record: &CloudflareDnsRecord, name: &str, record_type: &str) -> bool {
    let normalize = |n: &str| n.trim_end_matches('.').to_ascii_lowercase();
    normalize(&record.name) == normalize(name) && record.record_type.eq_ignore_ascii_case(record_type)
}
