//! Probe result parsing and candidate selection
//!
//! The prober writes a CSV file with a header row followed by one row per
//! endpoint:
//!
//! ```text
//! IP,Sent,Received,Loss,Latency,Speed,Region
//! 104.16.1.1,4,4,0.00,152.30,12.50,LAX
//! ```
//!
//! Only the address (field 0) and latency (field 4) are required. Every
//! other column is kept when it parses and dropped to `None` when it
//! doesn't.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Minimum number of fields in a usable row
const MIN_FIELDS: usize = 5;

/// One probed endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Endpoint address as written by the prober
    pub address: String,
    /// Packets sent
    pub sent: Option<u32>,
    /// Packets received
    pub received: Option<u32>,
    /// Packet loss rate
    pub loss_rate: Option<f64>,
    /// Average latency in milliseconds (lower is better)
    pub latency_ms: f64,
    /// Download speed, when the prober measured it
    pub download_speed: Option<f64>,
    /// Region code
    pub region: Option<String>,
}

impl Candidate {
    /// Parse one data row
    ///
    /// Returns `None` for rows that are too short, have an empty address,
    /// or whose latency is not a non-negative finite number.
    pub fn from_row(row: &str) -> Option<Self> {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        if fields.len() < MIN_FIELDS {
            return None;
        }

        let address = fields[0];
        if address.is_empty() {
            return None;
        }

        let latency_ms = fields[4].parse::<f64>().ok()?;
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return None;
        }

        Some(Self {
            address: address.to_string(),
            sent: fields[1].parse().ok(),
            received: fields[2].parse().ok(),
            loss_rate: fields[3].parse().ok(),
            latency_ms,
            download_speed: fields.get(5).and_then(|f| f.parse().ok()),
            region: fields
                .get(6)
                .filter(|f| !f.is_empty())
                .map(|f| f.to_string()),
        })
    }
}

/// Parse result file content into candidates
///
/// The first line is a header and is always skipped. Unusable rows are
/// skipped with a warning; file order is preserved.
pub fn parse_candidates(content: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (index, line) in content.lines().enumerate().skip(1) {
        let row = line.trim();
        if row.is_empty() {
            continue;
        }
        match Candidate::from_row(row) {
            Some(candidate) => candidates.push(candidate),
            None => warn!("Skipping unusable result row {}: {}", index + 1, row),
        }
    }

    candidates
}

/// Read and parse the result file at `path`
///
/// # Returns
///
/// - `Ok(candidates)`: possibly empty when the file has no usable rows
/// - `Err(Error::ResultFileMissing)`: the file does not exist
pub async fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ResultFileMissing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let candidates = parse_candidates(&String::from_utf8_lossy(&bytes));
    debug!(
        "Loaded {} candidates from {}",
        candidates.len(),
        path.display()
    );
    Ok(candidates)
}

/// The candidate with the lowest latency
///
/// Ties keep the candidate that appears first.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.latency_ms <= candidate.latency_ms => Some(current),
        _ => Some(candidate),
    })
}

/// The `n` lowest-latency candidates, best first
///
/// Equal latencies keep file order.
pub fn top_candidates(candidates: &[Candidate], n: usize) -> Vec<&Candidate> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "IP,Sent,Received,Loss,Latency,Speed,Region";

    fn file(rows: &[&str]) -> String {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content
    }

    #[test]
    fn test_literal_two_row_file() {
        let content = "IP,Sent,Recv,Loss,Latency\n1.1.1.1,4,4,0,20.5\n1.0.0.1,4,4,0,15.2";
        let candidates = parse_candidates(content);

        assert_eq!(candidates.len(), 2);
        assert_eq!(select_best(&candidates).unwrap().address, "1.0.0.1");
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let candidates = parse_candidates(&file(&["bad,row", "1.1.1.1,4,4,0,20.5"]));

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "1.1.1.1");
    }

    #[test]
    fn test_unusable_latency_is_skipped() {
        let candidates = parse_candidates(&file(&[
            "1.1.1.1,4,4,0,fast",
            "1.1.1.2,4,4,0,-3",
            "1.1.1.3,4,4,0,NaN",
            "1.1.1.4,4,4,0,inf",
            "1.1.1.5,4,4,0,",
            "1.1.1.6,4,4,0,42",
        ]));

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "1.1.1.6");
    }

    #[test]
    fn test_header_only_and_empty_files() {
        assert!(parse_candidates(HEADER).is_empty());
        assert!(parse_candidates("").is_empty());
        assert!(select_best(&parse_candidates(HEADER)).is_none());
    }

    #[test]
    fn test_header_is_skipped_even_when_numeric() {
        let candidates = parse_candidates("9.9.9.9,4,4,0,1\n1.1.1.1,4,4,0,20");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "1.1.1.1");
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let content = "IP,Sent,Recv,Loss,Latency\r\n\r\n1.1.1.1,4,4,0,20.5\r\n\r\n";
        let candidates = parse_candidates(content);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].latency_ms, 20.5);
    }

    #[test]
    fn test_optional_columns() {
        let candidates = parse_candidates(&file(&[
            "104.16.1.1,4,3,0.25,152.30,12.50,LAX",
            "104.16.1.2,?,?,?,99.1",
        ]));

        let full = &candidates[0];
        assert_eq!(full.sent, Some(4));
        assert_eq!(full.received, Some(3));
        assert_eq!(full.loss_rate, Some(0.25));
        assert_eq!(full.download_speed, Some(12.5));
        assert_eq!(full.region.as_deref(), Some("LAX"));

        let sparse = &candidates[1];
        assert_eq!(sparse.sent, None);
        assert_eq!(sparse.loss_rate, None);
        assert_eq!(sparse.download_speed, None);
        assert_eq!(sparse.region, None);
        assert_eq!(sparse.latency_ms, 99.1);
    }

    #[test]
    fn test_minimum_wins_regardless_of_order() {
        let rows = ["1.1.1.1,4,4,0,30", "1.1.1.2,4,4,0,10", "1.1.1.3,4,4,0,20"];

        for rotation in 0..rows.len() {
            let mut rotated = rows.to_vec();
            rotated.rotate_left(rotation);
            let candidates = parse_candidates(&file(&rotated));
            assert_eq!(select_best(&candidates).unwrap().address, "1.1.1.2");
        }
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let candidates = parse_candidates(&file(&[
            "1.1.1.1,4,4,0,50",
            "1.1.1.2,4,4,0,10",
            "1.1.1.3,4,4,0,10",
        ]));

        assert_eq!(select_best(&candidates).unwrap().address, "1.1.1.2");
    }

    #[test]
    fn test_no_upper_latency_bound() {
        let candidates = parse_candidates(&file(&["1.1.1.1,4,0,1.00,9999.0"]));

        assert_eq!(select_best(&candidates).unwrap().address, "1.1.1.1");
    }

    #[test]
    fn test_top_candidates_is_stable() {
        let candidates = parse_candidates(&file(&[
            "a,4,4,0,30",
            "b,4,4,0,10",
            "c,4,4,0,20",
            "d,4,4,0,10",
        ]));

        let top: Vec<&str> = top_candidates(&candidates, 3)
            .iter()
            .map(|c| c.address.as_str())
            .collect();
        assert_eq!(top, vec!["b", "d", "c"]);

        assert_eq!(top_candidates(&candidates, 10).len(), 4);
        assert!(top_candidates(&candidates, 0).is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");

        let err = load_candidates(&path).await.unwrap_err();
        assert!(matches!(err, Error::ResultFileMissing(p) if p == path));
    }

    #[tokio::test]
    async fn test_load_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let mut content = b"IP,\xff\xfe,Recv,Loss,Latency\n".to_vec();
        content.extend_from_slice(b"1.0.0.1,4,4,0,15.2\n");
        std::fs::write(&path, content).unwrap();

        let candidates = load_candidates(&path).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "1.0.0.1");
    }

    #[tokio::test]
    async fn test_load_header_only_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        std::fs::write(&path, format!("{}\n", HEADER)).unwrap();

        assert!(load_candidates(&path).await.unwrap().is_empty());
    }
}
