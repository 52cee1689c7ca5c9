//! Core traits for the edge optimizer
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProbeRunner`]: Run the external latency probe
//! - [`DnsProvider`]: Read and write DNS records via provider APIs

pub mod dns_provider;
pub mod probe_runner;

pub use dns_provider::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordPayload, RecordTarget, TargetKey,
};
pub use probe_runner::ProbeRunner;
