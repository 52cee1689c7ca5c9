// # cfopt-core
//
// Core library for the edge-endpoint optimizer.
//
// ## Architecture Overview
//
// One run probes a set of edge endpoints with an external latency prober,
// picks the lowest-latency endpoint from its results, and points a DNS
// record at it:
// - **ProbeRunner**: Trait for running the external prober to a verdict
// - **ProcessSupervisor**: ProbeRunner that spawns and watches the child process
// - **results**: Result file parsing and candidate selection
// - **DnsProvider**: Trait for reading and writing DNS records via provider APIs
// - **DnsReconciler**: Lookup-then-create-or-update against a DnsProvider
// - **UpdateOrchestrator**: Runs the probe → select → reconcile cycle, once or periodically
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider implementations
// 2. **Single Retry Owner**: Only the orchestrator retries, and only around DNS
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod reconcile;
pub mod registry;
pub mod results;
pub mod traits;

// Re-export core types for convenience
pub use config::{CfoptConfig, EngineConfig, ProbeConfig, ProviderConfig, RecordConfig, RecordType};
pub use engine::{
    DnsOutcome, EngineEvent, ProbeReport, ProbeStatus, RunOutcome, TargetGate, UpdateOrchestrator,
};
pub use error::{Error, Result};
pub use probe::{ProbeCommand, ProbeRun, ProbeVerdict, ProcessSupervisor};
pub use reconcile::{DnsReconciler, ReconcileAction};
pub use registry::ProviderRegistry;
pub use results::Candidate;
pub use traits::{DnsProvider, DnsProviderFactory, DnsRecord, ProbeRunner, RecordTarget, TargetKey};
