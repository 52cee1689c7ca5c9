// # Probe Runner Trait
//
// Defines the interface for running one latency probe to a verdict.
//
// ## Implementations
//
// - `ProcessSupervisor`: spawns and supervises the external prober
//
// ## Usage
//
// ```rust,ignore
// use cfopt_core::{ProbeRunner, ProcessSupervisor};
// use tokio_util::sync::CancellationToken;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let config = cfopt_core::config::ProbeConfig::default();
//     let runner = ProcessSupervisor::new(&config);
//
//     let run = runner.run(&config.command(), &CancellationToken::new()).await?;
//     println!("probe {}", run.verdict);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::probe::{ProbeCommand, ProbeRun};

/// Trait for probe runner implementations
///
/// # Contract
///
/// - A run that concludes (successfully or not) returns `Ok(ProbeRun)`;
///   the verdict says how it ended
/// - `Err` is reserved for failures to set up or monitor the run
/// - Cancelling `cancel` must end the run promptly with a `Cancelled`
///   verdict and no process left behind
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Run the probe described by `command`
    async fn run(
        &self,
        command: &ProbeCommand,
        cancel: &CancellationToken,
    ) -> Result<ProbeRun, crate::Error>;
}
