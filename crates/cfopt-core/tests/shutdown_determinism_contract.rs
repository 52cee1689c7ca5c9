//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that the periodic loop stops promptly and predictably.
//!
//! Constraints verified:
//! - Cancellation during the interval sleep stops the loop immediately
//! - Cancellation during the error cooldown stops the loop immediately
//! - An in-flight run completes before the loop exits (default)
//! - With `propagate_cancellation`, the in-flight probe is cancelled
//! - Missing settings skip cycles instead of failing them
//! - LoopStopped is always the last event
//!
//! If this test fails, someone has added:
//! - Sleeps that ignore cancellation
//! - Detached background tasks
//! - A run that can be abandoned halfway through a DNS write

mod common;

use cfopt_core::probe::ProbeVerdict;
use cfopt_core::{EngineEvent, UpdateOrchestrator};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wait for the first event matching `predicate`
async fn wait_for(
    event_rx: &mut mpsc::Receiver<EngineEvent>,
    predicate: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = event_rx.recv().await.expect("event channel open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event within 5 seconds")
}

fn drain(event_rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn cancellation_during_sleep_stops_loop() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedProbeRunner::succeeding(RESULTS);

    let mut config = minimal_config(dir.path());
    config.engine.interval_secs = 3600;

    let (orchestrator, mut event_rx) = UpdateOrchestrator::new(
        config,
        Box::new(ScriptedProbeRunner::sharing_counters_with(&runner)),
        Box::new(MockDnsProvider::empty()),
    )
    .expect("orchestrator construction succeeds");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), orchestrator.run_periodically(&cancel))
        .await
        .expect("loop should stop within 5 seconds");

    assert_eq!(runner.run_call_count(), 0);
    assert!(matches!(
        drain(&mut event_rx).last(),
        Some(EngineEvent::LoopStopped { .. })
    ));
}

#[tokio::test]
async fn in_flight_run_completes_before_exit() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedProbeRunner::succeeding(RESULTS).with_delay(Duration::from_millis(300));
    let provider = MockDnsProvider::existing("rec-1");

    let (orchestrator, mut event_rx) = UpdateOrchestrator::new(
        minimal_config(dir.path()),
        Box::new(ScriptedProbeRunner::sharing_counters_with(&runner)),
        Box::new(MockDnsProvider::sharing_counters_with(&provider)),
    )
    .expect("orchestrator construction succeeds");
    let orchestrator = Arc::new(orchestrator);

    let cancel = CancellationToken::new();
    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run_periodically(&cancel).await })
    };

    wait_for(&mut event_rx, |e| matches!(e, EngineEvent::RunStarted { .. })).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop within 5 seconds")
        .unwrap();

    assert_eq!(runner.run_call_count(), 1);
    assert_eq!(provider.update_call_count(), 1, "in-flight run was abandoned");

    let events = drain(&mut event_rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::RecordApplied { .. })));
    assert!(matches!(events.last(), Some(EngineEvent::LoopStopped { .. })));
}

#[tokio::test]
async fn propagated_cancellation_stops_the_probe() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedProbeRunner::succeeding(RESULTS).until_cancelled();
    let provider = MockDnsProvider::existing("rec-1");

    let mut config = minimal_config(dir.path());
    config.engine.propagate_cancellation = true;

    let (orchestrator, mut event_rx) = UpdateOrchestrator::new(
        config,
        Box::new(ScriptedProbeRunner::sharing_counters_with(&runner)),
        Box::new(MockDnsProvider::sharing_counters_with(&provider)),
    )
    .expect("orchestrator construction succeeds");
    let orchestrator = Arc::new(orchestrator);

    let cancel = CancellationToken::new();
    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run_periodically(&cancel).await })
    };

    wait_for(&mut event_rx, |e| matches!(e, EngineEvent::RunStarted { .. })).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop within 5 seconds")
        .unwrap();

    assert_eq!(provider.total_call_count(), 0);
    let events = drain(&mut event_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::ProbeFinished {
            verdict: ProbeVerdict::Cancelled,
            ..
        }
    )));
}

#[tokio::test]
async fn cancellation_during_cooldown_stops_loop() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedProbeRunner::succeeding(RESULTS).erroring();

    let (orchestrator, mut event_rx) = UpdateOrchestrator::new(
        minimal_config(dir.path()),
        Box::new(ScriptedProbeRunner::sharing_counters_with(&runner)),
        Box::new(MockDnsProvider::empty()),
    )
    .expect("orchestrator construction succeeds");
    let orchestrator = Arc::new(orchestrator);

    let cancel = CancellationToken::new();
    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run_periodically(&cancel).await })
    };

    wait_for(&mut event_rx, |e| matches!(e, EngineEvent::RunStarted { .. })).await;
    // Let the run fail and the 300 s cooldown begin
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cooldown must observe cancellation")
        .unwrap();

    assert_eq!(runner.run_call_count(), 1);
}

#[tokio::test]
async fn missing_settings_skip_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedProbeRunner::succeeding(RESULTS);
    let provider = MockDnsProvider::empty();

    let mut config = minimal_config(dir.path());
    config.record.main_domain.clear();

    let (orchestrator, mut event_rx) = UpdateOrchestrator::new(
        config,
        Box::new(ScriptedProbeRunner::sharing_counters_with(&runner)),
        Box::new(MockDnsProvider::sharing_counters_with(&provider)),
    )
    .expect("orchestrator construction succeeds");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // Past the first 1 s tick
        tokio::time::sleep(Duration::from_millis(1300)).await;
        trigger.cancel();
    });

    orchestrator.run_periodically(&cancel).await;

    assert_eq!(runner.run_call_count(), 0);
    assert_eq!(provider.total_call_count(), 0);
    let events = drain(&mut event_rx);
    assert_eq!(events.len(), 1, "only LoopStopped expected: {:?}", events);
}
