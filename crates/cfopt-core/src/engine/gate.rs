//! Per-record run serialization
//!
//! Two runs against the same (zone, name, type) would race the
//! lookup-then-write sequence and could create duplicate records. A
//! [`TargetGate`] hands out one async mutex per key; clones share the same
//! table, so every orchestrator built with the same gate serializes on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::traits::TargetKey;

type Slots = HashMap<TargetKey, Arc<tokio::sync::Mutex<()>>>;

/// Shared table of per-target locks
#[derive(Debug, Clone, Default)]
pub struct TargetGate {
    slots: Arc<Mutex<Slots>>,
}

impl TargetGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// Access is released when the guard drops.
    pub async fn acquire(&self, key: &TargetKey) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Take exclusive access to `key` only if nobody holds it
    pub fn try_acquire(&self, key: &TargetKey) -> Option<OwnedMutexGuard<()>> {
        self.slot(key).try_lock_owned().ok()
    }

    fn slot(&self, key: &TargetKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }
}
