// src/engine/stats.rs
//
// Cumulative processing-time accounting shared across invocations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Total elapsed transcoding time across all invocations.
///
/// An explicit, injectable collaborator rather than a process global: whatever
/// composes a `Transcoder` decides which instance it shares. Updates are a
/// single relaxed atomic add, so concurrent invocations never lose counts.
/// The counter starts at zero and is never reset.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    total_ms: AtomicU64,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation's elapsed wall-clock time.
    pub fn add_ms(&self, elapsed_ms: u64) {
        self.total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    /// Cumulative elapsed milliseconds since construction.
    pub fn total_ms(&self) -> u64 {
        self.total_ms.load(Ordering::Relaxed)
    }
}
