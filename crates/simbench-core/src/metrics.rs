//! Global atomic counters for harness activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] once at the end of a command to emit them as a
//! single `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    runs_launched: AtomicU64,
    runs_failed: AtomicU64,
    digests_computed: AtomicU64,
    fixtures_written: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_launched: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            digests_computed: AtomicU64::new(0),
            fixtures_written: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_launched(&self) {
        self.runs_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_digests(&self) {
        self.digests_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fixtures(&self, n: u64) {
        self.fixtures_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_launched = self.runs_launched(),
            runs_failed = self.runs_failed(),
            digests_computed = self.digests_computed(),
            fixtures_written = self.fixtures_written(),
        );
    }

    pub fn runs_launched(&self) -> u64 {
        self.runs_launched.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn digests_computed(&self) -> u64 {
        self.digests_computed.load(Ordering::Relaxed)
    }

    pub fn fixtures_written(&self) -> u64 {
        self.fixtures_written.load(Ordering::Relaxed)
    }
}
