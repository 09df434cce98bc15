//! Process-wide counters, bumped lock-free from any worker and read
//! once at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

#[derive(Debug, Default)]
pub struct Stats {
    /// Messages parsed and enqueued by ingress.
    pub messages_in: AtomicU64,

    /// Messages delivered to at least one destination by the router.
    pub messages_out: AtomicU64,

    /// Inputs that failed to parse (binary resync skips included).
    pub decode_errors: AtomicU64,

    /// Per-send failures observed by the router.
    pub send_errors: AtomicU64,

    /// Inputs the engines dropped as invalid or over capacity.
    pub dropped_inputs: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Log the final tallies; called once by the supervisor after the
    /// workers have been joined.
    pub fn log_summary(&self) {
        info!(
            messages_in = self.messages_in.load(Ordering::Relaxed),
            messages_out = self.messages_out.load(Ordering::Relaxed),
            decode_errors = self.decode_errors.load(Ordering::Relaxed),
            send_errors = self.send_errors.load(Ordering::Relaxed),
            dropped_inputs = self.dropped_inputs.load(Ordering::Relaxed),
            "final statistics"
        );
    }
}
