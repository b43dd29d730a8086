//! Global atomic counters for DocService observability.
//!
//! Process-wide request, sandbox, and backend counters. They are only
//! logged when [`Metrics::flush`] runs, which the CLI does on exit.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

/// Counters shared by every orchestrator in the process.
pub struct Metrics {
    requests_handled: AtomicU64,
    scripts_executed: AtomicU64,
    script_timeouts: AtomicU64,
    corrections_requested: AtomicU64,
    classifier_fallbacks: AtomicU64,
    backend_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            scripts_executed: AtomicU64::new(0),
            script_timeouts: AtomicU64::new(0),
            corrections_requested: AtomicU64::new(0),
            classifier_fallbacks: AtomicU64::new(0),
            backend_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_requests_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests_handled", "counter incremented");
    }

    pub fn inc_scripts_executed(&self) {
        self.scripts_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scripts_executed", "counter incremented");
    }

    pub fn inc_script_timeouts(&self) {
        self.script_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "script_timeouts", "counter incremented");
    }

    pub fn inc_corrections(&self) {
        self.corrections_requested.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrections_requested", "counter incremented");
    }

    pub fn inc_classifier_fallbacks(&self) {
        self.classifier_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "classifier_fallbacks", "counter incremented");
    }

    pub fn inc_backend_failures(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backend_failures", "counter incremented");
    }

    /// Log a snapshot of every counter as one `metrics` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            requests_handled = self.requests_handled(),
            scripts_executed = self.scripts_executed(),
            script_timeouts = self.script_timeouts(),
            corrections_requested = self.corrections_requested(),
            classifier_fallbacks = self.classifier_fallbacks(),
            backend_failures = self.backend_failures(),
        );
    }

    pub fn requests_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::Relaxed)
    }

    pub fn scripts_executed(&self) -> u64 {
        self.scripts_executed.load(Ordering::Relaxed)
    }

    pub fn script_timeouts(&self) -> u64 {
        self.script_timeouts.load(Ordering::Relaxed)
    }

    pub fn corrections_requested(&self) -> u64 {
        self.corrections_requested.load(Ordering::Relaxed)
    }

    pub fn classifier_fallbacks(&self) -> u64 {
        self.classifier_fallbacks.load(Ordering::Relaxed)
    }

    pub fn backend_failures(&self) -> u64 {
        self.backend_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.scripts_executed(), 0);
        m.inc_scripts_executed();
        m.inc_scripts_executed();
        assert_eq!(m.scripts_executed(), 2);

        m.inc_script_timeouts();
        assert_eq!(m.script_timeouts(), 1);

        m.inc_corrections();
        m.inc_classifier_fallbacks();
        m.inc_backend_failures();
        m.inc_requests_handled();
        assert_eq!(m.corrections_requested(), 1);
        assert_eq!(m.classifier_fallbacks(), 1);
        assert_eq!(m.backend_failures(), 1);
        assert_eq!(m.requests_handled(), 1);
    }
}
