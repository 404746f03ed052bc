//! Runtime counters for capability actors and calls

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters shared by every actor and promise of one system
#[derive(Debug, Default)]
pub struct RpcMetrics {
    pub capabilities_started: AtomicU64,
    pub capabilities_stopped: AtomicU64,

    pub calls_dispatched: AtomicU64,
    pub calls_completed: AtomicU64,
    pub calls_failed: AtomicU64,
    pub calls_pipelined: AtomicU64,
    pub total_call_time_ns: AtomicU64,

    pub worker_panics: AtomicU64,
    pub mailbox_warnings: AtomicU64,
}

impl RpcMetrics {
    pub fn record_started(&self) {
        self.capabilities_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stopped(&self) {
        self.capabilities_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.calls_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipelined(&self) {
        self.calls_pipelined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mailbox_warning(&self) {
        self.mailbox_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished call, measured from the moment it was issued
    pub fn record_call(&self, elapsed: Duration, succeeded: bool) {
        if succeeded {
            self.calls_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_call_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn avg_call_time_ns(&self) -> f64 {
        let finished = self.calls_completed.load(Ordering::Relaxed)
            + self.calls_failed.load(Ordering::Relaxed);
        if finished == 0 {
            return 0.0;
        }
        self.total_call_time_ns.load(Ordering::Relaxed) as f64 / finished as f64
    }

    pub fn snapshot(&self) -> RpcStats {
        let started = self.capabilities_started.load(Ordering::Relaxed);
        let stopped = self.capabilities_stopped.load(Ordering::Relaxed);
        RpcStats {
            capabilities_started: started,
            capabilities_stopped: stopped,
            active_capabilities: started.saturating_sub(stopped),
            calls_dispatched: self.calls_dispatched.load(Ordering::Relaxed),
            calls_completed: self.calls_completed.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            calls_pipelined: self.calls_pipelined.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            mailbox_warnings: self.mailbox_warnings.load(Ordering::Relaxed),
            avg_call_time_ns: self.avg_call_time_ns(),
        }
    }
}

/// Point-in-time copy of [`RpcMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcStats {
    pub capabilities_started: u64,
    pub capabilities_stopped: u64,
    pub active_capabilities: u64,
    pub calls_dispatched: u64,
    pub calls_completed: u64,
    pub calls_failed: u64,
    pub calls_pipelined: u64,
    pub worker_panics: u64,
    pub mailbox_warnings: u64,
    pub avg_call_time_ns: f64,
}
