use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-process counters for the broker flows.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone, Default)]
pub struct BrokerMetrics {
    /// Successful code exchanges
    exchanges: Arc<AtomicU64>,

    /// Successful access-token mints
    mints: Arc<AtomicU64>,

    /// Rotated refresh tokens persisted during a mint
    rotations: Arc<AtomicU64>,

    /// Rotated refresh tokens that could not be persisted
    rotation_persist_failures: Arc<AtomicU64>,

    /// Requests rejected by the identity check
    unauthorized: Arc<AtomicU64>,
}

/// Point-in-time view of [`BrokerMetrics`], served by `GET /metrics`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub exchanges: u64,
    pub mints: u64,
    pub rotations: u64,
    pub rotation_persist_failures: u64,
    pub unauthorized: u64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_exchange(&self) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mint(&self) {
        self.mints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation_persist_failure(&self) {
        self.rotation_persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            exchanges: self.exchanges.load(Ordering::Relaxed),
            mints: self.mints.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_persist_failures: self.rotation_persist_failures.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
        }
    }
}
