//! Gateway counters.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Lock-free counters updated by the poll loop and dispatch tasks.
#[derive(Debug)]
pub struct GatewayStats {
    started: Instant,
    pub packets_received: AtomicUsize,
    pub joins_accepted: AtomicUsize,
    pub joins_rejected: AtomicUsize,
    pub uplinks_decoded: AtomicUsize,
    pub uplinks_failed: AtomicUsize,
    pub unsupported_frames: AtomicUsize,
    pub transmit_failures: AtomicUsize,
    pub radio_errors: AtomicUsize,
}

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub packets_received: usize,
    pub joins_accepted: usize,
    pub joins_rejected: usize,
    pub uplinks_decoded: usize,
    pub uplinks_failed: usize,
    pub unsupported_frames: usize,
    pub transmit_failures: usize,
    pub radio_errors: usize,
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayStats {
    /// Create zeroed counters with the uptime clock starting now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            packets_received: AtomicUsize::new(0),
            joins_accepted: AtomicUsize::new(0),
            joins_rejected: AtomicUsize::new(0),
            uplinks_decoded: AtomicUsize::new(0),
            uplinks_failed: AtomicUsize::new(0),
            unsupported_frames: AtomicUsize::new(0),
            transmit_failures: AtomicUsize::new(0),
            radio_errors: AtomicUsize::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            joins_accepted: self.joins_accepted.load(Ordering::Relaxed),
            joins_rejected: self.joins_rejected.load(Ordering::Relaxed),
            uplinks_decoded: self.uplinks_decoded.load(Ordering::Relaxed),
            uplinks_failed: self.uplinks_failed.load(Ordering::Relaxed),
            unsupported_frames: self.unsupported_frames.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            radio_errors: self.radio_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = GatewayStats::new();
        GatewayStats::incr(&stats.packets_received);
        GatewayStats::incr(&stats.packets_received);
        GatewayStats::incr(&stats.joins_accepted);

        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.joins_accepted, 1);
        assert_eq!(snap.uplinks_decoded, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(GatewayStats::new().snapshot()).unwrap();
        assert_eq!(json["transmit_failures"], 0);
        assert!(json.get("uptime_secs").is_some());
    }
}
