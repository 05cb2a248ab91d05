//! Process-wide counters.
//!
//! Supplements spec.md's scattered "counter++" mentions with the single
//! collector the legacy `metrics/collector.py` kept, minus the exporter
//! wiring (external, per spec.md §1 Non-goals). Every counter here is
//! incremented from exactly one call site; no locking needed since all
//! fields are atomics, the same choice `stt/stub.rs`'s `AtomicBool` makes
//! for single-writer-many-reader state.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub rtp_packets_received: AtomicU64,
    pub rtp_packets_dropped_whitelist: AtomicU64,
    pub rtp_parse_errors: AtomicU64,
    pub rtp_bytes_received: AtomicU64,

    pub ws_events_enqueued: AtomicU64,
    pub ws_events_dropped: AtomicU64,
    pub ws_events_sent: AtomicU64,
    pub ws_send_failures: AtomicU64,

    pub stt_feed_frames_dropped: AtomicU64,
    pub stt_provider_errors: AtomicU64,

    pub turns_complete: AtomicU64,
    pub turns_incomplete: AtomicU64,
    pub turns_suppressed_empty: AtomicU64,

    pub calls_registered: AtomicU64,
    pub calls_rejected_pool_exhausted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Snapshot {
    pub rtp_packets_received: u64,
    pub rtp_packets_dropped_whitelist: u64,
    pub rtp_parse_errors: u64,
    pub rtp_bytes_received: u64,
    pub ws_events_enqueued: u64,
    pub ws_events_dropped: u64,
    pub ws_events_sent: u64,
    pub ws_send_failures: u64,
    pub stt_feed_frames_dropped: u64,
    pub stt_provider_errors: u64,
    pub turns_complete: u64,
    pub turns_incomplete: u64,
    pub turns_suppressed_empty: u64,
    pub calls_registered: u64,
    pub calls_rejected_pool_exhausted: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rtp_packets_received: self.rtp_packets_received.load(Ordering::Relaxed),
            rtp_packets_dropped_whitelist: self.rtp_packets_dropped_whitelist.load(Ordering::Relaxed),
            rtp_parse_errors: self.rtp_parse_errors.load(Ordering::Relaxed),
            rtp_bytes_received: self.rtp_bytes_received.load(Ordering::Relaxed),
            ws_events_enqueued: self.ws_events_enqueued.load(Ordering::Relaxed),
            ws_events_dropped: self.ws_events_dropped.load(Ordering::Relaxed),
            ws_events_sent: self.ws_events_sent.load(Ordering::Relaxed),
            ws_send_failures: self.ws_send_failures.load(Ordering::Relaxed),
            stt_feed_frames_dropped: self.stt_feed_frames_dropped.load(Ordering::Relaxed),
            stt_provider_errors: self.stt_provider_errors.load(Ordering::Relaxed),
            turns_complete: self.turns_complete.load(Ordering::Relaxed),
            turns_incomplete: self.turns_incomplete.load(Ordering::Relaxed),
            turns_suppressed_empty: self.turns_suppressed_empty.load(Ordering::Relaxed),
            calls_registered: self.calls_registered.load(Ordering::Relaxed),
            calls_rejected_pool_exhausted: self.calls_rejected_pool_exhausted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_visible_in_snapshot() {
        let m = Metrics::new();
        m.rtp_packets_received.fetch_add(3, Ordering::Relaxed);
        m.turns_complete.fetch_add(1, Ordering::Relaxed);

        let snap = m.snapshot();
        assert_eq!(snap.rtp_packets_received, 3);
        assert_eq!(snap.turns_complete, 1);
    }
}
