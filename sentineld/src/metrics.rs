use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

use sentineld_wire::Channel;

const CHANNEL_SLOTS: usize = 7;

/// Process-wide counters, updated from the hot path of every channel
/// poller. All fields are atomic so no lock is held while decoding or
/// evaluating rules.
pub struct Metrics {
    pub events_total: AtomicU64,
    pub dropped_events_total: AtomicU64,
    pub alerts_emitted_total: AtomicU64,
    pub decode_errors_total: AtomicU64,
    pub enrich_fallbacks_total: AtomicU64,
    pub active_rules: AtomicUsize,
    start_time: SystemTime,
    events_this_sec: AtomicU64,
    events_per_sec: AtomicU64,
    events_by_channel: [AtomicU64; CHANNEL_SLOTS],
    dropped_by_channel: [AtomicU64; CHANNEL_SLOTS],
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            dropped_events_total: AtomicU64::new(0),
            alerts_emitted_total: AtomicU64::new(0),
            decode_errors_total: AtomicU64::new(0),
            enrich_fallbacks_total: AtomicU64::new(0),
            active_rules: AtomicUsize::new(0),
            start_time: SystemTime::now(),
            events_this_sec: AtomicU64::new(0),
            events_per_sec: AtomicU64::new(0),
            events_by_channel: std::array::from_fn(|_| AtomicU64::new(0)),
            dropped_by_channel: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Record an incoming record on `channel`. Returns `true` if it should
    /// be decoded and evaluated, `false` if it should be sampled out
    /// because `cap` (events/sec for this channel) has been exceeded.
    /// Above the cap, one in ten records is still let through so a sustained
    /// burst is visible rather than silent.
    pub fn record_event(&self, channel: Channel, cap: u64) -> bool {
        const SAMPLE_N: u64 = 10;
        let count = self.events_this_sec.fetch_add(1, Ordering::Relaxed) + 1;
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_by_channel[channel as usize].fetch_add(1, Ordering::Relaxed);
        if cap > 0 && count > cap && count % SAMPLE_N != 0 {
            self.dropped_events_total.fetch_add(1, Ordering::Relaxed);
            self.dropped_by_channel[channel as usize].fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn record_decode_error(&self) {
        self.decode_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that the path enricher (§4.3) fell through to its
    /// `UNKNOWN/<name>` placeholder instead of resolving a real path.
    pub fn inc_enrich_fallback(&self) {
        self.enrich_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_emitted(&self) {
        self.alerts_emitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted_total.load(Ordering::Relaxed)
    }

    pub fn set_active_rules(&self, count: usize) {
        self.active_rules.store(count, Ordering::Relaxed);
    }

    pub fn active_rules(&self) -> usize {
        self.active_rules.load(Ordering::Relaxed)
    }

    /// Called periodically (see `runtime::supervisor`) to refresh the
    /// events-per-second gauge from the rolling counter.
    pub fn rollup(&self) {
        let per_sec = self.events_this_sec.swap(0, Ordering::Relaxed);
        self.events_per_sec.store(per_sec, Ordering::Relaxed);
    }

    pub fn events_per_sec(&self) -> u64 {
        self.events_per_sec.load(Ordering::Relaxed)
    }

    pub fn events_by_channel(&self) -> [(Channel, u64); CHANNEL_SLOTS] {
        std::array::from_fn(|idx| {
            let channel = Channel::ALL[idx];
            (channel, self.events_by_channel[idx].load(Ordering::Relaxed))
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_events_trigger_sampling() {
        let m = Metrics::new();
        let cap = 5;
        let mut processed = 0;
        for _ in 0..100 {
            if m.record_event(Channel::Execve, cap) {
                processed += 1;
            }
        }
        assert!(m.dropped_events_total.load(Ordering::Relaxed) > 0);
        assert!(processed < 100);
    }

    #[test]
    fn zero_cap_disables_sampling() {
        let m = Metrics::new();
        for _ in 0..50 {
            assert!(m.record_event(Channel::Openat, 0));
        }
        assert_eq!(m.dropped_events_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn rollup_resets_the_per_second_counter() {
        let m = Metrics::new();
        for _ in 0..10 {
            m.record_event(Channel::Connect, 0);
        }
        m.rollup();
        assert_eq!(m.events_per_sec(), 10);
        m.rollup();
        assert_eq!(m.events_per_sec(), 0);
    }

    #[test]
    fn enrich_fallback_counter_increments() {
        let m = Metrics::new();
        m.inc_enrich_fallback();
        m.inc_enrich_fallback();
        assert_eq!(m.enrich_fallbacks_total.load(Ordering::Relaxed), 2);
    }
}
