//! Tick ordering guard.
//!
//! Replay streams may be reopened (re-subscribe after an unsubscribe) or may
//! contain stale records. [`MonotonicGuard`] keeps the last delivered
//! timestamp per instrument and filters out anything older, so the engine
//! only ever sees time-ordered ticks. Equal timestamps pass: several quotes
//! may share one microsecond.

use ahash::AHashMap;

/// Per-instrument monotonic timestamp filter.
///
/// # Thread safety
///
/// Not synchronized. The replay feed keeps a single instance for all of its
/// tasks behind its state mutex.
pub struct MonotonicGuard {
    last_ts: AHashMap<String, u64>,
}

impl MonotonicGuard {
    pub fn new() -> Self {
        Self { last_ts: AHashMap::new() }
    }

    /// Returns `true` if `timestamp_us` is not older than the last accepted
    /// timestamp for `instrument`, recording it on acceptance.
    #[inline]
    pub fn check_and_update(&mut self, instrument: &str, timestamp_us: u64) -> bool {
        match self.last_ts.get_mut(instrument) {
            Some(last) if timestamp_us < *last => false,
            Some(last) => {
                *last = timestamp_us;
                true
            }
            None => {
                self.last_ts.insert(instrument.to_string(), timestamp_us);
                true
            }
        }
    }

    /// Returns the last accepted timestamp for an instrument, or `None`.
    pub fn last_ts(&self, instrument: &str) -> Option<u64> {
        self.last_ts.get(instrument).copied()
    }

    /// Forget one instrument.
    pub fn reset(&mut self, instrument: &str) {
        self.last_ts.remove(instrument);
    }
}

impl Default for MonotonicGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_basic() {
        let mut g = MonotonicGuard::new();
        assert!(g.check_and_update("SPY", 10));
        assert!(g.check_and_update("SPY", 10)); // same microsecond
        assert!(g.check_and_update("SPY", 11));
        assert!(!g.check_and_update("SPY", 5)); // stale
        assert_eq!(g.last_ts("SPY"), Some(11));
    }

    #[test]
    fn guard_multi_instrument() {
        let mut g = MonotonicGuard::new();
        assert!(g.check_and_update("SPY", 10));
        assert!(g.check_and_update("QQQ", 1));
        assert!(!g.check_and_update("SPY", 9));
        g.reset("SPY");
        assert!(g.check_and_update("SPY", 9));
    }
}
