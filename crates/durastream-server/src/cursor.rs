//! CDN cursor clock.
//!
//! Live responses carry a `Stream-Cursor` token that clients echo back on
//! their next request. The token is the number of fixed-width intervals
//! since a fixed epoch, so every request within the same interval computes
//! the same cursor and a CDN can collapse the concurrent long-poll herd into
//! one cache entry.
//!
//! The hazard is a cached response that keeps returning the cursor a client
//! just sent: the client would loop on the same cache key forever. When the
//! client's previous cursor collides with (or is ahead of) the freshly
//! computed one, the response cursor jumps ahead by a random jitter instead,
//! which both breaks the loop and spreads the herd's next cache keys.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Interval-quantized cursor generator.
#[derive(Debug, Clone, Copy)]
pub struct CursorClock {
    interval_secs: u64,
    epoch: DateTime<Utc>,
}

impl CursorClock {
    pub fn new(interval: Duration, epoch: DateTime<Utc>) -> Self {
        Self {
            interval_secs: interval.as_secs().max(1),
            epoch,
        }
    }

    /// The cursor for the current interval.
    pub fn current(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.epoch)
            .num_seconds()
            .max(0) as u64;
        elapsed / self.interval_secs
    }

    /// The cursor to return for a request that supplied `previous`.
    ///
    /// Guarantees: non-decreasing within an interval, identical for all
    /// non-colliding requests in the same interval, and strictly greater
    /// than a colliding `previous`.
    pub fn response_cursor(&self, previous: Option<u64>) -> u64 {
        let current = self.current();
        match previous {
            Some(prev) if prev >= current => {
                let jitter_secs: u64 = rand::thread_rng().gen_range(1..=3600);
                prev + jitter_secs.div_ceil(self.interval_secs).max(1)
            }
            _ => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn clock_with_elapsed(interval_secs: u64, elapsed_secs: i64) -> CursorClock {
        CursorClock::new(
            Duration::from_secs(interval_secs),
            Utc::now() - ChronoDuration::seconds(elapsed_secs),
        )
    }

    #[test]
    fn current_counts_whole_intervals() {
        let clock = clock_with_elapsed(20, 100);
        let cursor = clock.current();
        assert!((4..=6).contains(&cursor), "cursor was {cursor}");
    }

    #[test]
    fn stable_within_an_interval() {
        let clock = clock_with_elapsed(3600, 10);
        assert_eq!(clock.current(), clock.current());
        assert_eq!(clock.response_cursor(None), clock.response_cursor(None));
    }

    #[test]
    fn epoch_in_the_future_clamps_to_zero() {
        let clock = CursorClock::new(
            Duration::from_secs(20),
            Utc::now() + ChronoDuration::hours(1),
        );
        assert_eq!(clock.current(), 0);
    }

    #[test]
    fn behind_client_gets_current() {
        let clock = clock_with_elapsed(20, 10_000);
        let current = clock.current();
        assert_eq!(clock.response_cursor(Some(current - 42)), current);
    }

    #[test]
    fn collision_advances_strictly() {
        let clock = clock_with_elapsed(20, 10_000);
        let current = clock.current();
        for _ in 0..100 {
            let bumped = clock.response_cursor(Some(current));
            assert!(bumped > current);
            // Jitter is at most 3600 s, i.e. 180 intervals of 20 s.
            assert!(bumped <= current + 180);
        }
    }

    #[test]
    fn ahead_client_advances_strictly() {
        let clock = clock_with_elapsed(20, 10_000);
        let ahead = clock.current() + 500;
        let bumped = clock.response_cursor(Some(ahead));
        assert!(bumped > ahead);
    }

    #[test]
    fn coarse_intervals_still_advance_on_collision() {
        // With a 2-hour interval, ceil(jitter/interval) would floor to zero;
        // the advance must still be at least one interval.
        let clock = clock_with_elapsed(7200, 100_000);
        let current = clock.current();
        assert!(clock.response_cursor(Some(current)) > current);
    }
}
