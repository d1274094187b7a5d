//! Polling backoff for the read and write loops.
//!
//! There is no wait primitive that works across the region boundary, so both
//! halves poll. A waiting side spins briefly, then yields its time slice,
//! then sleeps with an interval that doubles up to the configured poll
//! interval. Every stage ends in another attempt; nothing is dropped.

use std::thread;
use std::time::Duration;

/// Rounds of `spin_loop` hints, doubling each round.
const SPIN_ROUNDS: u32 = 6;

/// Rounds of `yield_now` after spinning.
const YIELD_ROUNDS: u32 = 100;

/// First sleep once spinning and yielding are exhausted.
const MIN_SLEEP: Duration = Duration::from_micros(50);

#[derive(Debug, Clone)]
pub struct Backoff {
    round: u32,
    sleep: Duration,
    max_sleep: Duration,
}

impl Backoff {
    /// `max_sleep` caps the sleep between attempts once the waiter has
    /// stopped spinning.
    pub fn new(max_sleep: Duration) -> Self {
        let max_sleep = max_sleep.max(Duration::from_micros(1));
        Self {
            round: 0,
            sleep: MIN_SLEEP.min(max_sleep),
            max_sleep,
        }
    }

    /// Wait a little before the next attempt.
    pub fn snooze(&mut self) {
        if self.round < SPIN_ROUNDS {
            for _ in 0..(1u32 << self.round) {
                std::hint::spin_loop();
            }
        } else if self.round < SPIN_ROUNDS + YIELD_ROUNDS {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
            self.sleep = (self.sleep * 2).min(self.max_sleep);
        }
        self.round = self.round.saturating_add(1);
    }

    /// Start over after progress was made.
    pub fn reset(&mut self) {
        self.round = 0;
        self.sleep = MIN_SLEEP.min(self.max_sleep);
    }

    /// Whether the next `snooze` puts the thread to sleep.
    pub fn is_sleeping(&self) -> bool {
        self.round >= SPIN_ROUNDS + YIELD_ROUNDS
    }

    pub fn current_sleep(&self) -> Duration {
        self.sleep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spins_then_yields_then_sleeps() {
        let mut b = Backoff::new(Duration::from_millis(1));
        for _ in 0..SPIN_ROUNDS + YIELD_ROUNDS {
            assert!(!b.is_sleeping());
            b.snooze();
        }
        assert!(b.is_sleeping());
    }

    #[test]
    fn sleep_doubles_up_to_the_cap() {
        let mut b = Backoff::new(Duration::from_micros(300));
        while !b.is_sleeping() {
            b.snooze();
        }
        assert_eq!(b.current_sleep(), Duration::from_micros(50));
        b.snooze();
        assert_eq!(b.current_sleep(), Duration::from_micros(100));
        b.snooze();
        b.snooze();
        assert_eq!(b.current_sleep(), Duration::from_micros(300));
        b.snooze();
        assert_eq!(b.current_sleep(), Duration::from_micros(300));
    }

    #[test]
    fn reset_returns_to_spinning() {
        let mut b = Backoff::new(Duration::from_millis(1));
        while !b.is_sleeping() {
            b.snooze();
        }
        b.reset();
        assert!(!b.is_sleeping());
        assert_eq!(b.current_sleep(), MIN_SLEEP);
    }
}
