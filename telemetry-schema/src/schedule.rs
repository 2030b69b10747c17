//! Fixed-interval gate for timed position polls.

use std::time::{Duration, Instant};

/// Default position poll interval shared by the standalone bridges.
pub const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fires at most once per `interval`, however often it is asked.
///
/// Host loops call [`PollTimer::fire`] far more often than the interval; the
/// calls in between are no-ops. The first fire happens one interval after
/// construction.
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    last_fire: Instant,
}

impl PollTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        PollTimer { interval, last_fire: now }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` (and re-arms) when the interval has elapsed since the last fire.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_fire) >= self.interval {
            self.last_fire = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_inside_the_interval_fire_once() {
        let t0 = Instant::now();
        let mut timer = PollTimer::new(POSITION_POLL_INTERVAL, t0);

        let fired = [
            timer.fire(t0 + Duration::from_millis(100)),
            timer.fire(t0 + Duration::from_millis(150)),
        ];
        assert_eq!(fired, [true, false]);
    }

    #[test]
    fn calls_past_the_interval_fire_twice() {
        let t0 = Instant::now();
        let mut timer = PollTimer::new(POSITION_POLL_INTERVAL, t0);

        assert!(timer.fire(t0 + Duration::from_millis(100)));
        assert!(timer.fire(t0 + Duration::from_millis(210)));
    }

    #[test]
    fn nothing_fires_before_the_first_interval() {
        let t0 = Instant::now();
        let mut timer = PollTimer::new(POSITION_POLL_INTERVAL, t0);
        assert!(!timer.fire(t0));
        assert!(!timer.fire(t0 + Duration::from_millis(99)));
    }

    #[test]
    fn earlier_instant_is_a_no_op() {
        let t0 = Instant::now();
        let mut timer = PollTimer::new(Duration::from_millis(10), t0 + Duration::from_secs(1));
        assert!(!timer.fire(t0));
    }
}
