//! Poll interval schedule.

use std::time::Duration;

/// How long to sleep between refresh calls.
///
/// Without `fixed`, the interval doubles from `initial` after each refresh and is
/// capped at `max`. `min` is a floor applied to every interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub max: Duration,
    pub fixed: Option<Duration>,
    pub min: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            fixed: None,
            min: Duration::ZERO,
        }
    }
}

impl PollSchedule {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            fixed: Some(interval),
            ..Self::default()
        }
    }

    /// Interval after refresh number `attempt` (1-based).
    pub fn interval(&self, attempt: u32) -> Duration {
        let base = match self.fixed {
            Some(interval) => interval,
            None => {
                let doublings = attempt.saturating_sub(1).min(31);
                self.initial
                    .checked_mul(1u32 << doublings)
                    .unwrap_or(self.max)
                    .min(self.max)
            }
        };
        base.max(self.min)
    }

    /// Interval after refresh `attempt`, never longer than `remaining`.
    pub fn next_sleep(&self, attempt: u32, remaining: Duration) -> Duration {
        self.interval(attempt).min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_until_cap() {
        let schedule = PollSchedule::default();
        let intervals: Vec<u64> = (1..=9)
            .map(|attempt| schedule.interval(attempt).as_millis() as u64)
            .collect();
        assert_eq!(
            intervals,
            vec![100, 200, 400, 800, 1600, 3200, 6400, 10_000, 10_000]
        );
    }

    #[test]
    fn exponential_never_overflows() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.interval(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn fixed_ignores_attempt() {
        let schedule = PollSchedule::fixed(Duration::from_secs(5));
        assert_eq!(schedule.interval(1), Duration::from_secs(5));
        assert_eq!(schedule.interval(40), Duration::from_secs(5));
    }

    #[test]
    fn floor_applies_to_every_interval() {
        let schedule = PollSchedule {
            min: Duration::from_secs(1),
            ..PollSchedule::default()
        };
        assert_eq!(schedule.interval(1), Duration::from_secs(1));
        assert_eq!(schedule.interval(6), Duration::from_millis(3200));
    }

    #[test]
    fn next_sleep_is_bounded_by_remaining_budget() {
        let schedule = PollSchedule::fixed(Duration::from_secs(5));
        assert_eq!(
            schedule.next_sleep(1, Duration::from_secs(2)),
            Duration::from_secs(2)
        );
        assert_eq!(
            schedule.next_sleep(1, Duration::from_secs(30)),
            Duration::from_secs(5)
        );
    }
}
