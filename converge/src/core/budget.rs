//! Shared time budget helpers for deadline-bounded waits.

use std::time::{Duration, Instant};

/// Return the remaining time budget until `deadline` as observed at `now`.
///
/// `None` once the deadline has been reached.
pub fn remaining_budget(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline
        .checked_duration_since(now)
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return None;
    }
    Some(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_before_deadline() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(3);
        assert_eq!(
            remaining_budget(deadline, now),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn none_at_and_after_deadline() {
        let now = Instant::now();
        assert_eq!(remaining_budget(now, now), None);
        assert_eq!(remaining_budget(now, now + Duration::from_millis(1)), None);
    }
}
