use chrono::{DateTime, Duration, Utc};
use shuttle_core::{Booking, BookingStatus};

/// Minimum notice a passenger must give to cancel
#[derive(Debug, Clone, Copy)]
pub struct CancellationPolicy {
    pub min_notice: Duration,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self { min_notice: Duration::hours(2) }
    }
}

impl CancellationPolicy {
    pub fn new(min_notice: Duration) -> Self {
        Self { min_notice }
    }

    /// Departure is far enough away. Evaluate at action time; never cache.
    pub fn window_open(&self, departure: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        departure - now >= self.min_notice
    }

    pub fn is_cancellable(&self, booking: &Booking, now: DateTime<Utc>) -> bool {
        booking.status == BookingStatus::Confirmed && self.window_open(booking.departure_time, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_two_hours_is_allowed() {
        let policy = CancellationPolicy::default();
        let now = Utc::now();
        assert!(policy.window_open(now + Duration::hours(2), now));
        assert!(policy.window_open(now + Duration::hours(5), now));
    }

    #[test]
    fn under_two_hours_is_refused() {
        let policy = CancellationPolicy::default();
        let now = Utc::now();
        assert!(!policy.window_open(now + Duration::hours(2) - Duration::seconds(1), now));
        assert!(!policy.window_open(now - Duration::minutes(5), now));
    }
}
