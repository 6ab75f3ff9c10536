//! Process-local UTC clock whose readings never go backwards.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out UTC timestamps that are non-decreasing across the whole process,
/// even if the wall clock is stepped backwards between calls.
///
/// Resolution is one microsecond; readings are clamped to the last value issued.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Record a wall-clock reading and return it, or the latest issued
    /// timestamp if the reading is older.
    pub fn observe(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let micros = wall.timestamp_micros();
        let previous = self.last_micros.fetch_max(micros, Ordering::AcqRel);
        let issued = previous.max(micros);
        DateTime::from_timestamp_micros(issued).unwrap_or(wall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn successive_readings_do_not_decrease() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn backwards_step_is_clamped() {
        let clock = MonotonicClock::new();
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();

        assert_eq!(clock.observe(t0), t0);
        assert_eq!(clock.observe(t0 - Duration::seconds(30)), t0);

        let later = t0 + Duration::milliseconds(5);
        assert_eq!(clock.observe(later), later);
    }

    #[test]
    fn shared_between_threads() {
        let clock = std::sync::Arc::new(MonotonicClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    let mut prev = clock.now();
                    for _ in 0..500 {
                        let next = clock.now();
                        assert!(next >= prev);
                        prev = next;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
