//! Per-adapter daily call counter

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::utils::time::utc_day;

/// Calls made today against an optional cap. Resets when the UTC day rolls.
pub struct DailyUsage {
    cap: Option<u64>,
    state: Mutex<(String, u64)>,
}

impl DailyUsage {
    /// `None` or `Some(0)` means uncapped
    pub fn new(cap: Option<u64>) -> Self {
        Self {
            cap: cap.filter(|c| *c > 0),
            state: Mutex::new((String::new(), 0)),
        }
    }

    pub fn cap(&self) -> Option<u64> {
        self.cap
    }

    /// Reserve one call; false once today's cap is reached
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now())
    }

    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> bool {
        let day = utc_day(now);
        let mut state = self.state.lock();
        if state.0 != day {
            *state = (day, 0);
        }
        if let Some(cap) = self.cap
            && state.1 >= cap
        {
            return false;
        }
        state.1 += 1;
        true
    }

    pub fn used_today(&self) -> u64 {
        let state = self.state.lock();
        if state.0 == utc_day(Utc::now()) { state.1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cap_is_enforced_per_day() {
        let usage = DailyUsage::new(Some(2));
        let day1 = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert!(usage.try_acquire_at(day1));
        assert!(usage.try_acquire_at(day1));
        assert!(!usage.try_acquire_at(day1));

        let day2 = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 1).unwrap();
        assert!(usage.try_acquire_at(day2));
    }

    #[test]
    fn test_zero_cap_is_uncapped() {
        let usage = DailyUsage::new(Some(0));
        assert_eq!(usage.cap(), None);
        for _ in 0..100 {
            assert!(usage.try_acquire());
        }
        assert_eq!(usage.used_today(), 100);
    }
}
