//! Closed time windows anchored on an instant

use chrono::{DateTime, Duration, Utc};

/// Inclusive `[start, end]` interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn anchored(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Items whose instant falls inside the window; items without an instant never match
    pub fn select<'a, T>(
        &self,
        items: &[&'a T],
        instant_of: impl Fn(&T) -> Option<DateTime<Utc>>,
    ) -> Vec<&'a T> {
        items
            .iter()
            .copied()
            .filter(|item| instant_of(item).map_or(false, |ts| self.contains(ts)))
            .collect()
    }
}

/// Signed seconds from `from` to `to`, millisecond precision
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_bounds_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = TimeWindow::anchored(t0, Duration::seconds(120));

        assert!(window.contains(t0));
        assert!(window.contains(t0 + Duration::seconds(120)));
        assert!(!window.contains(t0 + Duration::seconds(121)));
        assert!(!window.contains(t0 - Duration::seconds(1)));
    }

    #[test]
    fn test_select_skips_missing_instants() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = TimeWindow::anchored(t0, Duration::minutes(10));
        let stamps = [Some(t0), None, Some(t0 + Duration::minutes(11))];
        let refs: Vec<&Option<DateTime<Utc>>> = stamps.iter().collect();

        let selected = window.select(&refs, |ts| *ts);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_seconds_between() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(seconds_between(t0, t0 + Duration::milliseconds(5500)), 5.5);
    }
}
