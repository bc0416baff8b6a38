//! Time intervals with an optional open end.
//!
//! Trains, workers and activity records all describe a span of time whose end
//! may not be known yet. [`Interval`] captures that once: a `Bounded` interval
//! has a recorded end, an `Open` one is still running and extends into the
//! future for every query.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Timestamps are stored with second resolution.
pub type Timestamp = DateTime<Utc>;

/// Drop sub-second precision from a timestamp.
pub fn to_seconds(t: Timestamp) -> Timestamp {
    t.trunc_subsecs(0)
}

/// Errors raised when building intervals and query windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntervalError {
    #[error("interval end {end} precedes its start {start}")]
    EndBeforeStart { start: Timestamp, end: Timestamp },

    #[error("window start {start} is after window end {end}")]
    InvalidWindow { start: Timestamp, end: Timestamp },

    #[error("interval starting at {start} is already closed")]
    AlreadyClosed { start: Timestamp },

    #[error("lookback of {seconds}s before {end} is outside the representable range")]
    LookbackOutOfRange { end: Timestamp, seconds: i64 },
}

/// A time span that is either closed or still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalBounds", into = "IntervalBounds")]
pub enum Interval {
    Bounded { start: Timestamp, end: Timestamp },
    Open { start: Timestamp },
}

/// Wire form of an [`Interval`]: `{ "start": ..., "end": ... | null }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalBounds {
    pub start: Timestamp,
    #[serde(default)]
    pub end: Option<Timestamp>,
}

impl Interval {
    /// Build an interval, rejecting an end that precedes the start.
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> Result<Self, IntervalError> {
        let start = to_seconds(start);
        match end.map(to_seconds) {
            None => Ok(Interval::Open { start }),
            Some(end) if end < start => Err(IntervalError::EndBeforeStart { start, end }),
            Some(end) => Ok(Interval::Bounded { start, end }),
        }
    }

    pub fn open(start: Timestamp) -> Self {
        Interval::Open {
            start: to_seconds(start),
        }
    }

    pub fn bounded(start: Timestamp, end: Timestamp) -> Result<Self, IntervalError> {
        Self::new(start, Some(end))
    }

    pub fn start(&self) -> Timestamp {
        match *self {
            Interval::Bounded { start, .. } | Interval::Open { start } => start,
        }
    }

    pub fn end(&self) -> Option<Timestamp> {
        match *self {
            Interval::Bounded { end, .. } => Some(end),
            Interval::Open { .. } => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Interval::Open { .. })
    }

    /// Length of a closed interval. Open intervals have no duration yet.
    pub fn duration(&self) -> Option<Duration> {
        match *self {
            Interval::Bounded { start, end } => Some(end - start),
            Interval::Open { .. } => None,
        }
    }

    /// Record the end of an open interval.
    pub fn close(self, end: Timestamp) -> Result<Self, IntervalError> {
        match self {
            Interval::Open { start } => Self::bounded(start, end),
            Interval::Bounded { start, .. } => Err(IntervalError::AlreadyClosed { start }),
        }
    }

    /// Whether this interval intersects the closed window.
    ///
    /// `start <= window.end AND (end IS NULL OR end >= window.start)`.
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        self.start() <= window.end() && self.end().map_or(true, |end| end >= window.start())
    }
}

impl TryFrom<IntervalBounds> for Interval {
    type Error = IntervalError;

    fn try_from(bounds: IntervalBounds) -> Result<Self, Self::Error> {
        Interval::new(bounds.start, bounds.end)
    }
}

impl From<Interval> for IntervalBounds {
    fn from(interval: Interval) -> Self {
        IntervalBounds {
            start: interval.start(),
            end: interval.end(),
        }
    }
}

/// A closed query window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct TimeWindow {
    start: Timestamp,
    end: Timestamp,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WindowBounds {
    start: Timestamp,
    end: Timestamp,
}

impl TryFrom<WindowBounds> for TimeWindow {
    type Error = IntervalError;

    fn try_from(bounds: WindowBounds) -> Result<Self, Self::Error> {
        TimeWindow::new(bounds.start, bounds.end)
    }
}

impl TimeWindow {
    /// Build a window; `start == end` is allowed, `start > end` is not.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, IntervalError> {
        let (start, end) = (to_seconds(start), to_seconds(end));
        if start > end {
            return Err(IntervalError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The window `[now - length, now]`.
    pub fn trailing(now: Timestamp, length: Duration) -> Result<Self, IntervalError> {
        let end = to_seconds(now);
        let length = length.abs();
        let start = end
            .checked_sub_signed(length)
            .ok_or(IntervalError::LookbackOutOfRange {
                end,
                seconds: length.num_seconds(),
            })?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Records that occupy an interval of time.
pub trait HasInterval {
    fn interval(&self) -> Interval;

    /// Identity used to keep orderings deterministic when starts tie.
    fn record_id(&self) -> i64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn window(a: i64, b: i64) -> TimeWindow {
        TimeWindow::new(t(a), t(b)).unwrap()
    }

    #[test]
    fn test_new_rejects_end_before_start() {
        let err = Interval::new(t(10), Some(t(5))).unwrap_err();
        assert!(matches!(err, IntervalError::EndBeforeStart { .. }));
    }

    #[test]
    fn test_zero_length_interval_is_valid() {
        let interval = Interval::bounded(t(10), t(10)).unwrap();
        assert_eq!(interval.duration(), Some(Duration::zero()));
    }

    #[test]
    fn test_new_truncates_subseconds() {
        let start = t(0) + Duration::milliseconds(750);
        let interval = Interval::open(start);
        assert_eq!(interval.start(), t(0));
    }

    #[test]
    fn test_open_interval_overlaps_future_window() {
        let interval = Interval::open(t(0));
        assert!(interval.overlaps(&window(10, 20)));
    }

    #[test]
    fn test_open_interval_starting_after_window_is_excluded() {
        let interval = Interval::open(t(30));
        assert!(!interval.overlaps(&window(10, 20)));
    }

    #[test]
    fn test_closed_interval_ending_before_window_is_excluded() {
        let interval = Interval::bounded(t(0), t(5)).unwrap();
        assert!(!interval.overlaps(&window(10, 20)));
    }

    #[test]
    fn test_touching_boundaries_overlap() {
        let ends_at_start = Interval::bounded(t(0), t(10)).unwrap();
        let starts_at_end = Interval::bounded(t(20), t(30)).unwrap();
        assert!(ends_at_start.overlaps(&window(10, 20)));
        assert!(starts_at_end.overlaps(&window(10, 20)));
    }

    #[test]
    fn test_degenerate_window() {
        let interval = Interval::bounded(t(0), t(10)).unwrap();
        assert!(interval.overlaps(&window(10, 10)));
        assert!(!interval.overlaps(&window(11, 11)));
    }

    #[test]
    fn test_close_open_interval() {
        let closed = Interval::open(t(0)).close(t(5)).unwrap();
        assert_eq!(closed.end(), Some(t(5)));
        assert_eq!(closed.duration(), Some(Duration::seconds(5)));
    }

    #[test]
    fn test_close_rejects_already_closed() {
        let closed = Interval::bounded(t(0), t(5)).unwrap();
        assert!(matches!(
            closed.close(t(6)),
            Err(IntervalError::AlreadyClosed { .. })
        ));
    }

    #[test]
    fn test_close_rejects_end_before_start() {
        assert!(Interval::open(t(10)).close(t(9)).is_err());
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(matches!(
            TimeWindow::new(t(5), t(4)),
            Err(IntervalError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_trailing_window() {
        let w = TimeWindow::trailing(t(100), Duration::seconds(30)).unwrap();
        assert_eq!(w.start(), t(70));
        assert_eq!(w.end(), t(100));
        assert!(w.contains(t(70)));
        assert!(!w.contains(t(69)));
    }

    #[test]
    fn test_trailing_window_past_min_date_is_rejected() {
        let huge = Duration::try_hours(10_000_000_000).unwrap();
        assert!(matches!(
            TimeWindow::trailing(t(0), huge),
            Err(IntervalError::LookbackOutOfRange { .. })
        ));
    }

    #[test]
    fn test_interval_serde_shape() {
        let interval = Interval::open(t(0));
        let json = serde_json::to_value(interval).unwrap();
        assert!(json["end"].is_null());

        let parsed: Interval = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, interval);
    }

    #[test]
    fn test_interval_deserialize_validates() {
        let json = serde_json::json!({
            "start": "2024-01-01T10:00:00Z",
            "end": "2024-01-01T09:00:00Z",
        });
        assert!(serde_json::from_value::<Interval>(json).is_err());
    }
}
