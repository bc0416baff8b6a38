//! Peak concurrency computed directly from presence intervals.
//!
//! Frame snapshots only show head counts at the moments they were taken.
//! Sweeping the raw intervals gives the exact maximum number of workers
//! present at once inside a window and every period where it was reached.

use serde::{Deserialize, Serialize};

use crate::models::{HasInterval, TimeWindow, Timestamp};

/// A closed period `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSpan {
    pub from: Timestamp,
    pub to: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyPeak {
    pub max_concurrent: usize,
    pub periods: Vec<PeakSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    // Starts sort before ends at the same instant: intervals are closed.
    Start,
    End,
}

/// Maximum overlap of `items` inside `window`, or `None` if nothing overlaps.
///
/// Intervals are clipped to the window; open intervals run to its end.
pub fn peak_concurrency<T: HasInterval>(items: &[T], window: &TimeWindow) -> Option<ConcurrencyPeak> {
    let mut events: Vec<(Timestamp, Edge)> = Vec::with_capacity(items.len() * 2);
    for item in items {
        let interval = item.interval();
        if !interval.overlaps(window) {
            continue;
        }
        let start = interval.start().max(window.start());
        let end = interval.end().unwrap_or(window.end()).min(window.end());
        events.push((start, Edge::Start));
        events.push((end, Edge::End));
    }
    if events.is_empty() {
        return None;
    }
    events.sort();

    let mut current = 0usize;
    let mut best = 0usize;
    let mut periods: Vec<PeakSpan> = Vec::new();
    let mut open_since: Option<Timestamp> = None;

    for (time, edge) in events {
        match edge {
            Edge::Start => {
                current += 1;
                if current > best {
                    best = current;
                    periods.clear();
                    open_since = Some(time);
                } else if current == best && open_since.is_none() {
                    open_since = Some(time);
                }
            }
            Edge::End => {
                if current == best {
                    if let Some(from) = open_since.take() {
                        periods.push(PeakSpan { from, to: time });
                    }
                }
                current -= 1;
            }
        }
    }

    Some(ConcurrencyPeak {
        max_concurrent: best,
        periods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interval, TrainId, UniformId, Worker, WorkerId};
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn worker(id: i64, start: i64, end: Option<i64>) -> Worker {
        Worker {
            id: WorkerId(id),
            train_id: TrainId(1),
            uniform_id: UniformId(1),
            helmet_on: true,
            presence: Interval::new(t(start), end.map(t)).unwrap(),
        }
    }

    #[test]
    fn test_no_overlap_returns_none() {
        let window = TimeWindow::new(t(100), t(200)).unwrap();
        assert!(peak_concurrency(&[worker(1, 0, Some(10))], &window).is_none());
        assert!(peak_concurrency::<Worker>(&[], &window).is_none());
    }

    #[test]
    fn test_single_peak() {
        let workers = vec![
            worker(1, 0, Some(50)),
            worker(2, 20, Some(40)),
            worker(3, 30, Some(60)),
        ];
        let window = TimeWindow::new(t(0), t(100)).unwrap();
        let peak = peak_concurrency(&workers, &window).unwrap();
        assert_eq!(peak.max_concurrent, 3);
        assert_eq!(peak.periods, vec![PeakSpan { from: t(30), to: t(40) }]);
    }

    #[test]
    fn test_touching_intervals_count_as_concurrent() {
        let workers = vec![worker(1, 0, Some(10)), worker(2, 10, Some(20))];
        let window = TimeWindow::new(t(0), t(20)).unwrap();
        let peak = peak_concurrency(&workers, &window).unwrap();
        assert_eq!(peak.max_concurrent, 2);
        assert_eq!(peak.periods, vec![PeakSpan { from: t(10), to: t(10) }]);
    }

    #[test]
    fn test_open_intervals_run_to_window_end() {
        let workers = vec![worker(1, 0, None), worker(2, 50, None)];
        let window = TimeWindow::new(t(10), t(80)).unwrap();
        let peak = peak_concurrency(&workers, &window).unwrap();
        assert_eq!(peak.max_concurrent, 2);
        assert_eq!(peak.periods, vec![PeakSpan { from: t(50), to: t(80) }]);
    }

    #[test]
    fn test_multiple_peak_periods() {
        let workers = vec![
            worker(1, 0, Some(10)),
            worker(2, 5, Some(10)),
            worker(3, 20, Some(30)),
            worker(4, 25, Some(35)),
        ];
        let window = TimeWindow::new(t(0), t(40)).unwrap();
        let peak = peak_concurrency(&workers, &window).unwrap();
        assert_eq!(peak.max_concurrent, 2);
        assert_eq!(
            peak.periods,
            vec![
                PeakSpan { from: t(5), to: t(10) },
                PeakSpan { from: t(25), to: t(30) }
            ]
        );
    }
}
