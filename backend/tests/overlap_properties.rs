//! Property tests for the interval predicate and the engines built on it.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use depot_analytics::models::{
    Interval, TimeWindow, Timestamp, TrainId, UniformId, Worker, WorkerId,
};
use depot_analytics::services::concurrency::peak_concurrency;
use depot_analytics::services::overlap::filter_overlapping;
use depot_analytics::services::retention::select_oldest;

fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn interval_strategy() -> impl Strategy<Value = (i64, Option<i64>)> {
    (0i64..1_000, proptest::option::of(0i64..500)).prop_map(|(start, len)| (start, len.map(|l| start + l)))
}

fn window_strategy() -> impl Strategy<Value = (i64, i64)> {
    (0i64..1_200, 0i64..400).prop_map(|(start, len)| (start, start + len))
}

fn make_interval((start, end): (i64, Option<i64>)) -> Interval {
    Interval::new(t(start), end.map(t)).unwrap()
}

fn worker(id: i64, bounds: (i64, Option<i64>)) -> Worker {
    Worker {
        id: WorkerId(id),
        train_id: TrainId(1),
        uniform_id: UniformId(1),
        helmet_on: true,
        presence: make_interval(bounds),
    }
}

proptest! {
    #[test]
    fn prop_overlap_matches_shared_instant(bounds in interval_strategy(), (ws, we) in window_strategy()) {
        let interval = make_interval(bounds);
        let window = TimeWindow::new(t(ws), t(we)).unwrap();

        let latest_start = bounds.0.max(ws);
        let earliest_end = bounds.1.map_or(we, |end| end.min(we));
        prop_assert_eq!(interval.overlaps(&window), latest_start <= earliest_end);
    }

    #[test]
    fn prop_closing_never_adds_overlaps(start in 0i64..1_000, len in 0i64..500, (ws, we) in window_strategy()) {
        let open = Interval::open(t(start));
        let closed = open.close(t(start + len)).unwrap();
        let window = TimeWindow::new(t(ws), t(we)).unwrap();
        prop_assert!(!closed.overlaps(&window) || open.overlaps(&window));
    }

    #[test]
    fn prop_filter_keeps_exactly_overlapping(
        all in proptest::collection::vec(interval_strategy(), 0..30),
        (ws, we) in window_strategy(),
    ) {
        let window = TimeWindow::new(t(ws), t(we)).unwrap();
        let workers: Vec<Worker> = all.iter().enumerate().map(|(i, b)| worker(i as i64, *b)).collect();
        let expected: Vec<WorkerId> = workers
            .iter()
            .filter(|w| w.presence.overlaps(&window))
            .map(|w| w.id)
            .collect();

        let kept: Vec<WorkerId> = filter_overlapping(workers, &window).into_iter().map(|w| w.id).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn prop_peak_concurrency_matches_brute_force(
        all in proptest::collection::vec(interval_strategy(), 1..20),
        (ws, we) in window_strategy(),
    ) {
        let window = TimeWindow::new(t(ws), t(we)).unwrap();
        let workers: Vec<Worker> = all.iter().enumerate().map(|(i, b)| worker(i as i64, *b)).collect();

        let clipped: Vec<(i64, i64)> = all
            .iter()
            .filter(|(s, e)| *s <= we && e.map_or(true, |e| e >= ws))
            .map(|(s, e)| ((*s).max(ws), e.map_or(we, |e| e.min(we))))
            .collect();
        let brute = clipped
            .iter()
            .map(|(instant, _)| clipped.iter().filter(|(s, e)| s <= instant && instant <= e).count())
            .max();

        let peak = peak_concurrency(&workers, &window);
        prop_assert_eq!(peak.as_ref().map(|p| p.max_concurrent), brute);
        if let Some(peak) = peak {
            prop_assert!(!peak.periods.is_empty());
            for span in &peak.periods {
                prop_assert!(span.from <= span.to);
                prop_assert!(window.contains(span.from) && window.contains(span.to));
            }
        }
    }

    #[test]
    fn prop_select_oldest_takes_earliest_starts(
        all in proptest::collection::vec(interval_strategy(), 0..30),
        batch in 1usize..10,
    ) {
        let workers: Vec<Worker> = all.iter().enumerate().map(|(i, b)| worker(i as i64, *b)).collect();
        let chosen = select_oldest(&workers, batch);
        prop_assert_eq!(chosen.len(), batch.min(workers.len()));

        let latest_chosen = chosen.iter().map(|w| (w.presence.start(), w.id)).max();
        if let Some(latest) = latest_chosen {
            for w in &workers {
                if !chosen.iter().any(|c| c.id == w.id) {
                    prop_assert!((w.presence.start(), w.id) > latest);
                }
            }
        }
    }
}
