//! Partition an event stream into units: overlapping time windows or sessions.

use super::{ColumnOrder, UnitId, UnitKind};
use crate::error::{PipelineError, Result};
use crate::events::{Event, RegexKeyExtractor};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One aggregation unit and the events it contains.
#[derive(Debug, Clone)]
pub struct Unit<'a> {
    pub id: UnitId,
    pub events: Vec<&'a Event>,
}

/// Units produced from one event stream, with the count of events that
/// could not be placed (unparseable timestamp or no session key).
#[derive(Debug, Clone)]
pub struct Units<'a> {
    pub kind: UnitKind,
    pub units: Vec<Unit<'a>>,
    pub dropped_events: usize,
}

/// Capability shared by both unit strategies.
pub trait Windower {
    fn units<'a>(&self, events: &'a [Event]) -> Result<Units<'a>>;

    /// Feature column order the strategy's matrices use.
    fn column_order(&self) -> ColumnOrder;
}

/// Lazy `(start, end)` window bounds for `start = t_min, t_min + step, ...`
/// while `start <= t_max`. A pure function of its inputs, so cloning it
/// restarts the sequence.
#[derive(Debug, Clone)]
pub struct TimeWindows {
    next: NaiveDateTime,
    last_start: NaiveDateTime,
    window: Duration,
    step: Duration,
}

/// Window bounds over `[t_min, t_max]`. A non-positive step yields nothing.
pub fn time_windows(
    t_min: NaiveDateTime,
    t_max: NaiveDateTime,
    window: Duration,
    step: Duration,
) -> TimeWindows {
    let (next, last_start) = if step > Duration::zero() {
        (t_min, t_max)
    } else {
        // empty: next already past last_start
        (t_max + Duration::nanoseconds(1), t_max)
    };
    TimeWindows {
        next,
        last_start,
        window,
        step,
    }
}

impl Iterator for TimeWindows {
    type Item = (NaiveDateTime, NaiveDateTime);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.last_start {
            return None;
        }
        let start = self.next;
        self.next = start + self.step;
        Some((start, start + self.window))
    }
}

/// Sliding (overlapping when step < window) time windows.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    step: Duration,
}

impl SlidingWindow {
    pub fn new(window_minutes: i64, step_minutes: i64) -> Result<Self> {
        if window_minutes <= 0 || step_minutes <= 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "sliding window needs positive window/step, got {window_minutes}/{step_minutes}"
            )));
        }
        Ok(Self {
            window: Duration::minutes(window_minutes),
            step: Duration::minutes(step_minutes),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn step(&self) -> Duration {
        self.step
    }
}

impl Windower for SlidingWindow {
    fn units<'a>(&self, events: &'a [Event]) -> Result<Units<'a>> {
        let mut timed: Vec<(NaiveDateTime, &'a Event)> = events
            .iter()
            .filter_map(|e| e.timestamp.map(|ts| (ts, e)))
            .collect();
        let dropped_events = events.len() - timed.len();
        if dropped_events > 0 {
            warn!(dropped_events, "events with unparseable timestamps dropped");
        }
        if timed.is_empty() {
            return Err(PipelineError::EmptyInput(
                "no event with a valid timestamp".to_string(),
            ));
        }
        timed.sort_by_key(|(ts, _)| *ts);
        let t_min = timed[0].0;
        let t_max = timed[timed.len() - 1].0;

        let units: Vec<Unit<'a>> = time_windows(t_min, t_max, self.window, self.step)
            .map(|(start, end)| {
                let lo = timed.partition_point(|(ts, _)| *ts < start);
                let hi = timed.partition_point(|(ts, _)| *ts < end);
                Unit {
                    id: UnitId::Window { start, end },
                    events: timed[lo..hi].iter().map(|(_, e)| *e).collect(),
                }
            })
            .collect();
        debug!(units = units.len(), %t_min, %t_max, "sliding windows generated");

        Ok(Units {
            kind: UnitKind::Window,
            units,
            dropped_events,
        })
    }

    fn column_order(&self) -> ColumnOrder {
        ColumnOrder::Sorted
    }
}

/// Maps an event to its session key, if it has one.
pub trait KeyExtractor {
    fn key(&self, event: &Event) -> Option<String>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Event) -> Option<String>,
{
    fn key(&self, event: &Event) -> Option<String> {
        self(event)
    }
}

impl KeyExtractor for RegexKeyExtractor {
    fn key(&self, event: &Event) -> Option<String> {
        self.extract(event)
    }
}

/// Groups events by session key; keyless events belong to no unit.
#[derive(Debug, Clone)]
pub struct SessionGrouping<K> {
    extractor: K,
    key_column: String,
}

impl<K: KeyExtractor> SessionGrouping<K> {
    pub fn new(extractor: K, key_column: impl Into<String>) -> Self {
        Self {
            extractor,
            key_column: key_column.into(),
        }
    }

    pub fn extractor(&self) -> &K {
        &self.extractor
    }
}

impl<K: KeyExtractor> Windower for SessionGrouping<K> {
    fn units<'a>(&self, events: &'a [Event]) -> Result<Units<'a>> {
        // BTreeMap: sessions come out sorted by key, stable across runs
        let mut groups: BTreeMap<String, Vec<&'a Event>> = BTreeMap::new();
        let mut dropped_events = 0usize;
        for event in events {
            match self.extractor.key(event) {
                Some(key) => groups.entry(key).or_default().push(event),
                None => dropped_events += 1,
            }
        }
        if dropped_events > 0 {
            debug!(dropped_events, "events without session key dropped");
        }
        if groups.is_empty() {
            return Err(PipelineError::EmptyInput(
                "no event carries a session key".to_string(),
            ));
        }
        let units = groups
            .into_iter()
            .map(|(key, events)| Unit {
                id: UnitId::Session(key),
                events,
            })
            .collect();
        Ok(Units {
            kind: UnitKind::Session {
                key_column: self.key_column.clone(),
            },
            units,
            dropped_events,
        })
    }

    fn column_order(&self) -> ColumnOrder {
        ColumnOrder::FirstSeen
    }
}
