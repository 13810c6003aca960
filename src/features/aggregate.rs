//! Unit -> feature mapping. The standard aggregation is an event-type histogram.

use super::windowing::Unit;
use std::collections::BTreeMap;

/// Integer feature values of one unit, keyed by feature name.
pub type FeatureCounts = BTreeMap<String, u64>;

/// Pluggable aggregation strategy. Any `Fn(&Unit) -> FeatureCounts` qualifies.
pub trait Aggregator {
    fn aggregate(&self, unit: &Unit<'_>) -> FeatureCounts;
}

impl<F> Aggregator for F
where
    F: Fn(&Unit<'_>) -> FeatureCounts,
{
    fn aggregate(&self, unit: &Unit<'_>) -> FeatureCounts {
        self(unit)
    }
}

/// Occurrences of each event type within the unit.
pub fn event_type_histogram(unit: &Unit<'_>) -> FeatureCounts {
    let mut counts = FeatureCounts::new();
    for event in &unit.events {
        *counts.entry(event.event_type.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::features::UnitId;

    #[test]
    fn histogram_counts_event_types() {
        let events = vec![
            Event::new(0, None, "E1", ""),
            Event::new(1, None, "E2", ""),
            Event::new(2, None, "E1", ""),
        ];
        let unit = Unit {
            id: UnitId::Session("blk_1".into()),
            events: events.iter().collect(),
        };
        let h = event_type_histogram(&unit);
        assert_eq!(h.get("E1"), Some(&2));
        assert_eq!(h.get("E2"), Some(&1));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn empty_unit_has_no_features() {
        let unit = Unit {
            id: UnitId::Session("blk_1".into()),
            events: Vec::new(),
        };
        assert!(event_type_histogram(&unit).is_empty());
    }
}
