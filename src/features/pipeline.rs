//! Feature extraction pipeline: events -> units -> aggregated rows -> matrix.

use super::windowing::{SessionGrouping, SlidingWindow, Units, Windower};
use super::{
    event_type_histogram, Aggregator, ColumnOrder, FeatureCounts, FeatureMatrix, FeatureRow, Unit,
};
use crate::config::UnitsConfig;
use crate::error::Result;
use crate::events::{Event, RegexKeyExtractor};
use tracing::info;

/// Unit strategy selected from configuration.
#[derive(Debug, Clone)]
pub enum UnitStrategy {
    Sliding(SlidingWindow),
    Session(SessionGrouping<RegexKeyExtractor>),
}

impl UnitStrategy {
    pub fn from_config(config: &UnitsConfig) -> Result<Self> {
        Ok(match config {
            UnitsConfig::Sliding {
                window_minutes,
                step_minutes,
            } => UnitStrategy::Sliding(SlidingWindow::new(*window_minutes, *step_minutes)?),
            UnitsConfig::Session {
                key_column,
                key_pattern,
            } => UnitStrategy::Session(SessionGrouping::new(
                RegexKeyExtractor::new(key_pattern)?,
                key_column.clone(),
            )),
        })
    }
}

impl Windower for UnitStrategy {
    fn units<'a>(&self, events: &'a [Event]) -> Result<Units<'a>> {
        match self {
            UnitStrategy::Sliding(s) => s.units(events),
            UnitStrategy::Session(s) => s.units(events),
        }
    }

    fn column_order(&self) -> ColumnOrder {
        match self {
            UnitStrategy::Sliding(s) => s.column_order(),
            UnitStrategy::Session(s) => s.column_order(),
        }
    }
}

/// Matrix built from one event stream.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub matrix: FeatureMatrix,
    /// Events that belonged to no unit
    pub dropped_events: usize,
}

pub struct FeatureExtractor<W, A> {
    windower: W,
    aggregator: A,
}

impl<W: Windower> FeatureExtractor<W, fn(&Unit<'_>) -> FeatureCounts> {
    /// Extractor using the event-type histogram aggregation.
    pub fn histogram(windower: W) -> Self {
        Self::new(windower, event_type_histogram as fn(&Unit<'_>) -> FeatureCounts)
    }
}

impl<W: Windower, A: Aggregator> FeatureExtractor<W, A> {
    pub fn new(windower: W, aggregator: A) -> Self {
        Self {
            windower,
            aggregator,
        }
    }

    pub fn windower(&self) -> &W {
        &self.windower
    }

    /// One row per unit, schema unified over all units.
    pub fn extract(&self, events: &[Event]) -> Result<Extraction> {
        let units = self.windower.units(events)?;
        let rows: Vec<FeatureRow> = units
            .units
            .iter()
            .map(|unit| FeatureRow {
                unit: unit.id.clone(),
                counts: self.aggregator.aggregate(unit),
            })
            .collect();
        let matrix = FeatureMatrix::from_rows(units.kind, rows, self.windower.column_order())?;
        info!(
            events = events.len(),
            dropped_events = units.dropped_events,
            units = matrix.n_rows(),
            features = matrix.n_features(),
            "feature matrix built"
        );
        Ok(Extraction {
            matrix,
            dropped_events: units.dropped_events,
        })
    }
}
