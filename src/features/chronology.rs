//! Representative timestamps per unit and chronological row ordering.

use super::windowing::KeyExtractor;
use super::{FeatureMatrix, UnitId, UnitKind};
use crate::config::UnresolvedPolicy;
use crate::error::{PipelineError, Result};
use crate::events::Event;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{info, warn};

/// Ordered matrix plus the number of units dropped for lack of a timestamp.
#[derive(Debug, Clone)]
pub struct Ordered {
    pub matrix: FeatureMatrix,
    pub dropped_units: usize,
}

/// Timestamp of the first event (earliest in time) bearing each session key.
/// Events without a timestamp or key do not contribute.
pub fn first_occurrence<K: KeyExtractor>(
    events: &[Event],
    extractor: &K,
) -> HashMap<String, NaiveDateTime> {
    let mut first: HashMap<String, NaiveDateTime> = HashMap::new();
    for event in events {
        let Some(ts) = event.timestamp else {
            continue;
        };
        if let Some(key) = extractor.key(event) {
            first
                .entry(key)
                .and_modify(|t| {
                    if ts < *t {
                        *t = ts;
                    }
                })
                .or_insert(ts);
        }
    }
    first
}

/// Attach first-occurrence timestamps to a session matrix and sort it.
pub fn order_sessions(
    matrix: &FeatureMatrix,
    first_ts: &HashMap<String, NaiveDateTime>,
    policy: UnresolvedPolicy,
) -> Result<Ordered> {
    if !matches!(matrix.kind(), UnitKind::Session { .. }) {
        return Err(PipelineError::missing_column(
            "session id",
            "window-based feature matrix",
        ));
    }
    let mut rows = matrix.rows().to_vec();
    for row in rows.iter_mut() {
        if let UnitId::Session(key) = &row.unit {
            row.timestamp = first_ts.get(key).copied();
        }
    }
    let stamped = matrix.with_row_meta(rows)?;
    resolve_and_sort(&stamped, policy)
}

/// Window matrices: timestamp is the window start, re-sorted after any join.
pub fn order_windows(matrix: &FeatureMatrix) -> Result<Ordered> {
    let mut rows = matrix.rows().to_vec();
    for row in rows.iter_mut() {
        if let UnitId::Window { start, .. } = row.unit {
            row.timestamp = Some(start);
        }
    }
    resolve_and_sort(&matrix.with_row_meta(rows)?, UnresolvedPolicy::Error)
}

/// Apply the unresolved-timestamp policy, then stable-sort by timestamp.
pub fn resolve_and_sort(matrix: &FeatureMatrix, policy: UnresolvedPolicy) -> Result<Ordered> {
    let unresolved: Vec<usize> = matrix
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.timestamp.is_none())
        .map(|(i, _)| i)
        .collect();

    let kept: Vec<usize> = if unresolved.is_empty() {
        (0..matrix.n_rows()).collect()
    } else {
        match policy {
            UnresolvedPolicy::Error => {
                return Err(PipelineError::UnresolvedTimestamp {
                    count: unresolved.len(),
                    examples: unresolved
                        .iter()
                        .take(5)
                        .map(|&i| matrix.rows()[i].unit.to_string())
                        .collect(),
                })
            }
            UnresolvedPolicy::Drop => {
                warn!(
                    dropped_units = unresolved.len(),
                    "units without representative timestamp dropped"
                );
                (0..matrix.n_rows())
                    .filter(|i| matrix.rows()[*i].timestamp.is_some())
                    .collect()
            }
        }
    };
    if kept.is_empty() {
        return Err(PipelineError::EmptyInput(
            "no unit has a representative timestamp".to_string(),
        ));
    }

    let mut order = kept;
    // stable: ties keep their prior relative order
    order.sort_by_key(|&i| matrix.rows()[i].timestamp);
    let sorted = matrix.select_rows(&order);
    let dropped_units = matrix.n_rows() - sorted.n_rows();
    info!(
        units = sorted.n_rows(),
        dropped_units,
        "matrix ordered chronologically"
    );
    Ok(Ordered {
        dropped_units,
        matrix: sorted,
    })
}

/// Check that every row has a timestamp and that they never decrease.
pub fn ensure_chronological(matrix: &FeatureMatrix) -> Result<Vec<NaiveDateTime>> {
    let timestamps = matrix.timestamps().ok_or_else(|| {
        let missing: Vec<String> = matrix
            .rows()
            .iter()
            .filter(|r| r.timestamp.is_none())
            .map(|r| r.unit.to_string())
            .collect();
        PipelineError::UnresolvedTimestamp {
            count: missing.len(),
            examples: missing.into_iter().take(5).collect(),
        }
    })?;
    if let Some(row) = timestamps.windows(2).position(|w| w[1] < w[0]) {
        return Err(PipelineError::Unordered { row: row + 1 });
    }
    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RegexKeyExtractor;
    use crate::features::{ColumnOrder, FeatureRow};
    use chrono::{Duration, NaiveDate};

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2008, 11, 9)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn session_matrix(keys: &[&str]) -> FeatureMatrix {
        let rows = keys
            .iter()
            .map(|k| FeatureRow {
                unit: UnitId::Session(k.to_string()),
                counts: [("E1".to_string(), 1)].into_iter().collect(),
            })
            .collect();
        FeatureMatrix::from_rows(
            UnitKind::Session {
                key_column: "BlockId".into(),
            },
            rows,
            ColumnOrder::FirstSeen,
        )
        .unwrap()
    }

    #[test]
    fn first_occurrence_takes_earliest_timestamp() {
        let events = vec![
            Event::new(0, Some(t(50)), "E1", "blk_1"),
            Event::new(1, Some(t(10)), "E2", "blk_1"),
            Event::new(2, None, "E2", "blk_2"),
            Event::new(3, Some(t(30)), "E2", "blk_2"),
        ];
        let first = first_occurrence(&events, &RegexKeyExtractor::block_id().unwrap());
        assert_eq!(first["blk_1"], t(10));
        assert_eq!(first["blk_2"], t(30));
    }

    #[test]
    fn sessions_sorted_by_first_timestamp() {
        let m = session_matrix(&["blk_a", "blk_b", "blk_c"]);
        let first: HashMap<String, NaiveDateTime> = [
            ("blk_a".to_string(), t(30)),
            ("blk_b".to_string(), t(10)),
            ("blk_c".to_string(), t(20)),
        ]
        .into_iter()
        .collect();
        let ordered = order_sessions(&m, &first, UnresolvedPolicy::Error).unwrap();
        let keys: Vec<String> = ordered
            .matrix
            .rows()
            .iter()
            .map(|r| r.unit.to_string())
            .collect();
        assert_eq!(keys, vec!["blk_b", "blk_c", "blk_a"]);
        assert!(ensure_chronological(&ordered.matrix).is_ok());
        assert!(ordered
            .matrix
            .metadata_columns()
            .contains(&"first_ts".to_string()));
    }

    #[test]
    fn unresolved_session_is_error_or_dropped_per_policy() {
        let m = session_matrix(&["blk_a", "blk_b"]);
        let first: HashMap<String, NaiveDateTime> =
            [("blk_a".to_string(), t(0))].into_iter().collect();
        assert!(matches!(
            order_sessions(&m, &first, UnresolvedPolicy::Error),
            Err(PipelineError::UnresolvedTimestamp { count: 1, .. })
        ));
        let dropped = order_sessions(&m, &first, UnresolvedPolicy::Drop).unwrap();
        assert_eq!(dropped.dropped_units, 1);
        assert_eq!(dropped.matrix.n_rows(), 1);
    }

    #[test]
    fn windows_are_resorted_after_shuffle() {
        let rows = [2i64, 0, 1]
            .iter()
            .map(|&k| FeatureRow {
                unit: UnitId::Window {
                    start: t(k * 60),
                    end: t(k * 60 + 300),
                },
                counts: [("E1".to_string(), k as u64)].into_iter().collect(),
            })
            .collect();
        let m = FeatureMatrix::from_rows(UnitKind::Window, rows, ColumnOrder::Sorted).unwrap();
        assert!(matches!(
            ensure_chronological(&m),
            Err(PipelineError::Unordered { row: 1 })
        ));
        let ordered = order_windows(&m).unwrap();
        assert_eq!(ordered.matrix.values().column(0).to_vec(), vec![0.0, 1.0, 2.0]);
    }
}
