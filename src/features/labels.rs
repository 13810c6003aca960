//! Binary labels: session label tables and failure-event window labeling.

use super::{FeatureMatrix, LabeledMatrix, UnitKind};
use crate::error::{PipelineError, Result};
use crate::events::Event;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    /// Accepts Normal/Anomaly in either case, 0/1 and True/False.
    pub fn parse(raw: &str) -> Option<Label> {
        match raw.trim() {
            "Normal" | "normal" | "0" | "False" | "false" => Some(Label::Normal),
            "Anomaly" | "anomaly" | "1" | "True" | "true" => Some(Label::Anomaly),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Label::Normal => 0.0,
            Label::Anomaly => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Anomaly => "Anomaly",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session key -> label.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: HashMap<String, Label>,
}

impl LabelTable {
    /// Build from raw `(key, value)` pairs. Unknown values and keys listed
    /// twice with different labels are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut labels = HashMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let label = Label::parse(value.as_ref()).ok_or_else(|| PipelineError::LabelValue {
                key: key.clone(),
                value: value.as_ref().to_string(),
            })?;
            if let Some(prev) = labels.insert(key.clone(), label) {
                if prev != label {
                    return Err(PipelineError::LabelValue {
                        key,
                        value: format!("{} conflicts with earlier {}", label, prev),
                    });
                }
            }
        }
        Ok(Self { labels })
    }

    pub fn get(&self, key: &str) -> Option<Label> {
        self.labels.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }
}

/// Join a session matrix with a label table on the session key.
///
/// Every unit must find a label. Labels with no unit are an error when
/// `require_all_labels` is set, otherwise only counted and logged.
pub fn attach_labels(
    matrix: &FeatureMatrix,
    table: &LabelTable,
    require_all_labels: bool,
) -> Result<LabeledMatrix> {
    if !matches!(matrix.kind(), UnitKind::Session { .. }) {
        return Err(PipelineError::missing_column(
            "session id",
            "window-based feature matrix",
        ));
    }
    let mut rows = matrix.rows().to_vec();
    let mut missing = Vec::new();
    for row in rows.iter_mut() {
        let key = row.unit.session_key().unwrap_or_default();
        match table.get(key) {
            Some(label) => row.label = Some(label),
            None => missing.push(key.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::JoinIntegrity {
            missing: missing.len(),
            side: "units",
            examples: missing.into_iter().take(5).collect(),
        });
    }

    let unit_keys: BTreeSet<&str> = matrix
        .rows()
        .iter()
        .filter_map(|r| r.unit.session_key())
        .collect();
    let mut orphans: Vec<&str> = table.keys().filter(|k| !unit_keys.contains(k)).collect();
    if !orphans.is_empty() {
        orphans.sort_unstable();
        if require_all_labels {
            return Err(PipelineError::JoinIntegrity {
                missing: orphans.len(),
                side: "labels",
                examples: orphans.iter().take(5).map(|k| k.to_string()).collect(),
            });
        }
        warn!(orphan_labels = orphans.len(), "label keys without a matching unit ignored");
    }

    let labeled = LabeledMatrix::new(matrix.with_row_meta(rows)?)?;
    let (normal, anomalous) = labeled.class_counts();
    info!(normal, anomalous, "labels attached");
    Ok(labeled)
}

/// Event types occurring on at least one line whose raw label differs from
/// `normal_value`.
pub fn failure_event_types(
    events: &[Event],
    label_field: &str,
    normal_value: &str,
) -> Result<BTreeSet<String>> {
    let mut failures = BTreeSet::new();
    for event in events {
        let raw = event
            .field(label_field)
            .ok_or_else(|| PipelineError::missing_column(label_field, "structured events"))?;
        if raw.trim() != normal_value {
            failures.insert(event.event_type.clone());
        }
    }
    Ok(failures)
}

/// Labeled matrix plus the per-row count of failure events.
#[derive(Debug, Clone)]
pub struct FailureLabeling {
    pub labeled: LabeledMatrix,
    pub failure_counts: Vec<u64>,
}

/// A unit is anomalous iff it contains at least one failure event type.
pub fn label_by_failure_events(
    matrix: &FeatureMatrix,
    failure_types: &BTreeSet<String>,
) -> Result<FailureLabeling> {
    let idx: Vec<usize> = failure_types
        .iter()
        .filter_map(|t| matrix.column_index(t))
        .collect();
    if idx.is_empty() {
        return Err(PipelineError::EmptyInput(
            "no failure event type among the matrix columns".to_string(),
        ));
    }
    let values = matrix.values();
    let failure_counts: Vec<u64> = (0..matrix.n_rows())
        .map(|r| idx.iter().map(|&c| values[[r, c]] as u64).sum())
        .collect();
    let mut rows = matrix.rows().to_vec();
    for (row, &count) in rows.iter_mut().zip(&failure_counts) {
        row.label = Some(if count > 0 {
            Label::Anomaly
        } else {
            Label::Normal
        });
    }
    let labeled = LabeledMatrix::new(matrix.with_row_meta(rows)?)?;
    let (normal, anomalous) = labeled.class_counts();
    info!(
        failure_types = idx.len(),
        normal, anomalous, "units labeled by failure events"
    );
    Ok(FailureLabeling {
        labeled,
        failure_counts,
    })
}
