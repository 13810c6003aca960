//! Feature matrix construction: events -> units -> event-type histograms.
//!
//! A [`FeatureMatrix`] is an immutable value: ordering, labeling and reduction
//! all return new matrices.

mod aggregate;
pub mod chronology;
pub mod labels;
mod pipeline;
pub mod windowing;

pub use aggregate::{event_type_histogram, Aggregator, FeatureCounts};
pub use labels::{Label, LabelTable};
pub use pipeline::{Extraction, FeatureExtractor, UnitStrategy};
pub use windowing::{
    time_windows, KeyExtractor, SessionGrouping, SlidingWindow, TimeWindows, Unit, Units, Windower,
};

use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

pub const WINDOW_START_COLUMN: &str = "window_start";
pub const WINDOW_END_COLUMN: &str = "window_end";
pub const FIRST_TS_COLUMN: &str = "first_ts";
pub const LABEL_COLUMN: &str = "Label";

/// Identity of one aggregation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitId {
    /// Half-open time range `[start, end)`
    Window {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Session(String),
}

impl UnitId {
    pub fn session_key(&self) -> Option<&str> {
        match self {
            UnitId::Session(key) => Some(key),
            UnitId::Window { .. } => None,
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Window { start, end } => write!(f, "[{}, {})", start, end),
            UnitId::Session(key) => f.write_str(key),
        }
    }
}

/// How units were formed; decides the metadata columns of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Window,
    Session { key_column: String },
}

/// Feature column ordering applied during schema unification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrder {
    /// Lexicographic (sliding windows)
    Sorted,
    /// Order of first appearance across rows
    FirstSeen,
}

/// Aggregator output for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub unit: UnitId,
    pub counts: FeatureCounts,
}

/// Per-row metadata carried alongside the numeric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    pub unit: UnitId,
    /// Representative timestamp (window start, or first session event)
    pub timestamp: Option<NaiveDateTime>,
    pub label: Option<Label>,
}

impl RowMeta {
    pub fn new(unit: UnitId) -> Self {
        let timestamp = match &unit {
            UnitId::Window { start, .. } => Some(*start),
            UnitId::Session(_) => None,
        };
        Self {
            unit,
            timestamp,
            label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    kind: UnitKind,
    rows: Vec<RowMeta>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Build a matrix and check that metadata and values agree in shape.
    pub fn new(
        kind: UnitKind,
        rows: Vec<RowMeta>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != rows.len() || values.ncols() != columns.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "matrix shape {:?} does not match {} rows x {} columns",
                values.dim(),
                rows.len(),
                columns.len()
            )));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::InvalidConfig(format!(
                "duplicate feature column '{dup}'"
            )));
        }
        Ok(Self {
            kind,
            rows,
            columns,
            values,
        })
    }

    /// Unify the schema of aggregated rows: the column set is the union of
    /// all features, absent features are 0.
    pub fn from_rows(kind: UnitKind, rows: Vec<FeatureRow>, order: ColumnOrder) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput("no units to aggregate".to_string()));
        }
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for row in &rows {
            for name in row.counts.keys() {
                if seen.insert(name.as_str()) {
                    columns.push(name.clone());
                }
            }
        }
        if order == ColumnOrder::Sorted {
            columns.sort();
        }
        let index: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut values = Array2::<f64>::zeros((rows.len(), columns.len()));
        for (r, row) in rows.iter().enumerate() {
            for (name, &count) in &row.counts {
                values[[r, index[name.as_str()]]] = count as f64;
            }
        }
        let meta = rows.into_iter().map(|r| RowMeta::new(r.unit)).collect();
        Self::new(kind, meta, columns, values)
    }

    pub fn kind(&self) -> &UnitKind {
        &self.kind
    }

    pub fn rows(&self) -> &[RowMeta] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|i| self.values.column(i))
    }

    /// Names of the metadata columns written ahead of the features.
    pub fn metadata_columns(&self) -> Vec<String> {
        let mut out = match &self.kind {
            UnitKind::Window => vec![
                WINDOW_START_COLUMN.to_string(),
                WINDOW_END_COLUMN.to_string(),
            ],
            UnitKind::Session { key_column } => {
                let mut cols = vec![key_column.clone()];
                if self.rows.iter().any(|r| r.timestamp.is_some()) {
                    cols.push(FIRST_TS_COLUMN.to_string());
                }
                cols
            }
        };
        if self.is_labeled() {
            out.push(LABEL_COLUMN.to_string());
        }
        out
    }

    pub fn is_labeled(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.label.is_some())
    }

    /// Representative timestamps, `None` if any row lacks one.
    pub fn timestamps(&self) -> Option<Vec<NaiveDateTime>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            kind: self.kind.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// New matrix holding only the named feature columns; surviving columns
    /// keep their original relative order.
    pub fn retain_columns(&self, keep: &HashSet<String>) -> Self {
        let idx: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| keep.contains(*c))
            .map(|(i, _)| i)
            .collect();
        Self {
            kind: self.kind.clone(),
            rows: self.rows.clone(),
            columns: idx.iter().map(|&i| self.columns[i].clone()).collect(),
            values: self.values.select(Axis(1), &idx),
        }
    }

    /// Replace the row metadata (same length), keeping the values.
    pub fn with_row_meta(&self, rows: Vec<RowMeta>) -> Result<Self> {
        Self::new(
            self.kind.clone(),
            rows,
            self.columns.clone(),
            self.values.clone(),
        )
    }

    /// Sum of every feature column, keyed by name.
    pub fn column_totals(&self) -> BTreeMap<String, f64> {
        let totals = self.values.sum_axis(Axis(0));
        self.columns
            .iter()
            .zip(totals.iter())
            .map(|(c, &t)| (c.clone(), t))
            .collect()
    }
}

/// A feature matrix in which every row carries a label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    matrix: FeatureMatrix,
}

impl LabeledMatrix {
    pub fn new(matrix: FeatureMatrix) -> Result<Self> {
        let unlabeled: Vec<String> = matrix
            .rows()
            .iter()
            .filter(|r| r.label.is_none())
            .map(|r| r.unit.to_string())
            .collect();
        if !unlabeled.is_empty() {
            return Err(PipelineError::JoinIntegrity {
                missing: unlabeled.len(),
                side: "units",
                examples: unlabeled.into_iter().take(5).collect(),
            });
        }
        if matrix.n_rows() == 0 {
            return Err(PipelineError::EmptyInput("labeled matrix has no rows".to_string()));
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    pub fn into_inner(self) -> FeatureMatrix {
        self.matrix
    }

    pub fn features(&self) -> &Array2<f64> {
        self.matrix.values()
    }

    /// Labels as 0.0 (normal) / 1.0 (anomalous).
    pub fn labels(&self) -> Array1<f64> {
        self.matrix
            .rows()
            .iter()
            .map(|r| r.label.map(Label::as_f64).unwrap_or(0.0))
            .collect()
    }

    /// `(normal, anomalous)` row counts.
    pub fn class_counts(&self) -> (usize, usize) {
        let anomalous = self
            .matrix
            .rows()
            .iter()
            .filter(|r| r.label == Some(Label::Anomaly))
            .count();
        (self.matrix.n_rows() - anomalous, anomalous)
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.n_rows()
    }
}
