//! CSV outputs: feature matrices and evaluation reports, all written under
//! one output directory.

use crate::analysis::LeakageSuspect;
use crate::error::Result;
use crate::eval::{FoldReport, ImportanceRecord, MetricSummary, SplitEvaluation, SplitReport};
use crate::features::{FeatureMatrix, UnitId, UnitKind};
use crate::reduce::ReductionReport;
use chrono::NaiveDateTime;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Counts print as integers; anything fractional keeps its decimals.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Metadata columns (see [`FeatureMatrix::metadata_columns`]) then one
/// column per feature, one line per unit.
pub fn write_matrix<W: Write>(w: W, matrix: &FeatureMatrix) -> Result<()> {
    let mut wtr = Writer::from_writer(w);
    let meta_columns = matrix.metadata_columns();
    let with_ts = matches!(matrix.kind(), UnitKind::Session { .. })
        && matrix.rows().iter().any(|r| r.timestamp.is_some());
    let with_label = matrix.is_labeled();

    wtr.write_record(meta_columns.iter().chain(matrix.columns()))?;
    let mut record: Vec<String> = Vec::with_capacity(meta_columns.len() + matrix.n_features());
    for (meta, values) in matrix.rows().iter().zip(matrix.values().rows()) {
        record.clear();
        match &meta.unit {
            UnitId::Window { start, end } => {
                record.push(format_timestamp(*start));
                record.push(format_timestamp(*end));
            }
            UnitId::Session(key) => {
                record.push(key.clone());
                if with_ts {
                    record.push(meta.timestamp.map(format_timestamp).unwrap_or_default());
                }
            }
        }
        if with_label {
            record.push(meta.label.map(|l| l.as_str().to_string()).unwrap_or_default());
        }
        record.extend(values.iter().map(|&v| format_value(v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Header line first, even when `rows` is empty, then one line per row.
fn write_rows<W: Write, T: Serialize>(
    w: W,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(w);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

const FOLD_HEADER: &[&str] = &[
    "model",
    "fold",
    "train_rows",
    "test_rows",
    "train_positives",
    "test_positives",
    "accuracy",
    "recall",
    "f1",
    "roc_auc",
    "pr_auc",
];

#[derive(Serialize)]
struct FoldRow<'a> {
    model: &'a str,
    fold: usize,
    train_rows: usize,
    test_rows: usize,
    train_positives: usize,
    test_positives: usize,
    accuracy: f64,
    recall: f64,
    f1: f64,
    roc_auc: Option<f64>,
    pr_auc: Option<f64>,
}

/// One line per fold; unavailable AUCs are empty fields.
pub fn write_fold_reports<W: Write>(w: W, reports: &[FoldReport]) -> Result<()> {
    write_rows(
        w,
        FOLD_HEADER,
        reports.iter().map(|r| FoldRow {
            model: &r.model,
            fold: r.fold,
            train_rows: r.train_rows,
            test_rows: r.test_rows,
            train_positives: r.train_positives,
            test_positives: r.test_positives,
            accuracy: r.metrics.accuracy,
            recall: r.metrics.recall,
            f1: r.metrics.f1,
            roc_auc: r.metrics.roc_auc,
            pr_auc: r.metrics.pr_auc,
        }),
    )
}

const SUMMARY_HEADER: &[&str] = &[
    "model", "folds", "accuracy", "recall", "f1", "roc_auc", "pr_auc",
];

#[derive(Serialize)]
struct SummaryRow<'a> {
    model: &'a str,
    folds: usize,
    accuracy: f64,
    recall: f64,
    f1: f64,
    roc_auc: Option<f64>,
    pr_auc: Option<f64>,
}

pub fn write_summaries<W: Write>(w: W, summaries: &[(String, MetricSummary)]) -> Result<()> {
    write_rows(
        w,
        SUMMARY_HEADER,
        summaries.iter().map(|(model, s)| SummaryRow {
            model,
            folds: s.folds,
            accuracy: s.accuracy,
            recall: s.recall,
            f1: s.f1,
            roc_auc: s.roc_auc,
            pr_auc: s.pr_auc,
        }),
    )
}

const SPLIT_HEADER: &[&str] = &[
    "model",
    "stage",
    "train_rows",
    "eval_rows",
    "eval_positives",
    "accuracy",
    "recall",
    "f1",
    "roc_auc",
    "pr_auc",
];

#[derive(Serialize)]
struct SplitRow<'a> {
    model: &'a str,
    stage: &'a str,
    train_rows: usize,
    eval_rows: usize,
    eval_positives: usize,
    accuracy: f64,
    recall: f64,
    f1: f64,
    roc_auc: Option<f64>,
    pr_auc: Option<f64>,
}

impl<'a> From<&'a SplitEvaluation> for SplitRow<'a> {
    fn from(e: &'a SplitEvaluation) -> Self {
        SplitRow {
            model: &e.model,
            stage: e.stage,
            train_rows: e.train_rows,
            eval_rows: e.eval_rows,
            eval_positives: e.eval_positives,
            accuracy: e.metrics.accuracy,
            recall: e.metrics.recall,
            f1: e.metrics.f1,
            roc_auc: e.metrics.roc_auc,
            pr_auc: e.metrics.pr_auc,
        }
    }
}

/// Two lines per model: the initial and the final fit.
pub fn write_split_reports<W: Write>(w: W, reports: &[SplitReport]) -> Result<()> {
    write_rows(
        w,
        SPLIT_HEADER,
        reports
            .iter()
            .flat_map(|r| [SplitRow::from(&r.initial), SplitRow::from(&r.final_model)]),
    )
}

#[derive(Serialize)]
struct ImportanceRow<'a> {
    rank: usize,
    feature: &'a str,
    importance_mean: f64,
    importance_std: f64,
}

/// Ranked importance table, most important first.
pub fn write_importances<W: Write>(w: W, records: &[ImportanceRecord]) -> Result<()> {
    write_rows(
        w,
        &["rank", "feature", "importance_mean", "importance_std"],
        records.iter().enumerate().map(|(i, r)| ImportanceRow {
            rank: i + 1,
            feature: &r.feature,
            importance_mean: r.importance_mean,
            importance_std: r.importance_std,
        }),
    )
}

#[derive(Serialize)]
struct ReductionRow<'a> {
    stage: &'a str,
    feature: String,
    decision: &'a str,
    detail: String,
}

/// Every feature that entered reduction with what happened to it.
pub fn write_reduction_report<W: Write>(w: W, report: &ReductionReport) -> Result<()> {
    let mut rows: Vec<ReductionRow<'_>> = report
        .removals()
        .into_iter()
        .map(|(stage, feature, detail)| ReductionRow {
            stage,
            feature,
            decision: "dropped",
            detail,
        })
        .collect();
    if let Some(vif) = &report.vif {
        rows.extend(vif.constant.iter().map(|c| ReductionRow {
            stage: "vif",
            feature: c.clone(),
            decision: "excluded",
            detail: "zero variance".to_string(),
        }));
    }
    let final_vif = |name: &str| {
        report
            .vif
            .as_ref()
            .and_then(|v| v.final_scores.iter().find(|(c, _)| c == name))
            .map(|(_, s)| format!("vif={s}"))
            .unwrap_or_default()
    };
    rows.extend(report.kept.iter().map(|c| ReductionRow {
        stage: "final",
        feature: c.clone(),
        decision: "kept",
        detail: final_vif(c),
    }));
    write_rows(w, &["stage", "feature", "decision", "detail"], rows)
}

pub fn write_leakage_suspects<W: Write>(w: W, suspects: &[LeakageSuspect]) -> Result<()> {
    write_rows(w, &["feature", "corr_with_label"], suspects)
}

/// Output directory holding every file of one run.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Open the directory, creating it if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Buffered writer on a fresh file in the directory.
    pub fn create(&self, name: &str) -> Result<BufWriter<File>> {
        let path = self.path(name);
        debug!(path = %path.display(), "writing output");
        Ok(BufWriter::new(File::create(path)?))
    }

    pub fn save_matrix(&self, name: &str, matrix: &FeatureMatrix) -> Result<PathBuf> {
        write_matrix(self.create(name)?, matrix)?;
        Ok(self.path(name))
    }

    pub fn save_fold_reports(&self, name: &str, reports: &[FoldReport]) -> Result<PathBuf> {
        write_fold_reports(self.create(name)?, reports)?;
        Ok(self.path(name))
    }

    pub fn save_summaries(&self, name: &str, summaries: &[(String, MetricSummary)]) -> Result<PathBuf> {
        write_summaries(self.create(name)?, summaries)?;
        Ok(self.path(name))
    }

    pub fn save_split_reports(&self, name: &str, reports: &[SplitReport]) -> Result<PathBuf> {
        write_split_reports(self.create(name)?, reports)?;
        Ok(self.path(name))
    }

    pub fn save_importances(&self, name: &str, records: &[ImportanceRecord]) -> Result<PathBuf> {
        write_importances(self.create(name)?, records)?;
        Ok(self.path(name))
    }

    pub fn save_reduction_report(&self, name: &str, report: &ReductionReport) -> Result<PathBuf> {
        write_reduction_report(self.create(name)?, report)?;
        Ok(self.path(name))
    }

    pub fn save_leakage_suspects(&self, name: &str, suspects: &[LeakageSuspect]) -> Result<PathBuf> {
        write_leakage_suspects(self.create(name)?, suspects)?;
        Ok(self.path(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::BinaryMetrics;
    use crate::features::{ColumnOrder, FeatureRow, Label, LabeledMatrix};
    use crate::reduce::{CorrelationDrop, CorrelationReport, DropReason};
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2008, 11, 9)
            .unwrap()
            .and_hms_opt(20, 35, 18)
            .unwrap()
    }

    fn session_matrix() -> FeatureMatrix {
        let rows = vec![
            FeatureRow {
                unit: UnitId::Session("blk_-7".into()),
                counts: [("E5".to_string(), 3)].into_iter().collect(),
            },
            FeatureRow {
                unit: UnitId::Session("blk_2".into()),
                counts: [("E22".to_string(), 1)].into_iter().collect(),
            },
        ];
        let m = FeatureMatrix::from_rows(
            UnitKind::Session {
                key_column: "BlockId".into(),
            },
            rows,
            ColumnOrder::FirstSeen,
        )
        .unwrap();
        let meta = m
            .rows()
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut r = r.clone();
                r.timestamp = Some(t0() + Duration::milliseconds(250 * i as i64));
                r.label = Some(if i == 0 { Label::Anomaly } else { Label::Normal });
                r
            })
            .collect();
        m.with_row_meta(meta).unwrap()
    }

    #[test]
    fn session_matrix_layout() {
        let mut buf = Vec::new();
        write_matrix(&mut buf, &session_matrix()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "BlockId,first_ts,Label,E5,E22");
        assert_eq!(lines[1], "blk_-7,2008-11-09 20:35:18,Anomaly,3,0");
        assert_eq!(lines[2], "blk_2,2008-11-09 20:35:18.250,Normal,0,1");
    }

    #[test]
    fn window_matrix_layout() {
        let start = t0();
        let rows = vec![FeatureRow {
            unit: UnitId::Window {
                start,
                end: start + Duration::minutes(5),
            },
            counts: [("E1".to_string(), 2)].into_iter().collect(),
        }];
        let m = FeatureMatrix::from_rows(UnitKind::Window, rows, ColumnOrder::Sorted).unwrap();
        let mut buf = Vec::new();
        write_matrix(&mut buf, &m).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "window_start,window_end,E1\n2008-11-09 20:35:18,2008-11-09 20:40:18,2\n"
        );
    }

    #[test]
    fn fold_report_leaves_unavailable_auc_empty() {
        let report = FoldReport {
            model: "random_forest".into(),
            fold: 3,
            train_rows: 40,
            test_rows: 10,
            train_positives: 4,
            test_positives: 0,
            metrics: BinaryMetrics {
                accuracy: 0.9,
                recall: 0.0,
                f1: 0.0,
                roc_auc: None,
                pr_auc: None,
            },
        };
        let mut buf = Vec::new();
        write_fold_reports(&mut buf, &[report]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "model,fold,train_rows,test_rows,train_positives,test_positives,accuracy,recall,f1,roc_auc,pr_auc"
        );
        assert_eq!(lines[1], "random_forest,3,40,10,4,0,0.9,0.0,0.0,,");
    }

    #[test]
    fn reduction_report_lists_drops_then_kept() {
        let report = ReductionReport {
            correlation: Some(CorrelationReport {
                examined: vec!["a".into(), "b".into()],
                dropped: vec![CorrelationDrop {
                    feature: "a".into(),
                    partner: "b".into(),
                    abs_corr: 1.0,
                    reason: DropReason::LowerVariance,
                }],
            }),
            vif: None,
            kept: vec!["b".into()],
        };
        let mut buf = Vec::new();
        write_reduction_report(&mut buf, &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "stage,feature,decision,detail");
        assert!(lines[1].starts_with("correlation,a,dropped,"));
        assert_eq!(lines[2], "final,b,kept,");
    }

    #[test]
    fn empty_reports_still_carry_a_header() {
        let mut buf = Vec::new();
        write_leakage_suspects(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "feature,corr_with_label\n");

        let mut buf = Vec::new();
        write_importances(&mut buf, &[]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "rank,feature,importance_mean,importance_std\n"
        );
    }

    #[test]
    fn store_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::open(&dir.path().join("out")).unwrap();
        let labeled = LabeledMatrix::new(session_matrix()).unwrap();
        let path = store.save_matrix("reduced.csv", labeled.matrix()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
