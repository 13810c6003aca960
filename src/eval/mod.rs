//! Leakage-free evaluation: chronological folds, train-only reweighting,
//! untouched test segments, and permutation importance.

pub mod folds;
pub mod importance;
pub mod metrics;
pub mod rolling;

pub use folds::{chrono_split_60_20_20, rolling_origin_folds, FixedSplit, Fold};
pub use importance::{permutation_importance, FoldImportance, ImportanceRecord, ImportanceResult};
pub use metrics::{average_precision, binary_metrics, roc_auc, summarize, BinaryMetrics, MetricSummary};
pub use rolling::{
    evaluate_fixed_split, evaluate_rolling_origin, folds_for, FoldReport, SplitEvaluation,
    SplitReport,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        ColumnOrder, FeatureMatrix, FeatureRow, Label, LabeledMatrix, UnitId, UnitKind,
    };
    use crate::model::{ForestConfig, LogisticConfig, ModelKind};
    use chrono::{Duration, NaiveDate};

    /// `n` sessions one minute apart. "signal" fires on anomalous rows,
    /// "noise" is unrelated.
    fn labeled(n: usize, anomalous: impl Fn(usize) -> bool) -> LabeledMatrix {
        let t0 = NaiveDate::from_ymd_opt(2008, 11, 9)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        let rows: Vec<FeatureRow> = (0..n)
            .map(|i| FeatureRow {
                unit: UnitId::Session(format!("blk_{i}")),
                counts: [
                    ("signal".to_string(), if anomalous(i) { 3 } else { 0 }),
                    ("noise".to_string(), ((i * 7) % 5) as u64),
                ]
                .into_iter()
                .collect(),
            })
            .collect();
        let m = FeatureMatrix::from_rows(
            UnitKind::Session {
                key_column: "BlockId".into(),
            },
            rows,
            ColumnOrder::Sorted,
        )
        .unwrap();
        let meta = m
            .rows()
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut r = r.clone();
                r.timestamp = Some(t0 + Duration::minutes(i as i64));
                r.label = Some(if anomalous(i) {
                    Label::Anomaly
                } else {
                    Label::Normal
                });
                r
            })
            .collect();
        LabeledMatrix::new(m.with_row_meta(meta).unwrap()).unwrap()
    }

    fn forest() -> ModelKind {
        ModelKind::RandomForest(ForestConfig {
            n_trees: 10,
            ..Default::default()
        })
    }

    #[test]
    fn rolling_origin_reports_every_fold() {
        let data = labeled(60, |i| i % 6 == 0);
        let reports = evaluate_rolling_origin(&data, &forest(), 5).unwrap();
        assert_eq!(reports.len(), 5);
        for r in &reports {
            assert_eq!(r.test_rows, 10);
            assert!(r.metrics.pr_auc.unwrap() > 0.9, "fold {}", r.fold);
        }
        let train: Vec<usize> = reports.iter().map(|r| r.train_rows).collect();
        assert_eq!(train, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn fold_without_positives_reports_not_available() {
        // anomalies only early on -> late test folds have none
        let data = labeled(30, |i| i < 12 && i % 3 == 0);
        let reports = evaluate_rolling_origin(
            &data,
            &ModelKind::LogisticRegression(LogisticConfig::default()),
            2,
        )
        .unwrap();
        let last = reports.last().unwrap();
        assert_eq!(last.test_positives, 0);
        assert_eq!(last.metrics.pr_auc, None);
        assert_eq!(last.metrics.roc_auc, None);
    }

    #[test]
    fn fixed_split_fits_initial_and_final_models() {
        let data = labeled(50, |i| i % 5 == 0);
        let report = evaluate_fixed_split(&data, &forest()).unwrap();
        assert_eq!(report.initial.train_rows, 30);
        assert_eq!(report.initial.eval_rows, 10);
        assert_eq!(report.final_model.train_rows, 40);
        assert_eq!(report.final_model.eval_rows, 10);
        assert_eq!(report.initial.stage, "initial");
    }

    #[test]
    fn permutation_importance_ranks_signal_first() {
        let data = labeled(60, |i| i % 4 == 0);
        let result = permutation_importance(&data, &forest(), 3, 5, 42).unwrap();
        assert_eq!(result.records[0].feature, "signal");
        assert!(result.records[0].importance_mean > 0.0);
        assert!(result.records[1].importance_mean.abs() < 1e-9);
        assert!(result.skipped_folds.is_empty());
        assert_eq!(result.folds.len(), 3);

        let again = permutation_importance(&data, &forest(), 3, 5, 42).unwrap();
        assert_eq!(result.records, again.records);
    }

    #[test]
    fn importance_without_any_positive_test_is_empty() {
        let data = labeled(30, |i| i == 0);
        let result = permutation_importance(&data, &forest(), 2, 3, 1).unwrap();
        assert!(result.records.is_empty());
        assert!(result.folds.is_empty());
        assert_eq!(result.skipped_folds, vec![0, 1]);
    }
}
