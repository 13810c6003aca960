//! Rolling-origin and fixed-split evaluation of one model family.

use super::folds::{chrono_split_60_20_20, rolling_origin_folds, FixedSplit, Fold};
use super::metrics::{binary_metrics, BinaryMetrics};
use crate::error::Result;
use crate::features::chronology::ensure_chronological;
use crate::features::LabeledMatrix;
use crate::model::{ClassWeight, ModelFactory};
use ndarray::{s, Array1, ArrayView1, ArrayView2};
use serde::Serialize;
use std::ops::Range;
use tracing::info;

/// Metrics of one rolling-origin fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldReport {
    pub model: String,
    pub fold: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Anomalous rows in the training segment
    pub train_positives: usize,
    pub test_positives: usize,
    pub metrics: BinaryMetrics,
}

/// Evaluation of one fit on the fixed split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitEvaluation {
    pub model: String,
    /// "initial" (train -> validation) or "final" (train+validation -> test)
    pub stage: &'static str,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub eval_positives: usize,
    pub metrics: BinaryMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitReport {
    pub split: FixedSplit,
    pub initial: SplitEvaluation,
    pub final_model: SplitEvaluation,
}

pub(crate) fn rows(x: ArrayView2<'_, f64>, r: Range<usize>) -> ArrayView2<'_, f64> {
    x.slice_move(s![r, ..])
}

pub(crate) fn labels(y: ArrayView1<'_, f64>, r: Range<usize>) -> ArrayView1<'_, f64> {
    y.slice_move(s![r])
}

pub(crate) fn positives(y: ArrayView1<'_, f64>) -> usize {
    y.iter().filter(|&&v| v >= 0.5).count()
}

/// Fit a fresh balanced model on `train` and score it on `test`.
fn fit_and_score(
    factory: &dyn ModelFactory,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    train: Range<usize>,
    test: Range<usize>,
) -> Result<BinaryMetrics> {
    let mut model = factory.build();
    model.fit(
        rows(x, train.clone()),
        labels(y, train),
        ClassWeight::Balanced,
    )?;
    let proba = model.predict_proba(rows(x, test.clone()))?;
    Ok(binary_metrics(labels(y, test), proba.view()))
}

/// Folds of a chronologically ordered labeled matrix.
pub fn folds_for(labeled: &LabeledMatrix, k: usize) -> Result<Vec<Fold>> {
    let timestamps = ensure_chronological(labeled.matrix())?;
    rolling_origin_folds(&timestamps, k)
}

/// Expanding-window CV: class reweighting on train only, test segments
/// scored at their true prevalence.
pub fn evaluate_rolling_origin(
    labeled: &LabeledMatrix,
    factory: &dyn ModelFactory,
    k: usize,
) -> Result<Vec<FoldReport>> {
    let folds = folds_for(labeled, k)?;
    let x = labeled.features().view();
    let y: Array1<f64> = labeled.labels();

    let mut reports = Vec::with_capacity(folds.len());
    for fold in folds {
        let metrics = fit_and_score(factory, x, y.view(), fold.train.clone(), fold.test.clone())?;
        let report = FoldReport {
            model: factory.name().to_string(),
            fold: fold.index,
            train_rows: fold.train.len(),
            test_rows: fold.test.len(),
            train_positives: positives(labels(y.view(), fold.train.clone())),
            test_positives: positives(labels(y.view(), fold.test.clone())),
            metrics,
        };
        info!(
            model = %report.model,
            fold = report.fold,
            train_rows = report.train_rows,
            test_rows = report.test_rows,
            test_positives = report.test_positives,
            pr_auc = ?report.metrics.pr_auc,
            roc_auc = ?report.metrics.roc_auc,
            f1 = report.metrics.f1,
            "fold evaluated"
        );
        reports.push(report);
    }
    Ok(reports)
}

/// 60/20/20 protocol: initial model train -> validation, final model
/// train+validation -> test.
pub fn evaluate_fixed_split(labeled: &LabeledMatrix, factory: &dyn ModelFactory) -> Result<SplitReport> {
    ensure_chronological(labeled.matrix())?;
    let split = chrono_split_60_20_20(labeled.n_rows())?;
    let x = labeled.features().view();
    let y = labeled.labels();
    let name = factory.name().to_string();

    let initial = SplitEvaluation {
        model: name.clone(),
        stage: "initial",
        train_rows: split.train.len(),
        eval_rows: split.validation.len(),
        eval_positives: positives(labels(y.view(), split.validation.clone())),
        metrics: fit_and_score(factory, x, y.view(), split.train.clone(), split.validation.clone())?,
    };
    let refit = split.train.start..split.validation.end;
    let final_model = SplitEvaluation {
        model: name,
        stage: "final",
        train_rows: refit.len(),
        eval_rows: split.test.len(),
        eval_positives: positives(labels(y.view(), split.test.clone())),
        metrics: fit_and_score(factory, x, y.view(), refit, split.test.clone())?,
    };
    info!(
        model = %final_model.model,
        validation_pr_auc = ?initial.metrics.pr_auc,
        test_pr_auc = ?final_model.metrics.pr_auc,
        "fixed split evaluated"
    );
    Ok(SplitReport {
        split,
        initial,
        final_model,
    })
}
