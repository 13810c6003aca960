//! Permutation importance, computed per rolling-origin fold.

use super::metrics::average_precision;
use super::rolling::{folds_for, labels, positives, rows};
use crate::error::{PipelineError, Result};
use crate::features::LabeledMatrix;
use crate::model::{ClassWeight, Classifier, ModelFactory};
use crate::stats::population_std;
use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceRecord {
    pub feature: String,
    /// Mean over folds of the per-fold mean PR-AUC drop
    pub importance_mean: f64,
    /// Standard deviation of the per-fold means
    pub importance_std: f64,
}

/// Per-feature repeat statistics inside one fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldImportance {
    pub fold: usize,
    pub baseline_pr_auc: f64,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceResult {
    /// Sorted by descending mean importance
    pub records: Vec<ImportanceRecord>,
    pub folds: Vec<FoldImportance>,
    pub skipped_folds: Vec<usize>,
}

/// Independent stream per (fold, feature, repeat), so results do not depend
/// on how repeats are scheduled across threads.
fn repeat_seed(seed: u64, fold: usize, feature: usize, repeat: usize) -> u64 {
    seed ^ (fold as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (feature as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ (repeat as u64).wrapping_mul(0x1656_67B1_9E37_79F9)
}

/// PR-AUC drops of `n_repeats` permutations of column `feature` of `x_test`.
pub fn permutation_drops(
    model: &dyn Classifier,
    x_test: ArrayView2<'_, f64>,
    y_test: ArrayView1<'_, f64>,
    feature: usize,
    n_repeats: usize,
    baseline: f64,
    seed_of: impl Fn(usize) -> u64 + Sync,
) -> Result<Vec<f64>> {
    (0..n_repeats)
        .into_par_iter()
        .map(|r| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed_of(r));
            let mut column = x_test.column(feature).to_vec();
            column.shuffle(&mut rng);
            let mut permuted = x_test.to_owned();
            permuted
                .column_mut(feature)
                .iter_mut()
                .zip(column)
                .for_each(|(dst, v)| *dst = v);
            let proba = model.predict_proba(permuted.view())?;
            let score = average_precision(y_test, proba.view()).unwrap_or(0.0);
            Ok(baseline - score)
        })
        .collect()
}

/// Unweighted refit per fold, test-only permutations, folds without a
/// positive test row skipped. When every fold is skipped the result has no
/// records.
pub fn permutation_importance(
    labeled: &LabeledMatrix,
    factory: &dyn ModelFactory,
    k: usize,
    n_repeats: usize,
    seed: u64,
) -> Result<ImportanceResult> {
    if n_repeats == 0 {
        return Err(PipelineError::InvalidConfig(
            "permutation importance needs at least one repeat".to_string(),
        ));
    }
    let folds = folds_for(labeled, k)?;
    let x = labeled.features().view();
    let y = labeled.labels();
    let columns = labeled.matrix().columns();

    let mut per_fold = Vec::new();
    let mut skipped = Vec::new();
    for fold in &folds {
        let y_test = labels(y.view(), fold.test.clone());
        if positives(y_test) == 0 {
            warn!(fold = fold.index, "no anomalous row in test segment, importance fold skipped");
            skipped.push(fold.index);
            continue;
        }
        let mut model = factory.build();
        model.fit(
            rows(x, fold.train.clone()),
            labels(y.view(), fold.train.clone()),
            ClassWeight::Uniform,
        )?;
        let x_test = rows(x, fold.test.clone());
        let baseline_proba = model.predict_proba(x_test)?;
        let baseline = average_precision(y_test, baseline_proba.view()).unwrap_or(0.0);

        let mut means = Vec::with_capacity(columns.len());
        let mut stds = Vec::with_capacity(columns.len());
        for j in 0..columns.len() {
            let drops = permutation_drops(
                model.as_ref(),
                x_test,
                y_test,
                j,
                n_repeats,
                baseline,
                |r| repeat_seed(seed, fold.index, j, r),
            )?;
            means.push(drops.iter().sum::<f64>() / drops.len() as f64);
            stds.push(population_std(&drops));
        }
        debug!(fold = fold.index, baseline, "fold importances computed");
        per_fold.push(FoldImportance {
            fold: fold.index,
            baseline_pr_auc: baseline,
            means,
            stds,
        });
    }
    if per_fold.is_empty() {
        warn!(
            model = factory.name(),
            folds_skipped = skipped.len(),
            "no fold has an anomalous test row, importances left empty"
        );
        return Ok(ImportanceResult {
            records: Vec::new(),
            folds: per_fold,
            skipped_folds: skipped,
        });
    }

    let mut records: Vec<ImportanceRecord> = columns
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let fold_means: Vec<f64> = per_fold.iter().map(|f| f.means[j]).collect();
            ImportanceRecord {
                feature: name.clone(),
                importance_mean: fold_means.iter().sum::<f64>() / fold_means.len() as f64,
                importance_std: population_std(&fold_means),
            }
        })
        .collect();
    records.sort_by(|a, b| b.importance_mean.total_cmp(&a.importance_mean));

    info!(
        model = factory.name(),
        folds_used = per_fold.len(),
        folds_skipped = skipped.len(),
        top = records.first().map(|r| r.feature.as_str()).unwrap_or(""),
        "permutation importance done"
    );
    Ok(ImportanceResult {
        records,
        folds: per_fold,
        skipped_folds: skipped,
    })
}
