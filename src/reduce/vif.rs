//! Recursive variance-inflation-factor pruning.
//!
//! VIF of column `i` is `1 / (1 - R²_i)` where `R²_i` comes from regressing
//! column `i` on every other column with an intercept. Columns that are
//! numerically singular get `+inf` instead of an error so they are removed
//! first.

use crate::stats::sample_variance;
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayView2, Axis};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Relative pivot tolerance for the Gram factorizations.
const PIVOT_TOL: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VifDrop {
    pub feature: String,
    pub vif: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VifReport {
    /// Zero-variance columns, kept but never scored
    pub constant: Vec<String>,
    /// Removals in the order they happened
    pub dropped: Vec<VifDrop>,
    /// Scores of the surviving scored columns at termination
    pub final_scores: Vec<(String, f64)>,
}

/// VIF of every column of `values`. Columns must be non-constant.
pub fn vif_scores(values: ArrayView2<'_, f64>) -> Vec<f64> {
    let p = values.ncols();
    if p == 0 {
        return Vec::new();
    }
    if p == 1 {
        return vec![1.0];
    }
    if values.iter().any(|v| !v.is_finite()) {
        warn!("non-finite values in VIF input, all scores set to infinity");
        return vec![f64::INFINITY; p];
    }
    let gram = centered_gram(values);

    if let Some(inv_diag) = inverse_diagonal(&gram) {
        return (0..p).map(|i| gram[(i, i)] * inv_diag[i]).collect();
    }

    debug!(columns = p, "Gram matrix singular, scoring columns one by one");
    (0..p).map(|i| vif_by_regression(&gram, i)).collect()
}

/// Drop the column with the highest VIF until every VIF is at most
/// `threshold` or a single scored column remains.
pub fn prune_vif(columns: &[String], values: ArrayView2<'_, f64>, threshold: f64) -> VifReport {
    let mut report = VifReport::default();
    let mut active: Vec<usize> = Vec::new();
    for (j, name) in columns.iter().enumerate() {
        let var = sample_variance(values.column(j));
        if var > 0.0 {
            active.push(j);
        } else {
            report.constant.push(name.clone());
        }
    }
    if !report.constant.is_empty() {
        debug!(constant = report.constant.len(), "constant columns excluded from VIF");
    }

    while active.len() > 1 {
        let sub = values.select(Axis(1), &active);
        let scores = vif_scores(sub.view());
        let (worst, max_vif) = scores
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            });
        if max_vif <= threshold {
            report.final_scores = active
                .iter()
                .zip(&scores)
                .map(|(&j, &v)| (columns[j].clone(), v))
                .collect();
            break;
        }
        let col = active.remove(worst);
        if max_vif.is_infinite() {
            warn!(feature = %columns[col], "VIF numerically unstable, treated as infinite");
        }
        debug!(feature = %columns[col], vif = max_vif, "high-VIF feature dropped");
        report.dropped.push(VifDrop {
            feature: columns[col].clone(),
            vif: max_vif,
        });
    }
    if active.len() == 1 && report.final_scores.is_empty() {
        report.final_scores = vec![(columns[active[0]].clone(), 1.0)];
    }

    info!(
        threshold,
        scored = columns.len() - report.constant.len(),
        dropped = report.dropped.len(),
        "VIF pruning done"
    );
    report
}

fn centered_gram(values: ArrayView2<'_, f64>) -> DMatrix<f64> {
    let means = values.mean_axis(Axis(0)).unwrap_or_default();
    let centered = &values - &means;
    let gram = centered.t().dot(&centered);
    DMatrix::from_fn(gram.nrows(), gram.ncols(), |r, c| gram[[r, c]])
}

/// Diagonal of the Gram inverse via Cholesky, or `None` when any pivot falls
/// below tolerance.
fn inverse_diagonal(gram: &DMatrix<f64>) -> Option<Vec<f64>> {
    let chol = gram.clone().cholesky()?;
    let l = chol.l_dirty();
    let stable = (0..gram.nrows()).all(|j| l[(j, j)] * l[(j, j)] > PIVOT_TOL * gram[(j, j)]);
    if !stable {
        return None;
    }
    let inv = chol.inverse();
    Some((0..gram.nrows()).map(|i| inv[(i, i)]).collect())
}

/// VIF of column `target` from a least-squares fit on the other columns,
/// using the pseudo-inverse so rank-deficient regressors still score.
fn vif_by_regression(gram: &DMatrix<f64>, target: usize) -> f64 {
    let tss = gram[(target, target)];
    let others: Vec<usize> = (0..gram.nrows()).filter(|&j| j != target).collect();
    let m = others.len();
    let a = DMatrix::from_fn(m, m, |r, c| gram[(others[r], others[c])]);
    let b = DVector::from_fn(m, |r, _| gram[(others[r], target)]);

    let eps = PIVOT_TOL * a.diagonal().max().max(f64::MIN_POSITIVE);
    let Ok(pinv) = a.pseudo_inverse(eps) else {
        return f64::INFINITY;
    };
    let beta = pinv * &b;
    let ssr = tss - beta.dot(&b);
    if !ssr.is_finite() || ssr <= PIVOT_TOL * tss {
        return f64::INFINITY;
    }
    tss / ssr
}
