//! Pairwise correlation pruning: single greedy pass over the upper triangle.

use crate::stats::{pearson, sample_variance};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Why a feature lost its correlated pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    LowerImportance,
    LowerVariance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationDrop {
    pub feature: String,
    /// Feature it was correlated with, which stays
    pub partner: String,
    pub abs_corr: f64,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationReport {
    /// Columns that entered the pass
    pub examined: Vec<String>,
    pub dropped: Vec<CorrelationDrop>,
}

impl CorrelationReport {
    pub fn dropped_names(&self) -> BTreeSet<String> {
        self.dropped.iter().map(|d| d.feature.clone()).collect()
    }
}

/// Absolute Pearson correlation between every pair of columns. Constant
/// columns yield NaN, which never crosses a threshold.
pub fn abs_correlation_matrix(values: ArrayView2<'_, f64>) -> Array2<f64> {
    let p = values.ncols();
    let mut corr = Array2::<f64>::from_elem((p, p), f64::NAN);
    for i in 0..p {
        for j in i..p {
            let c = pearson(values.column(i), values.column(j)).abs();
            corr[[i, j]] = c;
            corr[[j, i]] = c;
        }
    }
    corr
}

/// Select the columns to drop.
///
/// Columns are visited in input order; for column `b` every earlier column
/// `a` with `|corr(a, b)| >= threshold` is considered, skipping pairs where
/// either side is already dropped. Correlations are not recomputed after a
/// removal. With importances the lower-importance feature goes (missing
/// scores count as 0); otherwise the lower-variance one. On a tie `b` goes.
pub fn prune_correlated(
    columns: &[String],
    values: ArrayView2<'_, f64>,
    threshold: f64,
    importances: Option<&HashMap<String, f64>>,
) -> CorrelationReport {
    let mut report = CorrelationReport {
        examined: columns.to_vec(),
        dropped: Vec::new(),
    };
    if columns.len() < 2 {
        return report;
    }
    let corr = abs_correlation_matrix(values);
    let variances: Vec<f64> = (0..columns.len())
        .map(|j| sample_variance(values.column(j)))
        .collect();
    let mut removed = vec![false; columns.len()];

    for b in 0..columns.len() {
        for a in 0..b {
            let c = corr[[a, b]];
            if !(c >= threshold) || removed[a] || removed[b] {
                continue;
            }
            let (drop, keep, reason) = match importances {
                Some(imp) => {
                    let ia = imp.get(&columns[a]).copied().unwrap_or(0.0);
                    let ib = imp.get(&columns[b]).copied().unwrap_or(0.0);
                    let (d, k) = if ia < ib { (a, b) } else { (b, a) };
                    (d, k, DropReason::LowerImportance)
                }
                None => {
                    let (d, k) = if variances[a] < variances[b] {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    (d, k, DropReason::LowerVariance)
                }
            };
            removed[drop] = true;
            debug!(
                feature = %columns[drop],
                partner = %columns[keep],
                abs_corr = c,
                ?reason,
                "correlated feature dropped"
            );
            report.dropped.push(CorrelationDrop {
                feature: columns[drop].clone(),
                partner: columns[keep].clone(),
                abs_corr: c,
                reason,
            });
        }
    }
    info!(
        threshold,
        examined = columns.len(),
        dropped = report.dropped.len(),
        "correlation pruning done"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Axis};

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfectly_correlated_pair_drops_lower_variance() {
        let a = array![1.0, 2.0, 3.0, 7.0, 4.0];
        let b = &a * 3.0;
        let x = ndarray::stack(Axis(1), &[a.view(), b.view()]).unwrap();
        let report = prune_correlated(&names(&["a", "b"]), x.view(), 0.8, None);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].feature, "a");
        assert_eq!(report.dropped[0].partner, "b");
        assert_eq!(report.dropped[0].reason, DropReason::LowerVariance);
    }

    #[test]
    fn importances_override_variance() {
        let a = array![1.0, 2.0, 3.0, 7.0, 4.0];
        let b = &a * 3.0;
        let x = ndarray::stack(Axis(1), &[a.view(), b.view()]).unwrap();
        let imp: HashMap<String, f64> = [("a".to_string(), 0.4)].into_iter().collect();
        let report = prune_correlated(&names(&["a", "b"]), x.view(), 0.8, Some(&imp));
        // b has no score -> 0 -> lower
        assert_eq!(report.dropped[0].feature, "b");
        assert_eq!(report.dropped[0].reason, DropReason::LowerImportance);
    }

    #[test]
    fn equal_variance_tie_drops_later_column() {
        let a = array![1.0, 2.0, 3.0, 4.0];
        let b = array![2.0, 3.0, 4.0, 5.0];
        let x = ndarray::stack(Axis(1), &[a.view(), b.view()]).unwrap();
        let report = prune_correlated(&names(&["a", "b"]), x.view(), 0.8, None);
        assert_eq!(report.dropped[0].feature, "b");
    }

    #[test]
    fn constant_columns_never_pruned() {
        let x = array![[1.0, 5.0], [1.0, 6.0], [1.0, 9.0]];
        let report = prune_correlated(&names(&["c", "v"]), x.view(), 0.0, None);
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn single_pass_does_not_revisit_decisions() {
        // b = a + c with a, c uncorrelated: |corr(a,b)| ~ 0.68, |corr(b,c)| ~ 0.74.
        // Dropping b alone would suffice, but the greedy pass drops a on (a,b)
        // then c on (b,c) and keeps b.
        let a = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let c = array![2.5, -2.5, -2.5, 2.5, -2.5, 2.5, 2.5, -2.5];
        let b = &a + &c;
        let x = ndarray::stack(Axis(1), &[a.view(), b.view(), c.view()]).unwrap();
        let report = prune_correlated(&names(&["a", "b", "c"]), x.view(), 0.6, None);
        let dropped: Vec<&str> = report.dropped.iter().map(|d| d.feature.as_str()).collect();
        assert_eq!(dropped, vec!["a", "c"]);
        assert!(pearson(a.view(), c.view()).abs() < 1e-12);
    }

    #[test]
    fn pruning_its_own_output_is_idempotent() {
        let x = array![
            [1.0, 2.0, 0.0, 5.0],
            [2.0, 4.0, 1.0, 3.0],
            [3.0, 6.1, 0.0, 4.0],
            [4.0, 8.0, 1.0, 1.0],
            [5.0, 9.9, 0.0, 2.0]
        ];
        let cols = names(&["a", "b", "c", "d"]);
        let first = prune_correlated(&cols, x.view(), 0.8, None);
        let dropped = first.dropped_names();
        let keep: Vec<usize> = (0..cols.len())
            .filter(|&i| !dropped.contains(&cols[i]))
            .collect();
        let kept_cols: Vec<String> = keep.iter().map(|&i| cols[i].clone()).collect();
        let reduced = x.select(Axis(1), &keep);
        let second = prune_correlated(&kept_cols, reduced.view(), 0.8, None);
        assert!(second.dropped.is_empty());
    }
}
