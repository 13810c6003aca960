//! Binary classification metrics on an untouched test segment.

use ndarray::ArrayView1;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    /// Recall of the anomalous class; 0 when the segment has no positives
    pub recall: f64,
    pub f1: f64,
    /// `None` when the segment lacks one of the classes
    pub roc_auc: Option<f64>,
    /// Average precision; `None` without positives
    pub pr_auc: Option<f64>,
}

/// Score probabilities against labels, thresholding predictions at 0.5.
pub fn binary_metrics(y_true: ArrayView1<'_, f64>, proba: ArrayView1<'_, f64>) -> BinaryMetrics {
    let (mut tp, mut fp, mut tn, mut fneg) = (0usize, 0usize, 0usize, 0usize);
    for (&y, &p) in y_true.iter().zip(proba.iter()) {
        match (y >= 0.5, p >= 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fneg += 1,
        }
    }
    let n = y_true.len();
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    BinaryMetrics {
        accuracy: ratio(tp + tn, n),
        recall: ratio(tp, tp + fneg),
        f1: ratio(2 * tp, 2 * tp + fp + fneg),
        roc_auc: roc_auc(y_true, proba),
        pr_auc: average_precision(y_true, proba),
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties sharing the
/// average rank.
pub fn roc_auc(y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; the tie group i..=j shares their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &r in &order[i..=j] {
            if y_true[r] >= 0.5 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }
    let n_pos = n_pos as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Average precision: `sum_k (R_k - R_{k-1}) * P_k` over distinct score
/// thresholds, highest first.
pub fn average_precision(y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    if n_pos == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut tp, mut seen) = (0usize, 0usize);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] >= 0.5 {
                tp += 1;
            }
            seen += 1;
            i += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Some(ap)
}

/// Mean of each metric over folds; AUC means skip unavailable folds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub folds: usize,
    pub accuracy: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: Option<f64>,
    pub pr_auc: Option<f64>,
}

pub fn summarize<'a>(metrics: impl IntoIterator<Item = &'a BinaryMetrics>) -> Option<MetricSummary> {
    let all: Vec<&BinaryMetrics> = metrics.into_iter().collect();
    if all.is_empty() {
        return None;
    }
    let n = all.len() as f64;
    let mean_opt = |f: fn(&BinaryMetrics) -> Option<f64>| {
        let vals: Vec<f64> = all.iter().filter_map(|m| f(m)).collect();
        (!vals.is_empty()).then(|| vals.iter().sum::<f64>() / vals.len() as f64)
    };
    Some(MetricSummary {
        folds: all.len(),
        accuracy: all.iter().map(|m| m.accuracy).sum::<f64>() / n,
        recall: all.iter().map(|m| m.recall).sum::<f64>() / n,
        f1: all.iter().map(|m| m.f1).sum::<f64>() / n,
        roc_auc: mean_opt(|m| m.roc_auc),
        pr_auc: mean_opt(|m| m.pr_auc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn perfect_ranking() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.1, 0.2, 0.8, 0.9];
        let m = binary_metrics(y.view(), p.view());
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.roc_auc, Some(1.0));
        assert_eq!(m.pr_auc, Some(1.0));
    }

    #[test]
    fn known_values_with_ties() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.1, 0.4, 0.35, 0.8];
        // classic example: AUC 0.75, AP 0.8333
        assert!((roc_auc(y.view(), p.view()).unwrap() - 0.75).abs() < 1e-12);
        assert!((average_precision(y.view(), p.view()).unwrap() - 5.0 / 6.0).abs() < 1e-12);

        let flat = array![0.5, 0.5, 0.5, 0.5];
        assert!((roc_auc(y.view(), flat.view()).unwrap() - 0.5).abs() < 1e-12);
        assert!((average_precision(y.view(), flat.view()).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn no_positives_means_not_available() {
        let y = array![0.0, 0.0, 0.0];
        let p = array![0.2, 0.7, 0.1];
        let m = binary_metrics(y.view(), p.view());
        assert_eq!(m.roc_auc, None);
        assert_eq!(m.pr_auc, None);
        assert_eq!(m.recall, 0.0);
        assert!((m.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn summary_skips_missing_auc() {
        let a = BinaryMetrics {
            accuracy: 1.0,
            recall: 1.0,
            f1: 1.0,
            roc_auc: Some(0.9),
            pr_auc: Some(0.6),
        };
        let b = BinaryMetrics {
            accuracy: 0.5,
            recall: 0.0,
            f1: 0.0,
            roc_auc: None,
            pr_auc: None,
        };
        let s = summarize([&a, &b]).unwrap();
        assert_eq!(s.folds, 2);
        assert!((s.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(s.pr_auc, Some(0.6));
        assert!(summarize(std::iter::empty()).is_none());
    }
}
