//! Diagnostics on a labeled matrix: label leakage screen and per-class
//! event-type totals.

use crate::features::LabeledMatrix;
use crate::stats::pearson;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakageSuspect {
    pub feature: String,
    pub corr_with_label: f64,
}

/// Features whose |Pearson correlation| with the label exceeds `threshold`.
/// Reported only; nothing is removed.
pub fn leakage_suspects(labeled: &LabeledMatrix, threshold: f64) -> Vec<LeakageSuspect> {
    let y = labeled.labels();
    let m = labeled.matrix();
    let mut suspects: Vec<LeakageSuspect> = m
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(j, name)| {
            let c = pearson(m.values().column(j), y.view());
            (c.abs() > threshold).then(|| LeakageSuspect {
                feature: name.clone(),
                corr_with_label: c,
            })
        })
        .collect();
    suspects.sort_by(|a, b| b.corr_with_label.abs().total_cmp(&a.corr_with_label.abs()));
    for s in &suspects {
        warn!(feature = %s.feature, corr = s.corr_with_label, "possible label leakage");
    }
    if suspects.is_empty() {
        info!(threshold, "no feature suspiciously correlated with the label");
    }
    suspects
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassTotals {
    pub feature: String,
    pub normal_total: f64,
    pub anomalous_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRepartition {
    pub normal_units: usize,
    pub anomalous_units: usize,
    pub anomaly_ratio: f64,
    /// Top features by total count over anomalous units
    pub top_anomalous: Vec<ClassTotals>,
}

pub fn class_repartition(labeled: &LabeledMatrix, top_k: usize) -> ClassRepartition {
    let (normal_units, anomalous_units) = labeled.class_counts();
    let y = labeled.labels();
    let m = labeled.matrix();
    let mut totals: Vec<ClassTotals> = m
        .columns()
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let (mut normal_total, mut anomalous_total) = (0.0, 0.0);
            for (v, label) in m.values().column(j).iter().zip(y.iter()) {
                if *label >= 0.5 {
                    anomalous_total += v;
                } else {
                    normal_total += v;
                }
            }
            ClassTotals {
                feature: name.clone(),
                normal_total,
                anomalous_total,
            }
        })
        .collect();
    totals.sort_by(|a, b| b.anomalous_total.total_cmp(&a.anomalous_total));
    totals.truncate(top_k);

    let anomaly_ratio = anomalous_units as f64 / labeled.n_rows() as f64;
    info!(
        normal_units,
        anomalous_units, anomaly_ratio, "class repartition"
    );
    ClassRepartition {
        normal_units,
        anomalous_units,
        anomaly_ratio,
        top_anomalous: totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ColumnOrder, FeatureMatrix, FeatureRow, Label, UnitId, UnitKind};

    fn data() -> LabeledMatrix {
        let cases: [(u64, u64, Label); 4] = [
            (5, 1, Label::Anomaly),
            (0, 2, Label::Normal),
            (4, 2, Label::Anomaly),
            (0, 1, Label::Normal),
        ];
        let rows = cases
            .iter()
            .enumerate()
            .map(|(i, (leak, other, _))| FeatureRow {
                unit: UnitId::Session(format!("blk_{i}")),
                counts: [("E_leak".to_string(), *leak), ("E_other".to_string(), *other)]
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
            .zip(cases.iter())
            .map(|(r, (_, _, l))| {
                let mut r = r.clone();
                r.label = Some(*l);
                r
            })
            .collect();
        LabeledMatrix::new(m.with_row_meta(meta).unwrap()).unwrap()
    }

    #[test]
    fn flags_feature_tracking_the_label() {
        let suspects = leakage_suspects(&data(), 0.8);
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].feature, "E_leak");
        assert!(suspects[0].corr_with_label > 0.8);
    }

    #[test]
    fn totals_per_class() {
        let rep = class_repartition(&data(), 1);
        assert_eq!((rep.normal_units, rep.anomalous_units), (2, 2));
        assert_eq!(rep.anomaly_ratio, 0.5);
        assert_eq!(rep.top_anomalous.len(), 1);
        assert_eq!(rep.top_anomalous[0].feature, "E_leak");
        assert_eq!(rep.top_anomalous[0].anomalous_total, 9.0);
        assert_eq!(rep.top_anomalous[0].normal_total, 0.0);
    }
}
