//! Multicollinearity reduction: correlation pruning then recursive VIF pruning.
//!
//! Only feature columns are touched. Unit identity, timestamps and labels
//! live in the row metadata and pass through unchanged; surviving columns
//! keep their original relative order.

pub mod correlation;
pub mod vif;

pub use correlation::{prune_correlated, CorrelationDrop, CorrelationReport, DropReason};
pub use vif::{prune_vif, vif_scores, VifDrop, VifReport};

use crate::config::ReductionConfig;
use crate::error::{PipelineError, Result};
use crate::features::FeatureMatrix;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReductionReport {
    pub correlation: Option<CorrelationReport>,
    pub vif: Option<VifReport>,
    pub kept: Vec<String>,
}

impl ReductionReport {
    /// Every removal as `(stage, feature, detail)` in the order it happened.
    pub fn removals(&self) -> Vec<(&'static str, String, String)> {
        let mut out = Vec::new();
        if let Some(c) = &self.correlation {
            for d in &c.dropped {
                out.push((
                    "correlation",
                    d.feature.clone(),
                    format!("|corr|={:.4} with {} ({:?})", d.abs_corr, d.partner, d.reason),
                ));
            }
        }
        if let Some(v) = &self.vif {
            for d in &v.dropped {
                out.push(("vif", d.feature.clone(), format!("vif={}", d.vif)));
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Reduction {
    pub matrix: FeatureMatrix,
    pub report: ReductionReport,
}

/// Run the enabled stages. VIF is skipped for dataset classes listed in
/// `config.skip_vif_for`.
pub fn reduce(
    matrix: &FeatureMatrix,
    config: &ReductionConfig,
    dataset: &str,
    importances: Option<&HashMap<String, f64>>,
) -> Result<Reduction> {
    let mut current = matrix.clone();
    let mut report = ReductionReport::default();

    if config.correlation_enabled {
        let corr = prune_correlated(
            current.columns(),
            current.values().view(),
            config.corr_threshold,
            importances,
        );
        current = drop_columns(&current, corr.dropped.iter().map(|d| d.feature.as_str()));
        report.correlation = Some(corr);
    }

    if config.vif_applies_to(dataset) {
        let vif = prune_vif(
            current.columns(),
            current.values().view(),
            config.vif_threshold,
        );
        current = drop_columns(&current, vif.dropped.iter().map(|d| d.feature.as_str()));
        report.vif = Some(vif);
    } else if config.vif_enabled {
        info!(dataset, "VIF stage skipped for dataset");
    }

    if current.n_features() == 0 {
        return Err(PipelineError::EmptyInput(
            "no feature column left after reduction".to_string(),
        ));
    }
    report.kept = current.columns().to_vec();
    info!(
        before = matrix.n_features(),
        after = current.n_features(),
        "feature reduction done"
    );
    Ok(Reduction {
        matrix: current,
        report,
    })
}

fn drop_columns<'a>(matrix: &FeatureMatrix, dropped: impl Iterator<Item = &'a str>) -> FeatureMatrix {
    let dropped: HashSet<&str> = dropped.collect();
    let keep: HashSet<String> = matrix
        .columns()
        .iter()
        .filter(|c| !dropped.contains(c.as_str()))
        .cloned()
        .collect();
    matrix.retain_columns(&keep)
}
