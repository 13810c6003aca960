//! Binary classifiers behind one capability: fit, predict_proba, predict.
//!
//! Every fold and every refit asks a [`ModelFactory`] for a fresh model, so no
//! state leaks between folds.

mod forest;
mod logistic;

pub use forest::{ForestConfig, RandomForest};
pub use logistic::{LogisticConfig, LogisticRegression};

use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Class reweighting applied during `fit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassWeight {
    Uniform,
    /// Inverse class frequency, `n / (2 * n_c)`, from the fitted rows only
    Balanced,
}

pub trait Classifier: Send + Sync {
    /// Fit on labels in {0.0, 1.0}.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, weight: ClassWeight)
        -> Result<()>;

    /// Probability of the anomalous class per row.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

/// Builds unfitted classifiers.
pub trait ModelFactory: Sync {
    fn name(&self) -> &str;
    fn build(&self) -> Box<dyn Classifier>;
}

/// Per-row weights for the requested reweighting.
pub fn sample_weights(y: ArrayView1<'_, f64>, weight: ClassWeight) -> Array1<f64> {
    match weight {
        ClassWeight::Uniform => Array1::ones(y.len()),
        ClassWeight::Balanced => balanced_sample_weights(y),
    }
}

/// `n / (2 * n_c)` for the class of each row.
pub fn balanced_sample_weights(y: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = y.len() as f64;
    let n_pos = y.iter().filter(|&&v| v >= 0.5).count() as f64;
    let n_neg = n - n_pos;
    y.mapv(|v| {
        let n_c = if v >= 0.5 { n_pos } else { n_neg };
        n / (2.0 * n_c)
    })
}

pub(crate) fn check_fit_input(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::Model(format!(
            "{} rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(PipelineError::EmptyInput("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Configured model family; also the factory for fresh instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression(LogisticConfig),
    RandomForest(ForestConfig),
}

impl ModelFactory for ModelKind {
    fn name(&self) -> &str {
        match self {
            ModelKind::LogisticRegression(_) => "logistic_regression",
            ModelKind::RandomForest(_) => "random_forest",
        }
    }

    fn build(&self) -> Box<dyn Classifier> {
        match self {
            ModelKind::LogisticRegression(c) => Box::new(LogisticRegression::new(c.clone())),
            ModelKind::RandomForest(c) => Box::new(RandomForest::new(c.clone())),
        }
    }
}
