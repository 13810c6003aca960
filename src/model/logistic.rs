//! L2-regularised logistic regression fitted by batch gradient descent.

use super::{check_fit_input, sample_weights, ClassWeight, Classifier};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// Inverse regularisation strength
    pub c: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.5,
            max_iter: 1000,
            tolerance: 1e-7,
        }
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    mean: Array1<f64>,
    scale: Array1<f64>,
    coef: Array1<f64>,
    intercept: f64,
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: LogisticConfig,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coef)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for LogisticRegression {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weight: ClassWeight,
    ) -> Result<()> {
        check_fit_input(x, y)?;
        let p = x.ncols();
        // standardise with statistics of the rows being fitted
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        let z = (&x - &mean) / &scale;

        let w = sample_weights(y, weight);
        let total_w = w.sum();
        let alpha = 1.0 / (self.config.c * total_w);

        let mut coef = Array1::<f64>::zeros(p);
        let mut intercept = 0.0;
        let mut prev_loss = f64::INFINITY;
        for iter in 0..self.config.max_iter {
            let proba = (z.dot(&coef) + intercept).mapv(sigmoid);
            let err = (&proba - &y) * &w;
            let grad = z.t().dot(&err) / total_w + &coef * alpha;
            let grad_b = err.sum() / total_w;
            coef = coef - grad * self.config.learning_rate;
            intercept -= self.config.learning_rate * grad_b;

            let loss = proba
                .iter()
                .zip(y.iter())
                .zip(w.iter())
                .map(|((&pr, &t), &wi)| {
                    let pr = pr.clamp(1e-15, 1.0 - 1e-15);
                    -wi * (t * pr.ln() + (1.0 - t) * (1.0 - pr).ln())
                })
                .sum::<f64>()
                / total_w;
            if (prev_loss - loss).abs() < self.config.tolerance {
                debug!(iter, loss, "logistic regression converged");
                break;
            }
            prev_loss = loss;
        }
        if !intercept.is_finite() || coef.iter().any(|c| !c.is_finite()) {
            return Err(PipelineError::Model(
                "logistic regression diverged".to_string(),
            ));
        }
        self.fitted = Some(Fitted {
            mean,
            scale,
            coef,
            intercept,
        });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let f = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::Model("logistic regression not fitted".to_string()))?;
        if x.ncols() != f.coef.len() {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                f.coef.len(),
                x.ncols()
            )));
        }
        let z = (&x - &f.mean) / &f.scale;
        Ok((z.dot(&f.coef) + f.intercept).mapv(sigmoid))
    }
}
