//! Random forest of weighted-Gini CART trees.

use super::{check_fit_input, sample_weights, ClassWeight, Classifier};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree (unbounded if None)
    pub max_depth: Option<usize>,
    /// Minimum rows to split a node
    pub min_samples_split: usize,
    /// Minimum rows in each child
    pub min_samples_leaf: usize,
    /// Features tried per split (sqrt of total if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling per tree
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        proba: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[feature] <= threshold { left } else { right },
            }
        }
    }
}

/// Weighted Gini impurity `2p(1-p)` of a node with positive mass `pos` out of `total`.
fn gini(pos: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = pos / total;
    2.0 * p * (1.0 - p)
}

struct TreeBuilder<'d, 'y, 'w> {
    x: ArrayView2<'d, f64>,
    y: ArrayView1<'y, f64>,
    w: &'w [f64],
    config: &'w ForestConfig,
    max_features: usize,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
}

impl<'d, 'y, 'w> TreeBuilder<'d, 'y, 'w> {
    fn masses(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(pos, tot), &r| {
            (pos + self.w[r] * self.y[r], tot + self.w[r])
        })
    }

    fn leaf_proba(pos: f64, total: f64) -> f64 {
        if total > 0.0 {
            pos / total
        } else {
            0.0
        }
    }

    fn placeholder(&mut self) -> usize {
        self.nodes.push(Node::Leaf { proba: 0.0 });
        self.nodes.len() - 1
    }

    /// Best `(feature, threshold, weighted child impurity)` over a random
    /// feature subset, by sorting each feature once and sweeping.
    fn best_split(&mut self, rows: &[usize]) -> Option<(usize, f64, f64)> {
        let p = self.x.ncols();
        let features = sample(&mut self.rng, p, self.max_features.min(p));
        let (pos_total, w_total) = self.masses(rows);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();

        for f in features.iter() {
            sorted.sort_by(|&a, &b| self.x[[a, f]].total_cmp(&self.x[[b, f]]));
            let (mut pos_left, mut w_left) = (0.0, 0.0);
            for k in 0..sorted.len().saturating_sub(1) {
                let r = sorted[k];
                pos_left += self.w[r] * self.y[r];
                w_left += self.w[r];
                let (v, next) = (self.x[[r, f]], self.x[[sorted[k + 1], f]]);
                if v == next || k + 1 < min_leaf || sorted.len() - k - 1 < min_leaf {
                    continue;
                }
                let w_right = w_total - w_left;
                let score = w_left * gini(pos_left, w_left)
                    + w_right * gini(pos_total - pos_left, w_right);
                if best.map_or(true, |(_, _, s)| score < s) {
                    best = Some((f, (v + next) / 2.0, score));
                }
            }
        }
        best
    }

    /// Split worth taking at this node, if any.
    fn choose_split(
        &mut self,
        rows: &[usize],
        depth: usize,
        pos: f64,
        total: f64,
    ) -> Option<(usize, f64)> {
        let impurity = gini(pos, total);
        let depth_reached = self.config.max_depth.map_or(false, |d| depth >= d);
        if depth_reached || rows.len() < self.config.min_samples_split.max(2) || impurity <= 1e-12
        {
            return None;
        }
        let (feature, threshold, score) = self.best_split(rows)?;
        if score >= total * impurity - 1e-12 {
            return None;
        }
        Some((feature, threshold))
    }

    /// Grow the tree rooted at node 0 depth-first from an explicit work
    /// stack, so depth is bounded by the data and not by the thread stack.
    fn grow(&mut self, rows: Vec<usize>) {
        let root = self.placeholder();
        let mut pending = vec![(root, rows, 0usize)];
        while let Some((id, rows, depth)) = pending.pop() {
            let (pos, total) = self.masses(&rows);
            let Some((feature, threshold)) = self.choose_split(&rows, depth, pos, total) else {
                self.nodes[id] = Node::Leaf {
                    proba: Self::leaf_proba(pos, total),
                };
                continue;
            };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&r| self.x[[r, feature]] <= threshold);
            let left = self.placeholder();
            let right = self.placeholder();
            self.nodes[id] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }
    }
}

/// Random forest model
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weight: ClassWeight,
    ) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_trees == 0 {
            return Err(PipelineError::Model("random forest needs at least one tree".into()));
        }
        let n = x.nrows();
        let p = x.ncols();
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (p as f64).sqrt().ceil() as usize)
            .clamp(1, p.max(1));
        let class_w = sample_weights(y, weight);
        let config = &self.config;

        // Build trees in parallel, each with its own seeded stream
        let trees: Vec<Tree> = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let mut w = vec![0.0; n];
                if config.bootstrap {
                    for _ in 0..n {
                        let r = rng.gen_range(0..n);
                        w[r] += class_w[r];
                    }
                } else {
                    w.iter_mut().zip(class_w.iter()).for_each(|(a, b)| *a = *b);
                }
                let rows: Vec<usize> = (0..n).filter(|&r| w[r] > 0.0).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    w: &w,
                    config,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                };
                if p == 0 {
                    let (pos, total) = builder.masses(&rows);
                    builder.nodes.push(Node::Leaf {
                        proba: TreeBuilder::leaf_proba(pos, total),
                    });
                } else {
                    builder.grow(rows);
                }
                Tree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        debug!(
            trees = trees.len(),
            nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "random forest fitted"
        );
        self.trees = trees;
        self.n_features = p;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::Model("random forest not fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small() -> ForestConfig {
        ForestConfig {
            n_trees: 15,
            ..Default::default()
        }
    }

    #[test]
    fn learns_threshold_rule() {
        let x = Array2::from_shape_fn((80, 3), |(i, j)| ((i * (j + 3)) % 13) as f64);
        let y: Array1<f64> = x.column(0).mapv(|v| if v > 8.0 { 1.0 } else { 0.0 });
        let mut forest = RandomForest::new(small());
        forest.fit(x.view(), y.view(), ClassWeight::Balanced).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(a, b)| a == b).count();
        assert!(correct >= 76, "correct={correct}");
    }

    #[test]
    fn same_seed_same_probabilities() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * 7 + j) % 11) as f64);
        let y: Array1<f64> = (0..30).map(|i| (i % 3 == 0) as u8 as f64).collect();
        let mut a = RandomForest::new(small());
        let mut b = RandomForest::new(small());
        a.fit(x.view(), y.view(), ClassWeight::Uniform).unwrap();
        b.fit(x.view(), y.view(), ClassWeight::Uniform).unwrap();
        assert_eq!(
            a.predict_proba(x.view()).unwrap(),
            b.predict_proba(x.view()).unwrap()
        );
    }

    #[test]
    fn deep_unbounded_tree_fits_without_recursion() {
        let n = 10_000;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..n).map(|i| ((i / 2) % 2) as f64).collect();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..Default::default()
        });
        forest.fit(x.view(), y.view(), ClassWeight::Uniform).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        assert_eq!(pred, y);
    }

    #[test]
    fn single_class_fit_gives_constant_output() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i + j) as f64);
        let y = Array1::<f64>::zeros(10);
        let mut forest = RandomForest::new(small());
        forest.fit(x.view(), y.view(), ClassWeight::Balanced).unwrap();
        assert!(forest.predict_proba(x.view()).unwrap().iter().all(|&p| p == 0.0));
    }
}
