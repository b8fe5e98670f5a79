//! CART decision tree used as the forest's base learner

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::params::{Criterion, ForestParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    /// Class distribution of the training rows reaching this leaf
    Leaf { value: Vec<f64> },
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted tree stored as a flat node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit on the rows at `indices` (repeats allowed); `y` holds class indices
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        indices: Vec<usize>,
        params: &ForestParams,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = TreeBuilder {
            x,
            y,
            n_classes,
            params,
            max_features,
            rng,
            nodes: Vec::new(),
        };
        builder.build(indices, 0);

        Self {
            nodes: builder.nodes,
        }
    }

    /// Class distribution for one row
    pub fn predict_row(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }

        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    params: &'a ForestParams,
    max_features: usize,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&indices);
        let at_depth_limit = self.params.max_depth.is_some_and(|max| depth >= max);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if at_depth_limit || is_pure || indices.len() < self.params.min_samples_split {
            return self.leaf(&counts, indices.len());
        }

        let Some(best) = self.best_split(&indices) else {
            return self.leaf(&counts, indices.len());
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });

        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);

        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn leaf(&mut self, counts: &[usize], total: usize) -> usize {
        let total = total.max(1) as f64;
        self.nodes.push(Node::Leaf {
            value: counts.iter().map(|&c| c as f64 / total).collect(),
        });
        self.nodes.len() - 1
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<BestSplit> {
        let n_features = self.x.first().map(Vec::len).unwrap_or(0);
        let candidates = rand::seq::index::sample(&mut *self.rng, n_features, self.max_features);
        let min_leaf = self.params.min_samples_leaf;
        let n = indices.len();

        let mut best: Option<BestSplit> = None;

        for feature in candidates.into_iter() {
            let mut column: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = vec![0usize; self.n_classes];
            for &(_, class) in &column {
                right[class] += 1;
            }

            for k in 0..n - 1 {
                let (value, class) = column[k];
                left[class] += 1;
                right[class] -= 1;

                let next = column[k + 1].0;
                let n_left = k + 1;
                let n_right = n - n_left;

                if value >= next || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let impurity = (n_left as f64 * self.impurity(&left, n_left)
                    + n_right as f64 * self.impurity(&right, n_right))
                    / n as f64;

                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }

                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }

    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        let total = total as f64;
        match self.params.criterion {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / total;
                        p * p
                    })
                    .sum::<f64>()
            }
            Criterion::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / total;
                    -p * p.log2()
                })
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(max_depth: Option<usize>) -> ForestParams {
        ForestParams {
            max_depth,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_separable_data_is_learned() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, 2, (0..20).collect(), &params(None), 1, &mut rng);

        assert_eq!(tree.predict_row(&[2.0]), &[1.0, 0.0]);
        assert_eq!(tree.predict_row(&[15.0]), &[0.0, 1.0]);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_depth_limit_yields_mixed_leaf() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![(i % 4) as f64]).collect();
        let y: Vec<usize> = (0..8).map(|i| i % 2).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, 2, (0..8).collect(), &params(Some(0)), 1, &mut rng);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict_row(&[1.0]), &[0.5, 0.5]);
    }

    #[test]
    fn test_constant_feature_yields_leaf() {
        let x: Vec<Vec<f64>> = (0..6).map(|_| vec![1.0]).collect();
        let y = vec![0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, 2, (0..6).collect(), &params(None), 1, &mut rng);
        assert_eq!(tree.node_count(), 1);
    }
}
