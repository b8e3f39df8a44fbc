// Random forest of CART trees (Gini, bootstrap, balanced class weights)
//
// Each tree is grown to purity on a bootstrap sample, trying a random
// subset of sqrt(n_features) features per split. Trees are stored as flat
// node arenas so they serialize cleanly with the model.

use crate::error::ClassifierError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Features tried per split; `None` means sqrt(n_features).
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 100,
            max_features: None,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn leaf_for(&self, x: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

/// Weight per class: n / (classes_present * count). Absent classes get 0.
pub fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = y.len() as f64;

    counts
        .iter()
        .map(|&c| if c == 0 { 0.0 } else { n / (present * c as f64) })
        .collect()
}

fn gini(class_weight: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_weight.iter().map(|w| (w / total).powi(2)).sum::<f64>()
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    weights: Vec<f64>,
    n_classes: usize,
    mtry: usize,
    params: &'a ForestParams,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<'a> TreeBuilder<'a> {
    fn distribution(&self, samples: &[usize]) -> (Vec<f64>, f64) {
        let mut dist = vec![0.0; self.n_classes];
        for &s in samples {
            dist[self.y[s]] += self.weights[s];
        }
        let total = dist.iter().sum();
        (dist, total)
    }

    fn best_split_on(&self, samples: &[usize], feature: usize, total: f64) -> Option<BestSplit> {
        let mut order: Vec<usize> = samples.to_vec();
        order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

        let (right_init, _) = self.distribution(&order);
        let mut right = right_init;
        let mut left = vec![0.0; self.n_classes];
        let mut left_total = 0.0;

        let mut best: Option<BestSplit> = None;

        for pair in 0..order.len().saturating_sub(1) {
            let s = order[pair];
            let w = self.weights[s];
            left[self.y[s]] += w;
            right[self.y[s]] -= w;
            left_total += w;

            let current = self.x[s][feature];
            let next = self.x[order[pair + 1]][feature];
            if next <= current {
                continue;
            }

            let right_total = total - left_total;
            let impurity = left_total * gini(&left, left_total) + right_total * gini(&right, right_total);

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                // the midpoint of adjacent floats can round up to `next`
                let mid = current + (next - current) / 2.0;
                best = Some(BestSplit {
                    feature,
                    threshold: if mid < next { mid } else { current },
                    impurity,
                });
            }
        }

        best
    }

    fn find_split(&self, samples: &[usize], total: f64, rng: &mut StdRng) -> Option<BestSplit> {
        let n_features = self.x.first().map(Vec::len).unwrap_or(0);
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        for (tried, feature) in features.into_iter().enumerate() {
            // keep looking past mtry only while nothing usable was found
            if tried >= self.mtry && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(samples, feature, total) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn build(&self, samples: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut nodes = vec![Node::Leaf {
            distribution: Vec::new(),
        }];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((slot, samples, depth)) = stack.pop() {
            let (dist, total) = self.distribution(&samples);
            let pure = dist.iter().filter(|&&w| w > 0.0).count() <= 1;
            let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);

            let split = if pure || depth_reached || samples.len() < self.params.min_samples_split {
                None
            } else {
                self.find_split(&samples, total, rng)
            };

            match split {
                Some(split) => {
                    let (left, right): (Vec<usize>, Vec<usize>) = samples
                        .into_iter()
                        .partition(|&s| self.x[s][split.feature] <= split.threshold);

                    let left_slot = nodes.len();
                    let right_slot = left_slot + 1;
                    nodes.push(Node::Leaf { distribution: Vec::new() });
                    nodes.push(Node::Leaf { distribution: Vec::new() });
                    nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_slot,
                        right: right_slot,
                    };
                    stack.push((right_slot, right, depth + 1));
                    stack.push((left_slot, left, depth + 1));
                }
                None => {
                    let distribution = if total > 0.0 {
                        dist.iter().map(|w| w / total).collect()
                    } else {
                        vec![1.0 / self.n_classes as f64; self.n_classes]
                    };
                    nodes[slot] = Node::Leaf { distribution };
                }
            }
        }

        DecisionTree { nodes }
    }
}

impl RandomForest {
    /// Fit on dense rows `x` with class indices `y` in `0..n_classes`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self, ClassifierError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ClassifierError::InsufficientData {
                records: x.len().min(y.len()),
                distinct_labels: 0,
            });
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(ClassifierError::Prediction(format!(
                "class index {} out of range for {} classes",
                bad, n_classes
            )));
        }

        let n = x.len();
        let n_features = x[0].len();
        let mtry = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features.max(1));
        let class_weights = balanced_class_weights(y, n_classes);

        let mut master = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators.max(1) {
            let mut rng = StdRng::seed_from_u64(master.random::<u64>());

            let mut draws = vec![0usize; n];
            for _ in 0..n {
                draws[rng.random_range(0..n)] += 1;
            }

            let weights: Vec<f64> = draws
                .iter()
                .zip(y)
                .map(|(&d, &label)| d as f64 * class_weights[label])
                .collect();
            let samples: Vec<usize> = (0..n).filter(|&i| draws[i] > 0).collect();

            let builder = TreeBuilder {
                x,
                y,
                weights,
                n_classes,
                mtry,
                params,
            };
            trees.push(builder.build(samples, &mut rng));
        }

        Ok(RandomForest {
            n_classes,
            n_features,
            trees,
        })
    }

    /// Mean of the per-tree leaf distributions. Sums to 1.
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, leaf) in proba.iter_mut().zip(tree.leaf_for(x)) {
                *p += leaf;
            }
        }
        let count = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= count);
        proba
    }

    /// Class index with highest probability (lowest index on ties).
    pub fn predict(&self, x: &[f64]) -> usize {
        argmax(&self.predict_proba(x))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let v = i as f64 / 10.0;
            x.push(vec![v, 1.0]);
            y.push(if v < 1.0 {
                0
            } else if v < 2.0 {
                1
            } else {
                2
            });
        }
        (x, y)
    }

    #[test]
    fn test_balanced_weights() {
        let w = balanced_class_weights(&[0, 0, 0, 1], 3);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
        assert_eq!(w[2], 0.0);
    }

    #[test]
    fn test_learns_thresholds() {
        let (x, y) = toy();
        let params = ForestParams {
            n_estimators: 25,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, 3, &params).unwrap();

        assert_eq!(forest.n_trees(), 25);
        assert_eq!(forest.predict(&[0.2, 1.0]), 0);
        assert_eq!(forest.predict(&[1.5, 1.0]), 1);
        assert_eq!(forest.predict(&[2.8, 1.0]), 2);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = toy();
        let forest = RandomForest::fit(&x, &y, 4, &ForestParams::default()).unwrap();
        for row in &x {
            let p = forest.predict_proba(row);
            assert_eq!(p.len(), 4);
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert_eq!(p[3], 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = toy();
        let a = RandomForest::fit(&x, &y, 3, &ForestParams::default()).unwrap();
        let b = RandomForest::fit(&x, &y, 3, &ForestParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], 2, &ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[5], 2, &ForestParams::default()).is_err());
    }
}
