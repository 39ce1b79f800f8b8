//! CART regression trees shared by the tree-ensemble models, plus the
//! plumbing that turns a daily series into their training matrix

use crate::error::{ForecastError, Result};
use crate::features::{FeatureEngineer, MAX_LOOKBACK};
use crate::series::DailySeries;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Growth limits of a regression tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features drawn at each split; all features when `None`
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A regression tree minimising squared error
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows of `x` selected by `indices`
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if indices.is_empty() || x.len() != y.len() {
            return Err(ForecastError::DataError(format!(
                "Cannot grow a tree on {} samples ({} rows, {} targets)",
                indices.len(),
                x.len(),
                y.len()
            )));
        }

        let mut indices = indices.to_vec();
        let root = grow(x, y, &mut indices, params, 0, rng);
        Ok(Self { root })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Depth of the deepest leaf; a single leaf has depth 0
    pub fn depth(&self) -> usize {
        fn depth_of(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

/// Training matrix plus the recent history needed to build future inputs
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub history: FeatureHistory,
}

impl FeatureFrame {
    /// Engineer the training matrix of a window
    pub fn from_window(window: &DailySeries) -> Result<Self> {
        let engineer = FeatureEngineer::new();
        let rows = engineer.transform(window)?;
        let last_date = window
            .last_date()
            .ok_or_else(|| ForecastError::DataError("Empty training window".to_string()))?;

        let values = window.values();
        // Lags reach two weeks back, and same-weekday fallbacks one more week
        let keep = (MAX_LOOKBACK + 7).min(values.len());

        Ok(Self {
            inputs: rows.iter().map(|r| r.inputs()).collect(),
            targets: rows.iter().map(|r| r.target).collect(),
            history: FeatureHistory {
                engineer,
                tail: values[values.len() - keep..].to_vec(),
                last_date,
            },
        })
    }
}

/// Tail of a training window, used to estimate inputs for future dates
#[derive(Debug, Clone)]
pub struct FeatureHistory {
    engineer: FeatureEngineer,
    tail: Vec<f64>,
    last_date: NaiveDate,
}

impl FeatureHistory {
    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    pub fn inputs_for(&self, dates: &[NaiveDate]) -> Result<Vec<Vec<f64>>> {
        self.engineer.future_inputs(&self.tail, self.last_date, dates)
    }
}

fn mean_of(y: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn grow(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &mut [usize],
    params: &TreeParams,
    depth: usize,
    rng: &mut StdRng,
) -> Node {
    let leaf = Node::Leaf(mean_of(y, indices));
    if depth >= params.max_depth || indices.len() < params.min_samples_split {
        return leaf;
    }

    let Some(best) = best_split(x, y, indices, params, rng) else {
        return leaf;
    };

    let (mut left, mut right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[i][best.feature] <= best.threshold);

    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(grow(x, y, &mut left, params, depth + 1, rng)),
        right: Box::new(grow(x, y, &mut right, params, depth + 1, rng)),
    }
}

fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &mut [usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let n_features = x[indices[0]].len();
    let features: Vec<usize> = match params.max_features {
        Some(k) if k < n_features => sample(rng, n_features, k.max(1)).into_vec(),
        _ => (0..n_features).collect(),
    };

    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<SplitCandidate> = None;
    for feature in features {
        indices.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for pos in 0..n - 1 {
            let yi = y[indices[pos]];
            left_sum += yi;
            left_sq += yi * yi;

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let here = x[indices[pos]][feature];
            let next = x[indices[pos + 1]][feature];
            if next <= here {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);

            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    sse,
                });
            }
        }
    }

    best.filter(|b| parent_sse - b.sse > 1e-9 * parent_sse.abs().max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_step_function_is_learned() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 5.0 } else { 50.0 }).collect();
        let indices: Vec<usize> = (0..20).collect();
        let mut rng = StdRng::seed_from_u64(42);

        let tree = RegressionTree::fit(&x, &y, &indices, &TreeParams::default(), &mut rng).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[3.0, 0.0]), 5.0);
        assert_eq!(tree.predict(&[15.0, 1.0]), 50.0);
        assert_eq!(tree.predict(&[9.5, 1.0]), 5.0);
    }

    #[test]
    fn test_depth_limit_and_constant_target() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let indices: Vec<usize> = (0..30).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let params = TreeParams {
            max_depth: 2,
            ..TreeParams::default()
        };
        let tree = RegressionTree::fit(&x, &y, &indices, &params, &mut rng).unwrap();
        assert_eq!(tree.depth(), 2);

        let flat = vec![7.0; 30];
        let tree = RegressionTree::fit(&x, &flat, &indices, &params, &mut rng).unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&[100.0]), 7.0);
    }

    #[test]
    fn test_empty_sample_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(RegressionTree::fit(&[], &[], &[], &TreeParams::default(), &mut rng).is_err());
    }
}
