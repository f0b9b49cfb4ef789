//! CART regression tree on one-hot class targets.
//!
//! With one-hot targets the summed per-output squared error of a node holding `n` samples with
//! class counts `c_k` is `n − Σ c_k² / n`, so the best split is the one maximizing
//! `Σ c_k,left² / n_left + Σ c_k,right² / n_right`. Both sums are updated in O(1) per sample
//! while sweeping a sorted feature, which keeps a split search linear in the node size.
//!
//! Leaves store the class proportions of their samples, i.e. the mean one-hot target.
use super::N_FEATURES;
use crate::constants::EPS;

/// Growth limits of one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeLimits {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<f64>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

fn class_counts(classes: &[usize], samples: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &s in samples {
        counts[classes[s]] += 1;
    }
    counts
}

fn proportions(counts: &[usize], n: usize) -> Vec<f64> {
    counts.iter().map(|&c| c as f64 / n as f64).collect()
}

/// Best `(feature, threshold)` split of `samples`, `None` when every feature is constant.
fn best_split(
    features: &[[f64; N_FEATURES]],
    classes: &[usize],
    samples: &[usize],
    counts: &[usize],
) -> Option<(usize, f64)> {
    let n = samples.len();
    let total_sq: u64 = counts.iter().map(|&c| (c * c) as u64).sum();

    let mut best: Option<(f64, usize, f64)> = None;
    let mut order = samples.to_vec();

    for f in 0..N_FEATURES {
        order.sort_by(|&a, &b| features[a][f].total_cmp(&features[b][f]));

        let mut left = vec![0usize; counts.len()];
        let mut right = counts.to_vec();
        let mut left_sq: u64 = 0;
        let mut right_sq: u64 = total_sq;

        for i in 1..n {
            let c = classes[order[i - 1]];
            left_sq += (2 * left[c] + 1) as u64;
            left[c] += 1;
            right_sq -= (2 * right[c] - 1) as u64;
            right[c] -= 1;

            let (lo, hi) = (features[order[i - 1]][f], features[order[i]][f]);
            if !(lo < hi) {
                continue;
            }

            let gain = left_sq as f64 / i as f64 + right_sq as f64 / (n - i) as f64;
            if best.map_or(true, |(g, _, _)| gain > g + EPS) {
                let mut threshold = 0.5 * (lo + hi);
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((gain, f, threshold));
            }
        }
    }

    best.map(|(_, f, t)| (f, t))
}

impl RegressionTree {
    /// Grow a tree on the (possibly repeated) sample indices `samples`.
    ///
    /// Arguments
    /// -----------------
    /// * `features`: feature rows of the whole dataset.
    /// * `classes`: class index of every row, `< n_classes`.
    /// * `samples`: rows used for this tree (a bootstrap draw in a forest).
    pub fn fit(
        features: &[[f64; N_FEATURES]],
        classes: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        limits: TreeLimits,
    ) -> Self {
        let mut nodes = vec![Node::Leaf(Vec::new())];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((id, samples, depth)) = stack.pop() {
            let n = samples.len();
            let counts = class_counts(classes, &samples, n_classes);
            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let splittable = !pure
                && n >= limits.min_samples_split
                && limits.max_depth.map_or(true, |m| depth < m);

            let split = if splittable {
                best_split(features, classes, &samples, &counts)
            } else {
                None
            };

            let Some((feature, threshold)) = split else {
                nodes[id] = Node::Leaf(proportions(&counts, n.max(1)));
                continue;
            };

            let (lhs, rhs): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&s| features[s][feature] <= threshold);
            if lhs.is_empty() || rhs.is_empty() {
                nodes[id] = Node::Leaf(proportions(&counts, n.max(1)));
                continue;
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf(Vec::new()));
            nodes.push(Node::Leaf(Vec::new()));
            nodes[id] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            stack.push((left, lhs, depth + 1));
            stack.push((right, rhs, depth + 1));
        }

        RegressionTree { nodes }
    }

    /// Class proportions of the leaf reached by `x`.
    pub fn predict(&self, x: &[f64; N_FEATURES]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if x[*feature] <= *threshold {
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
}
