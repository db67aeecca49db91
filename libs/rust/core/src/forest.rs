//! Seeded random-partition forest (isolation-style outlier model).
//!
//! Each tree recursively splits a random subsample on a random dimension at a
//! uniform random value until points are isolated or the depth limit
//! `ceil(log2(psi))` is hit. Points that isolate early (short average path)
//! are anomalous: `s(x) = 2^(-E[h(x)] / c(psi))`, in (0, 1].
//!
//! Fitting returns the trained forest as a value; there is no model state
//! held anywhere else.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::Abstention;
use crate::stats::SPREAD_EPSILON;

pub type FeatureVector = Vec<f64>;

/// An estimator that can be trained on a feature matrix.
pub trait OutlierModel: Send + Sync {
    type Fitted: FittedModel;
    fn name(&self) -> &'static str;
    fn fit(&self, features: &[FeatureVector]) -> Result<Self::Fitted, Abstention>;
}

/// Trained state of an `OutlierModel`.
pub trait FittedModel: Send + Sync {
    /// One score per row, higher = more anomalous.
    fn score(&self, features: &[FeatureVector]) -> Vec<f64>;
}

#[derive(Debug, Clone)]
pub struct RandomPartitionForest {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl RandomPartitionForest {
    pub fn new(n_estimators: usize, max_samples: usize, seed: u64) -> Self { Self { n_estimators, max_samples, seed } }
}

#[derive(Debug, Clone)]
pub struct FittedForest {
    trees: Vec<Node>,
    sample_size: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split { dim: usize, value: f64, left: Box<Node>, right: Box<Node> },
}

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl OutlierModel for RandomPartitionForest {
    type Fitted = FittedForest;

    fn name(&self) -> &'static str { "random_partition_forest" }

    fn fit(&self, features: &[FeatureVector]) -> Result<FittedForest, Abstention> {
        if features.len() < 2 { return Err(Abstention::InsufficientData { required: 2, actual: features.len() }); }
        let sample_size = self.max_samples.min(features.len());
        let depth_limit = (sample_size as f64).log2().ceil() as usize;
        // Per-tree seeds keep the result independent of rayon's scheduling.
        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed ^ (t as u64 + 1).wrapping_mul(SEED_MIX));
                let sample = rand::seq::index::sample(&mut rng, features.len(), sample_size).into_vec();
                build(features, sample, 0, depth_limit, &mut rng)
            })
            .collect();
        Ok(FittedForest { trees, sample_size })
    }
}

fn build(data: &[FeatureVector], idx: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || idx.len() <= 1 { return Node::Leaf { size: idx.len() }; }
    let dims = data[idx[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|d| {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| (lo.min(data[i][d]), hi.max(data[i][d])));
            (hi - lo > SPREAD_EPSILON).then_some((d, lo, hi))
        })
        .collect();
    if candidates.is_empty() { return Node::Leaf { size: idx.len() }; }
    let (dim, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let value = rng.gen_range(lo..hi);
    // `<=` keeps both sides non-empty since lo <= value < hi.
    let (left, right): (Vec<usize>, Vec<usize>) = idx.into_iter().partition(|&i| data[i][dim] <= value);
    Node::Split {
        dim,
        value,
        left: Box::new(build(data, left, depth + 1, limit, rng)),
        right: Box::new(build(data, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, x: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split { dim, value, left, right } => {
            let next = if x.get(*dim).copied().unwrap_or(0.0) <= *value { left } else { right };
            path_length(next, x, depth + 1)
        }
    }
}

impl FittedForest {
    pub fn tree_count(&self) -> usize { self.trees.len() }

    pub fn mean_path_length(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() { return 0.0; }
        self.trees.iter().map(|t| path_length(t, x, 0)).sum::<f64>() / self.trees.len() as f64
    }
}

impl FittedModel for FittedForest {
    fn score(&self, features: &[FeatureVector]) -> Vec<f64> {
        let c = average_path_length(self.sample_size);
        features
            .par_iter()
            .map(|x| if c > 0.0 { 2f64.powf(-self.mean_path_length(x) / c) } else { 0.5 })
            .collect()
    }
}
