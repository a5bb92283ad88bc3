//! Synthetic regression data.

use rand::Rng;
use rand_chacha::ChaCha20Rng;

/// A linear model `y = w·x + b` which generates the targets of all clients.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl GroundTruth {
    /// Draws a ground truth with weights and bias in `[-1, 1)`.
    pub fn generate(input_dim: usize, rng: &mut ChaCha20Rng) -> Self {
        Self {
            weights: (0..input_dim).map(|_| rng.gen_range(-1.0..1.0)).collect(),
            bias: rng.gen_range(-1.0..1.0),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.len()
    }

    /// Evaluates the ground truth at `x`.
    pub fn eval(&self, x: &[f32]) -> f32 {
        dot(&self.weights, x) + self.bias
    }
}

/// Labeled samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub inputs: Vec<Vec<f32>>,
    pub targets: Vec<f32>,
}

impl Dataset {
    /// Draws `len` samples with inputs in `[-1, 1)` and targets perturbed by uniform noise of
    /// magnitude `noise`.
    pub fn generate(truth: &GroundTruth, len: usize, noise: f32, rng: &mut ChaCha20Rng) -> Self {
        let mut inputs = Vec::with_capacity(len);
        let mut targets = Vec::with_capacity(len);
        for _ in 0..len {
            let x: Vec<f32> = (0..truth.input_dim())
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect();
            let eps = if noise > 0. {
                rng.gen_range(-noise..noise)
            } else {
                0.
            };
            targets.push(truth.eval(&x) + eps);
            inputs.push(x);
        }
        Self { inputs, targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn sample(&self, idx: usize) -> (&[f32], f32) {
        (&self.inputs[idx], self.targets[idx])
    }
}

/// The private data of a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub train: Dataset,
    pub val: Dataset,
    pub test: Dataset,
}

impl Partition {
    /// Draws a partition with `n_train` training samples. The validation and test sets hold a
    /// quarter of that, but at least one sample each.
    pub fn generate(
        truth: &GroundTruth,
        n_train: usize,
        noise: f32,
        rng: &mut ChaCha20Rng,
    ) -> Self {
        let n_eval = (n_train / 4).max(1);
        Self {
            train: Dataset::generate(truth, n_train, noise, rng),
            val: Dataset::generate(truth, n_eval, noise, rng),
            test: Dataset::generate(truth, n_eval, noise, rng),
        }
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}
