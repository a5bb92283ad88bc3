//! A linear regression learner trained by mini-batch gradient descent.

use crate::{
    client::{Device, Learner, LearnerError},
    model::ParamVector,
    simulation::data::{dot, Dataset},
};

/// A linear model with a mean squared error loss and a mean absolute error metric.
///
/// The parameters are flattened as `[w_0, ..., w_{d-1}, b]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLearner {
    weights: Vec<f32>,
    bias: f32,
    lr: f32,
    device: Device,
}

impl LinearLearner {
    /// Creates a learner with all parameters set to zero.
    pub fn new(input_dim: usize, lr: f32) -> Self {
        Self {
            weights: vec![0.; input_dim],
            bias: 0.,
            lr,
            device: Device::cpu(),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn predict(&self, x: &[f32]) -> f32 {
        dot(&self.weights, x) + self.bias
    }

    /// Performs one gradient descent step of the mean squared error on the given samples.
    pub fn fit_batch(&mut self, data: &Dataset, batch: &[usize]) {
        if batch.is_empty() {
            return;
        }

        let mut grad_w = vec![0.; self.weights.len()];
        let mut grad_b = 0.;
        for &idx in batch {
            let (x, y) = data.sample(idx);
            let residual = self.predict(x) - y;
            for (g, xi) in grad_w.iter_mut().zip(x) {
                *g += residual * xi;
            }
            grad_b += residual;
        }

        // d/dθ of mean((pred - y)^2) is 2 * mean(residual * dpred/dθ)
        let scale = 2. * self.lr / batch.len() as f32;
        for (w, g) in self.weights.iter_mut().zip(grad_w) {
            *w -= scale * g;
        }
        self.bias -= scale * grad_b;
    }

    /// Computes the mean squared error and the mean absolute error on `data`.
    ///
    /// Both are zero for an empty dataset.
    pub fn evaluate(&self, data: &Dataset) -> (f64, f64) {
        if data.is_empty() {
            return (0., 0.);
        }
        let (mut loss, mut metric) = (0_f64, 0_f64);
        for idx in 0..data.len() {
            let (x, y) = data.sample(idx);
            let residual = f64::from(self.predict(x) - y);
            loss += residual * residual;
            metric += residual.abs();
        }
        let n = data.len() as f64;
        (loss / n, metric / n)
    }
}

impl Learner for LinearLearner {
    fn model_dim(&self) -> usize {
        self.weights.len() + 1
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn get_param_tensor(&self) -> Result<Option<ParamVector>, LearnerError> {
        Ok(Some(
            self.weights
                .iter()
                .copied()
                .chain(std::iter::once(self.bias))
                .collect(),
        ))
    }

    fn set_param_tensor(&mut self, params: &ParamVector) -> Result<(), LearnerError> {
        params
            .check_dim(self.model_dim())
            .map_err(|err| LearnerError::InvalidParams(err.to_string()))?;
        let (weights, bias) = params.as_slice().split_at(self.weights.len());
        self.weights.copy_from_slice(weights);
        self.bias = bias[0];
        Ok(())
    }
}
