//! Flattened parameter vectors.
//!
//! A [`ParamVector`] is the unit of aggregation: every learner exposes its trainable parameters as
//! one dense, order-stable vector so that aggregation never depends on the model architecture.

use std::{
    iter::{FromIterator, IntoIterator},
    slice::{Iter, IterMut},
};

use derive_more::{From, Index, IndexMut, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, From, Index, IndexMut, Into, Serialize, Deserialize)]
/// A flattened representation of the trainable parameters of a model.
pub struct ParamVector(Vec<f32>);

impl AsRef<[f32]> for ParamVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

impl ParamVector {
    /// Creates a parameter vector of `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.; len])
    }

    /// Gets the number of parameters, i.e. the model dimension.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether the vector holds no parameters at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates an iterator that yields references to the parameters.
    pub fn iter(&self) -> Iter<f32> {
        self.0.iter()
    }

    /// Creates an iterator that yields mutable references to the parameters.
    pub fn iter_mut(&mut self) -> IterMut<f32> {
        self.0.iter_mut()
    }

    /// Gets the parameters as a slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Checks that this vector has the expected model dimension.
    ///
    /// # Errors
    /// Fails if the length differs from `expected`.
    pub fn check_dim(&self, expected: usize) -> Result<(), DimensionError> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(DimensionError {
                expected,
                actual: self.len(),
            })
        }
    }
}

impl FromIterator<f32> for ParamVector {
    fn from_iter<I: IntoIterator<Item = f32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ParamVector {
    type Item = f32;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParamVector {
    type Item = &'a f32;
    type IntoIter = Iter<'a, f32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("expected a parameter vector of length {expected}, got {actual}")]
/// A parameter vector doesn't match the model dimension.
pub struct DimensionError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone)]
/// A weighted sum of parameter vectors.
///
/// Vectors are accumulated in `f64` in the order in which they are added, so the result is
/// reproducible for identical inputs and an identical order of [`add()`] calls.
///
/// [`add()`]: WeightedSum::add
pub struct WeightedSum {
    acc: Vec<f64>,
    nb_vectors: usize,
}

#[allow(clippy::len_without_is_empty)]
impl WeightedSum {
    /// Creates an empty weighted sum for vectors of length `model_dim`.
    pub fn new(model_dim: usize) -> Self {
        Self {
            acc: vec![0.; model_dim],
            nb_vectors: 0,
        }
    }

    /// Gets the model dimension of the sum.
    pub fn len(&self) -> usize {
        self.acc.len()
    }

    /// Gets the number of vectors added so far.
    pub fn nb_vectors(&self) -> usize {
        self.nb_vectors
    }

    /// Adds `weight * params` to the sum.
    ///
    /// # Errors
    /// Fails if `params` doesn't match the model dimension of the sum. Nothing is accumulated in
    /// that case.
    pub fn add(&mut self, weight: f64, params: &ParamVector) -> Result<(), DimensionError> {
        params.check_dim(self.acc.len())?;
        for (acc, param) in self.acc.iter_mut().zip(params.iter()) {
            *acc += weight * f64::from(*param);
        }
        self.nb_vectors += 1;
        Ok(())
    }

    /// Scales the accumulated sum by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.acc.iter_mut().for_each(|acc| *acc *= factor);
    }

    /// Converts the sum into a parameter vector.
    pub fn into_params(self) -> ParamVector {
        self.acc.into_iter().map(|acc| acc as f32).collect()
    }
}
