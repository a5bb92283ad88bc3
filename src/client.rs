//! The collaborators driven by the aggregator.
//!
//! The aggregator doesn't know how clients load data, which model they train or how they optimize
//! it. It only relies on the [`Client`] and [`Learner`] traits defined here.

use std::error::Error as StdError;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ParamVector;

/// A boxed error raised by a collaborator implementation.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
/// Errors raised by a [`Learner`].
pub enum LearnerError {
    #[error("invalid parameter vector: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Other(#[from] BoxError),
}

#[derive(Debug, Error)]
/// Errors raised by a [`Client`].
pub enum ClientError {
    #[error("local step failed: {0}")]
    Step(String),
    #[error("learner failure: {0}")]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Other(#[from] BoxError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
/// An opaque identifier of the execution target of a learner, e.g. `cpu`.
pub struct Device(String);

impl Device {
    pub fn cpu() -> Self {
        Self("cpu".into())
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

/// A model together with its optimizer, loss and metric.
pub trait Learner {
    /// The number of trainable parameters, i.e. the length of the flattened parameter vector.
    fn model_dim(&self) -> usize;

    /// The execution target of this learner.
    fn device(&self) -> &Device;

    /// Flattens the trainable parameters into a vector.
    ///
    /// The ordering of the parameters must be stable and identical for all learners which take
    /// part in the same simulation. `Ok(None)` signals that no parameters are available.
    fn get_param_tensor(&self) -> Result<Option<ParamVector>, LearnerError>;

    /// Overwrites the trainable parameters with the given flattened vector.
    fn set_param_tensor(&mut self, params: &ParamVector) -> Result<(), LearnerError>;
}

/// The train and test statistics of a client for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientLogs {
    pub train_loss: f64,
    pub train_metric: f64,
    pub test_loss: f64,
    pub test_metric: f64,
}

/// A simulated participant with a private data partition and a local learner.
pub trait Client {
    type Learner: Learner;

    /// The identifier of this client.
    fn id(&self) -> usize;

    /// Runs the configured number of local optimization steps on the private training data.
    fn step(&mut self) -> Result<(), ClientError>;

    /// The size of the training partition.
    fn num_samples(&self) -> usize;

    fn learner(&self) -> &Self::Learner;

    fn learner_mut(&mut self) -> &mut Self::Learner;

    /// Evaluates the local learner and records the statistics for round `counter`.
    ///
    /// Must not modify the parameters of the learner.
    fn write_logs(&mut self, counter: u64) -> Result<ClientLogs, ClientError>;
}
