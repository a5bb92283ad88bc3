//! Weighting of the clients' influence on the global model.

use std::{fmt, ops::Index, slice::Iter, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{aggregator::ConfigurationError, client::Client};

/// The tolerance within which client weights must sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// The rule determining the influence of each client on the global model.
pub enum WeightingPolicy {
    /// Every client has the same weight `1 / n_clients`.
    Average,
    /// Every client has a weight proportional to its number of training samples.
    Weighted,
}

impl FromStr for WeightingPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(Self::Average),
            "weighted" => Ok(Self::Weighted),
            _ => Err(ConfigurationError::UnsupportedPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for WeightingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// The weights of the clients, aligned by client index.
///
/// The weights are finite, non-negative and sum to one within [`WEIGHT_SUM_TOLERANCE`].
pub struct ClientsWeights(Vec<f64>);

#[allow(clippy::len_without_is_empty)]
impl ClientsWeights {
    /// Validates user-supplied weights.
    ///
    /// # Errors
    /// Fails if there are no weights, if a weight is negative or not finite, or if the weights
    /// don't sum to one.
    pub fn new(weights: Vec<f64>) -> Result<Self, ConfigurationError> {
        if weights.is_empty() {
            return Err(ConfigurationError::NoClients);
        }
        if let Some((client_id, &weight)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.)
        {
            return Err(ConfigurationError::InvalidWeight { client_id, weight });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigurationError::WeightSum(sum));
        }
        Ok(Self(weights))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> Iter<f64> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Index<usize> for ClientsWeights {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<ClientsWeights> for Vec<f64> {
    fn from(weights: ClientsWeights) -> Self {
        weights.0
    }
}

/// Computes the client weights from the clients' sample counts.
///
/// # Errors
/// Fails if there are no clients, or if `policy` is [`WeightingPolicy::Weighted`] and the clients
/// hold no samples at all or more samples than can be counted.
pub fn clients_weights(
    sample_counts: &[usize],
    policy: WeightingPolicy,
) -> Result<ClientsWeights, ConfigurationError> {
    let n_clients = sample_counts.len();
    if n_clients == 0 {
        return Err(ConfigurationError::NoClients);
    }

    let weights = match policy {
        WeightingPolicy::Average => vec![1. / n_clients as f64; n_clients],
        WeightingPolicy::Weighted => {
            let total = sample_counts
                .iter()
                .try_fold(0_usize, |total, &samples| total.checked_add(samples))
                .ok_or(ConfigurationError::SampleCountOverflow)?;
            if total == 0 {
                return Err(ConfigurationError::ZeroTotalSamples);
            }
            sample_counts
                .iter()
                .map(|&samples| samples as f64 / total as f64)
                .collect()
        }
    };

    Ok(ClientsWeights(weights))
}

/// Computes the client weights of a client population.
pub fn clients_weights_for<C: Client>(
    clients: &[C],
    policy: WeightingPolicy,
) -> Result<ClientsWeights, ConfigurationError> {
    let sample_counts: Vec<usize> = clients.iter().map(Client::num_samples).collect();
    clients_weights(&sample_counts, policy)
}
