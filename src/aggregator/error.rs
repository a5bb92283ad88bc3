use thiserror::Error;

use crate::{
    client::{ClientError, LearnerError},
    logger::LoggerError,
};

#[derive(Debug, Error, PartialEq)]
/// Errors related to an inconsistent simulation setup. They are detected at construction time.
pub enum ConfigurationError {
    #[error("got {clients} clients but {weights} client weights")]
    LengthMismatch { clients: usize, weights: usize },

    #[error("the simulation requires at least one client")]
    NoClients,

    #[error("{0} is not an available objective type, possible are: 'average', 'weighted'")]
    UnsupportedPolicy(String),

    #[error("cannot weight clients by their number of samples: the clients hold no samples")]
    ZeroTotalSamples,

    #[error("cannot weight clients by their number of samples: the total number of samples overflows")]
    SampleCountOverflow,

    #[error("invalid weight {weight} for client {client_id}: weights must be finite and non-negative")]
    InvalidWeight { client_id: usize, weight: f64 },

    #[error("client weights must sum to 1, got {0}")]
    WeightSum(f64),

    #[error("{0} is not a possible aggregator type, possible are: 'centralized', 'no_communication'")]
    UnsupportedAggregator(String),

    #[error(
        "{0} is not a possible missing client policy, possible are: 'exclude_as_zero', 'exclude_and_renormalize'"
    )]
    UnsupportedMissingClientPolicy(String),

    #[error("invalid verbosity level {0}, possible are: 0, 1, 2")]
    InvalidVerbosity(u8),
}

#[derive(Debug, Error)]
/// Errors that prevent a round from completing.
///
/// When `mix()` fails, the round counter keeps its pre-round value.
pub enum AggregatorError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("client {client_id} failed: {source}")]
    ClientFailure {
        client_id: usize,
        #[source]
        source: ClientError,
    },

    #[error("no client yielded a parameter vector in round {round}")]
    AllClientsFailed { round: u64 },

    #[error(
        "client {client_id} has a parameter vector of length {actual} but the global model has dimension {expected}"
    )]
    DimensionMismatch {
        client_id: usize,
        expected: usize,
        actual: usize,
    },

    #[error("the clients that yielded a parameter vector have a total weight of zero")]
    ZeroParticipatingWeight,

    #[error("global learner failure: {0}")]
    GlobalLearner(#[from] LearnerError),

    #[error("failed to write logs: {0}")]
    Logger(#[from] LoggerError),
}
