//! The round-based aggregation protocol.
//!
//! An [`Aggregator`] owns the client population, the global learner and the round counter. The
//! driver calls [`mix()`] once per round, usually followed by [`write_logs()`]:
//!
//! ```text
//! Created -> { mix -> write_logs }*
//! ```
//!
//! There is no terminal state: the driver decides when to stop calling [`mix()`].
//!
//! # Strategies
//!
//! The set of strategies is closed, see [`Strategy`]:
//!
//! - [`Strategy::NoCommunication`]: every client trains on its own data. Nothing is exchanged and
//!   the global learner is never touched. This is the baseline of what clients achieve without
//!   collaborating.
//! - [`Strategy::Centralized`]: synchronous federated averaging. Every round runs the following
//!   phases in strict order:
//!   1. **local**: every client performs its local step, in client order.
//!   2. **collection**: the flattened parameter vector of every client is read. Clients which
//!      don't yield a vector are reported and handled according to the [`MissingClientPolicy`].
//!   3. **merge**: the weighted sum of the vectors, accumulated in client order, becomes the new
//!      global parameter vector.
//!   4. **broadcast**: the global parameter vector is written to every client.
//!
//! # Failures
//!
//! Errors are returned synchronously from [`mix()`]. A failed round is not counted: the round
//! counter is incremented only after all the work of the round has completed. The global learner
//! is left unchanged as well: if a client rejects the merged vector during the broadcast, the
//! global learner and the clients written so far get their previous parameters back.
//!
//! [`mix()`]: Aggregator::mix
//! [`write_logs()`]: Aggregator::write_logs

mod centralized;
mod error;
mod no_communication;

use std::{convert::TryFrom, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, error_span, info};

pub use self::error::{AggregatorError, ConfigurationError};
use crate::{
    client::{Client, ClientLogs, Learner},
    logger::ScalarLogger,
    rng::AggregatorRng,
    weighting::ClientsWeights,
};

/// The names of the scalar series written by [`Aggregator::write_logs()`].
pub const TRAIN_LOSS: &str = "Train/Loss";
pub const TRAIN_METRIC: &str = "Train/Metric";
pub const TEST_LOSS: &str = "Test/Loss";
pub const TEST_METRIC: &str = "Test/Metric";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How the centralized strategy treats clients that don't yield a parameter vector.
pub enum MissingClientPolicy {
    /// Missing clients contribute zero to the weighted sum. The weights of the remaining clients
    /// are not renormalized, so the merged vector is scaled down by the weight of the missing
    /// clients.
    ExcludeAsZero,
    /// The weights of the remaining clients are renormalized to sum to one.
    ExcludeAndRenormalize,
}

impl Default for MissingClientPolicy {
    fn default() -> Self {
        Self::ExcludeAsZero
    }
}

impl FromStr for MissingClientPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exclude_as_zero" => Ok(Self::ExcludeAsZero),
            "exclude_and_renormalize" => Ok(Self::ExcludeAndRenormalize),
            _ => Err(ConfigurationError::UnsupportedMissingClientPolicy(
                s.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
/// The aggregation strategy.
pub enum Strategy {
    /// Clients train in isolation.
    #[display(fmt = "no_communication")]
    NoCommunication,
    /// Clients are merged into the global model by federated averaging.
    #[display(fmt = "centralized")]
    Centralized {
        on_missing_client: MissingClientPolicy,
    },
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Centralized {
            on_missing_client: MissingClientPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// The name of an aggregation strategy, as found in configuration files.
pub enum AggregatorType {
    #[display(fmt = "centralized")]
    Centralized,
    #[display(fmt = "no_communication")]
    NoCommunication,
}

impl AggregatorType {
    /// Gets the strategy of this type. `on_missing_client` only affects the centralized strategy.
    pub fn strategy(self, on_missing_client: MissingClientPolicy) -> Strategy {
        match self {
            Self::Centralized => Strategy::Centralized { on_missing_client },
            Self::NoCommunication => Strategy::NoCommunication,
        }
    }
}

impl FromStr for AggregatorType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centralized" => Ok(Self::Centralized),
            "no_communication" => Ok(Self::NoCommunication),
            _ => Err(ConfigurationError::UnsupportedAggregator(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u8")]
/// The amount of round statistics emitted by [`Aggregator::write_logs()`].
pub enum Verbosity {
    /// Nothing is emitted.
    Silent = 0,
    /// The aggregated statistics are emitted once per round.
    Summary = 1,
    /// The statistics of every client are emitted as well.
    Detail = 2,
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::Silent
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = ConfigurationError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Silent),
            1 => Ok(Self::Summary),
            2 => Ok(Self::Detail),
            _ => Err(ConfigurationError::InvalidVerbosity(level)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Construction options of an [`Aggregator`].
pub struct AggregatorOptions {
    pub strategy: Strategy,
    pub verbose: Verbosity,
    /// A non-negative seed makes the aggregator's random draws reproducible. If absent or
    /// negative, the seed is derived from the current time.
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
/// The weighted means of the client statistics for one round.
pub struct GlobalLogs {
    pub round: u64,
    pub train_loss: f64,
    pub train_metric: f64,
    pub test_loss: f64,
    pub test_metric: f64,
}

/// Coordinates a population of clients through synchronous rounds.
pub struct Aggregator<C, G, L> {
    clients: Vec<C>,
    clients_weights: ClientsWeights,
    global_learner: G,
    logger: L,
    verbose: Verbosity,
    strategy: Strategy,
    rng: AggregatorRng,
    model_dim: usize,
    round: u64,
}

impl<C, G, L> Aggregator<C, G, L>
where
    C: Client,
    G: Learner,
    L: ScalarLogger,
{
    /// Creates an aggregator for the given clients.
    ///
    /// # Errors
    /// Fails if there are no clients, if the number of clients and weights differ, or if a
    /// client's learner doesn't have the model dimension of the global learner.
    pub fn new(
        clients: Vec<C>,
        clients_weights: ClientsWeights,
        global_learner: G,
        logger: L,
        options: AggregatorOptions,
    ) -> Result<Self, AggregatorError> {
        if clients.is_empty() {
            return Err(ConfigurationError::NoClients.into());
        }
        if clients.len() != clients_weights.len() {
            return Err(ConfigurationError::LengthMismatch {
                clients: clients.len(),
                weights: clients_weights.len(),
            }
            .into());
        }

        let model_dim = global_learner.model_dim();
        if let Some(client) = clients
            .iter()
            .find(|client| client.learner().model_dim() != model_dim)
        {
            return Err(AggregatorError::DimensionMismatch {
                client_id: client.id(),
                expected: model_dim,
                actual: client.learner().model_dim(),
            });
        }

        let rng = AggregatorRng::new(options.seed);
        debug!(
            n_clients = clients.len(),
            model_dim,
            device = %global_learner.device(),
            seed = rng.seed(),
            strategy = %options.strategy,
            "aggregator created"
        );

        Ok(Self {
            clients,
            clients_weights,
            global_learner,
            logger,
            verbose: options.verbose,
            strategy: options.strategy,
            rng,
            model_dim,
            round: 0,
        })
    }

    /// Advances the simulation by exactly one round.
    ///
    /// # Errors
    /// Fails if a client fails its local step, if a client's parameter vector doesn't match the
    /// model dimension, or if no client yields a parameter vector. The round counter is unchanged
    /// in every case.
    pub fn mix(&mut self) -> Result<(), AggregatorError> {
        let span = error_span!("mix", round = self.round, strategy = %self.strategy);
        let _enter = span.enter();

        debug!(n_clients = self.clients.len(), "starting round");
        match self.strategy {
            Strategy::NoCommunication => self.mix_isolated()?,
            Strategy::Centralized { on_missing_client } => {
                self.mix_centralized(on_missing_client)?
            }
        }

        self.round += 1;
        debug!("round completed");
        Ok(())
    }

    /// Pushes the global state to every client. The clients of the no-communication strategy
    /// never receive external parameters.
    ///
    /// # Errors
    /// Fails if the global parameter vector can't be read or a client rejects it.
    pub fn update_clients(&mut self) -> Result<(), AggregatorError> {
        match self.strategy {
            Strategy::NoCommunication => Ok(()),
            Strategy::Centralized { .. } => self.broadcast(),
        }
    }

    /// Computes and records the weighted means of the clients' train and test statistics for the
    /// current round.
    ///
    /// The four series are written to the logger keyed by the round counter, then the logger is
    /// flushed. This never modifies the parameters of the clients or of the global learner.
    ///
    /// # Errors
    /// Fails if a client fails to evaluate itself or the logger fails to record the statistics.
    pub fn write_logs(&mut self) -> Result<GlobalLogs, AggregatorError> {
        let mut global = GlobalLogs {
            round: self.round,
            train_loss: 0.,
            train_metric: 0.,
            test_loss: 0.,
            test_metric: 0.,
        };

        for (idx, client) in self.clients.iter_mut().enumerate() {
            let client_id = client.id();
            let ClientLogs {
                train_loss,
                train_metric,
                test_loss,
                test_metric,
            } = client
                .write_logs(self.round)
                .map_err(|source| AggregatorError::ClientFailure { client_id, source })?;

            if self.verbose >= Verbosity::Detail {
                info!(
                    "client {} | train loss: {:.3} | train metric: {:.3} | test loss: {:.3} | test metric: {:.3}",
                    client_id, train_loss, train_metric, test_loss, test_metric,
                );
            }

            let weight = self.clients_weights[idx];
            global.train_loss += weight * train_loss;
            global.train_metric += weight * train_metric;
            global.test_loss += weight * test_loss;
            global.test_metric += weight * test_metric;
        }

        if self.verbose >= Verbosity::Summary {
            info!(
                "global | round {} | train loss: {:.3} | train metric: {:.3} | test loss: {:.3} | test metric: {:.3}",
                self.round, global.train_loss, global.train_metric, global.test_loss, global.test_metric,
            );
        }

        self.logger
            .add_scalar(TRAIN_LOSS, global.train_loss, self.round)?;
        self.logger
            .add_scalar(TRAIN_METRIC, global.train_metric, self.round)?;
        self.logger
            .add_scalar(TEST_LOSS, global.test_loss, self.round)?;
        self.logger
            .add_scalar(TEST_METRIC, global.test_metric, self.round)?;
        self.logger.flush()?;

        Ok(global)
    }

    /// Runs the local step of every client, in client order.
    fn local_phase(&mut self) -> Result<(), AggregatorError> {
        for client in self.clients.iter_mut() {
            let client_id = client.id();
            debug!(client_id, "local step");
            client
                .step()
                .map_err(|source| AggregatorError::ClientFailure { client_id, source })?;
        }
        Ok(())
    }
}

impl<C, G, L> Aggregator<C, G, L> {
    /// Gets the number of completed rounds.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn n_clients(&self) -> usize {
        self.clients.len()
    }

    /// Gets the length of the flattened parameter vectors.
    pub fn model_dim(&self) -> usize {
        self.model_dim
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn verbose(&self) -> Verbosity {
        self.verbose
    }

    pub fn clients_weights(&self) -> &ClientsWeights {
        &self.clients_weights
    }

    pub fn clients(&self) -> &[C] {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut [C] {
        &mut self.clients
    }

    pub fn global_learner(&self) -> &G {
        &self.global_learner
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    /// Gets the seed of the aggregator's random generators.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn rng_mut(&mut self) -> &mut AggregatorRng {
        &mut self.rng
    }

    /// Consumes the aggregator and returns the clients, the global learner and the logger.
    pub fn into_parts(self) -> (Vec<C>, G, L) {
        (self.clients, self.global_learner, self.logger)
    }
}
