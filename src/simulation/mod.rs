//! A synthetic federated regression workload.
//!
//! Every client holds a private partition of samples drawn from one shared linear ground truth
//! and trains a [`LinearLearner`] on it. This drives the [`Aggregator`] end to end without any
//! external dataset or model.

pub mod client;
pub mod data;
pub mod learner;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::{info, info_span};

pub use self::{
    client::SyntheticClient,
    data::{Dataset, GroundTruth, Partition},
    learner::LinearLearner,
};
use crate::{
    aggregator::{Aggregator, AggregatorError, AggregatorOptions, GlobalLogs},
    logger::ScalarLogger,
    rng::resolve_seed,
    settings::SimulationSettings,
    weighting::clients_weights_for,
};

/// The outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// The seed the run was carried out with.
    pub seed: u64,
    /// The logged statistics, starting with the untrained model at round `0`.
    pub logs: Vec<GlobalLogs>,
}

impl SimulationReport {
    pub fn last(&self) -> Option<&GlobalLogs> {
        self.logs.last()
    }
}

// streams 0 and 1 of the seed belong to the aggregator
const DATA_STREAM: u64 = 2;
const FIRST_CLIENT_STREAM: u64 = 3;

/// Draws the client population.
///
/// The data of all clients is drawn from one stream of `seed`, while every client gets its own
/// stream for drawing mini-batches.
pub fn build_clients(settings: &SimulationSettings, seed: u64) -> Vec<SyntheticClient> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(DATA_STREAM);
    let truth = GroundTruth::generate(settings.input_dim, &mut rng);

    (0..settings.n_clients)
        .map(|id| {
            let n_train = rng.gen_range(settings.min_samples..=settings.max_samples);
            let partition = Partition::generate(&truth, n_train, settings.noise, &mut rng);
            let mut client_rng = ChaCha20Rng::seed_from_u64(seed);
            client_rng.set_stream(FIRST_CLIENT_STREAM + id as u64);
            SyntheticClient::new(
                id,
                partition,
                LinearLearner::new(settings.input_dim, settings.lr),
                settings.local_steps,
                settings.batch_size,
                client_rng,
            )
        })
        .collect()
}

/// Draws the client population and creates the aggregator configured by `settings`.
pub fn build_aggregator<L: ScalarLogger>(
    settings: &SimulationSettings,
    seed: u64,
    logger: L,
) -> Result<Aggregator<SyntheticClient, LinearLearner, L>, AggregatorError> {
    let clients = build_clients(settings, seed);
    let weights = clients_weights_for(&clients, settings.objective)?;
    let global_learner = LinearLearner::new(settings.input_dim, settings.lr);
    let options = AggregatorOptions {
        strategy: settings.aggregator.strategy(settings.on_missing_client),
        verbose: settings.verbose,
        seed: Some(seed as i64),
    };
    Aggregator::new(clients, weights, global_learner, logger, options)
}

/// Runs `n_rounds` rounds and logs the statistics every `log_freq` rounds and after the last one.
///
/// # Errors
/// Fails if the setup is inconsistent or a round fails.
pub fn run<L: ScalarLogger>(
    settings: &SimulationSettings,
    logger: L,
) -> Result<SimulationReport, AggregatorError> {
    // keep the seed in the range of the aggregator's seed option
    let seed = resolve_seed(settings.seed) & i64::MAX as u64;
    let span = info_span!("simulation", seed, aggregator = %settings.aggregator);
    let _enter = span.enter();

    let mut aggregator = build_aggregator(settings, seed, logger)?;
    info!(
        n_clients = aggregator.n_clients(),
        model_dim = aggregator.model_dim(),
        n_rounds = settings.n_rounds,
        "starting simulation"
    );

    let mut logs = vec![aggregator.write_logs()?];
    for round in 1..=settings.n_rounds {
        aggregator.mix()?;
        if round % settings.log_freq == 0 || round == settings.n_rounds {
            logs.push(aggregator.write_logs()?);
        }
    }

    info!(rounds = aggregator.round(), "simulation completed");
    Ok(SimulationReport { seed, logs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregator::{AggregatorType, Strategy},
        client::{Client, Learner},
        logger::InMemoryLogger,
        weighting::WeightingPolicy,
    };

    #[test]
    fn test_build_clients() {
        let settings = SimulationSettings {
            n_clients: 4,
            min_samples: 10,
            max_samples: 20,
            ..SimulationSettings::default()
        };
        let clients = build_clients(&settings, 11);
        assert_eq!(clients.len(), 4);
        for (id, client) in clients.iter().enumerate() {
            assert_eq!(client.id(), id);
            assert!((10..=20).contains(&client.num_samples()));
            assert_eq!(client.learner().model_dim(), settings.input_dim + 1);
        }

        let again = build_clients(&settings, 11);
        for (a, b) in clients.iter().zip(again.iter()) {
            assert_eq!(a.partition(), b.partition());
        }
    }

    #[test]
    fn test_build_aggregator() {
        let settings = SimulationSettings {
            objective: WeightingPolicy::Weighted,
            aggregator: AggregatorType::NoCommunication,
            ..SimulationSettings::default()
        };
        let aggregator = build_aggregator(&settings, 3, InMemoryLogger::new()).unwrap();
        assert_eq!(aggregator.strategy(), Strategy::NoCommunication);
        assert_eq!(aggregator.seed(), 3);

        let total: usize = aggregator.clients().iter().map(Client::num_samples).sum();
        for (client, weight) in aggregator
            .clients()
            .iter()
            .zip(aggregator.clients_weights().iter())
        {
            assert_eq!(*weight, client.num_samples() as f64 / total as f64);
        }
    }

    #[test]
    fn test_run_logs() {
        let settings = SimulationSettings {
            n_rounds: 5,
            log_freq: 2,
            seed: Some(1),
            ..SimulationSettings::default()
        };
        let report = run(&settings, InMemoryLogger::new()).unwrap();
        assert_eq!(report.seed, 1);
        let rounds: Vec<u64> = report.logs.iter().map(|logs| logs.round).collect();
        assert_eq!(rounds, vec![0, 2, 4, 5]);
    }

    #[test]
    fn test_run_is_reproducible() {
        let settings = SimulationSettings {
            n_rounds: 3,
            seed: Some(21),
            ..SimulationSettings::default()
        };
        let first = run(&settings, InMemoryLogger::new()).unwrap();
        let second = run(&settings, InMemoryLogger::new()).unwrap();
        assert_eq!(first.logs, second.logs);
    }

    #[test]
    fn test_centralized_training_converges() {
        let settings = SimulationSettings {
            n_rounds: 20,
            seed: Some(4),
            ..SimulationSettings::default()
        };
        let report = run(&settings, InMemoryLogger::new()).unwrap();
        let initial = report.logs[0];
        let last = report.last().unwrap();
        assert!(last.train_loss < initial.train_loss / 10.);
        assert!(last.test_loss < initial.test_loss / 10.);
    }
}
