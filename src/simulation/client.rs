use rand::seq::index;
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    client::{Client, ClientError, ClientLogs},
    simulation::{data::Partition, learner::LinearLearner},
};

/// A client training a [`LinearLearner`] on its synthetic partition.
#[derive(Debug, Clone)]
pub struct SyntheticClient {
    id: usize,
    partition: Partition,
    learner: LinearLearner,
    local_steps: usize,
    batch_size: usize,
    rng: ChaCha20Rng,
}

impl SyntheticClient {
    pub fn new(
        id: usize,
        partition: Partition,
        learner: LinearLearner,
        local_steps: usize,
        batch_size: usize,
        rng: ChaCha20Rng,
    ) -> Self {
        Self {
            id,
            partition,
            learner,
            local_steps,
            batch_size,
            rng,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn local_steps(&self) -> usize {
        self.local_steps
    }
}

impl Client for SyntheticClient {
    type Learner = LinearLearner;

    fn id(&self) -> usize {
        self.id
    }

    /// Runs `local_steps` mini-batch updates, each on a batch drawn without replacement.
    fn step(&mut self) -> Result<(), ClientError> {
        let n_train = self.partition.train.len();
        if n_train == 0 {
            debug!(client_id = self.id, "no training samples: skipping local step");
            return Ok(());
        }
        let batch_size = self.batch_size.min(n_train);
        for _ in 0..self.local_steps {
            let batch = index::sample(&mut self.rng, n_train, batch_size).into_vec();
            self.learner.fit_batch(&self.partition.train, &batch);
        }
        Ok(())
    }

    fn num_samples(&self) -> usize {
        self.partition.train.len()
    }

    fn learner(&self) -> &LinearLearner {
        &self.learner
    }

    fn learner_mut(&mut self) -> &mut LinearLearner {
        &mut self.learner
    }

    fn write_logs(&mut self, counter: u64) -> Result<ClientLogs, ClientError> {
        let (train_loss, train_metric) = self.learner.evaluate(&self.partition.train);
        let (test_loss, test_metric) = self.learner.evaluate(&self.partition.test);
        debug!(
            client_id = self.id,
            round = counter,
            train_loss,
            test_loss,
            "evaluated local model"
        );
        Ok(ClientLogs {
            train_loss,
            train_metric,
            test_loss,
            test_metric,
        })
    }
}
