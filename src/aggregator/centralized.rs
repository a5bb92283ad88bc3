use tracing::{debug, error, warn};

use crate::{
    aggregator::{Aggregator, AggregatorError, MissingClientPolicy},
    client::{Client, ClientError, Learner, LearnerError},
    logger::ScalarLogger,
    model::{ParamVector, WeightedSum},
};

impl<C, G, L> Aggregator<C, G, L>
where
    C: Client,
    G: Learner,
    L: ScalarLogger,
{
    /// Runs one round of federated averaging.
    ///
    /// See the [module level documentation] for the phases of a round.
    ///
    /// [module level documentation]: crate::aggregator
    pub(super) fn mix_centralized(
        &mut self,
        on_missing_client: MissingClientPolicy,
    ) -> Result<(), AggregatorError> {
        self.local_phase()?;
        let params = self.collect_params()?;
        let merged = self.merge(&params, on_missing_client)?;

        let previous = self.global_learner.get_param_tensor()?;
        self.global_learner.set_param_tensor(&merged)?;
        debug!("global model updated");

        if let Err(err) = self.broadcast_params(&merged) {
            self.restore_global(previous);
            return Err(err);
        }
        Ok(())
    }

    /// Reads the parameter vector of every client, aligned by client index.
    ///
    /// Clients which fail to yield a vector are reported and collected as `None`.
    fn collect_params(&self) -> Result<Vec<Option<ParamVector>>, AggregatorError> {
        let mut params = Vec::with_capacity(self.clients.len());
        for client in self.clients.iter() {
            let client_id = client.id();
            let client_params = match client.learner().get_param_tensor() {
                Ok(Some(p)) if !p.is_empty() => {
                    if p.len() != self.model_dim {
                        return Err(AggregatorError::DimensionMismatch {
                            client_id,
                            expected: self.model_dim,
                            actual: p.len(),
                        });
                    }
                    debug!(client_id, len = p.len(), "collected parameters");
                    Some(p)
                }
                Ok(_) => {
                    warn!(client_id, "client yielded no parameters: excluded from the merge");
                    None
                }
                Err(err) => {
                    warn!(
                        client_id,
                        "failed to read client parameters: excluded from the merge: {}", err
                    );
                    None
                }
            };
            params.push(client_params);
        }

        if params.iter().all(Option::is_none) {
            error!("no client yielded parameters: aborting round");
            return Err(AggregatorError::AllClientsFailed { round: self.round });
        }
        Ok(params)
    }

    /// Computes the weighted sum of the collected parameter vectors in client order.
    fn merge(
        &self,
        params: &[Option<ParamVector>],
        on_missing_client: MissingClientPolicy,
    ) -> Result<ParamVector, AggregatorError> {
        let mut sum = WeightedSum::new(self.model_dim);
        let mut participating_weight = 0.;
        for (idx, client_params) in params.iter().enumerate() {
            if let Some(p) = client_params {
                let weight = self.clients_weights[idx];
                sum.add(weight, p)
                    .map_err(|err| AggregatorError::DimensionMismatch {
                        client_id: self.clients[idx].id(),
                        expected: err.expected,
                        actual: err.actual,
                    })?;
                participating_weight += weight;
            }
        }

        let missing = params.len() - sum.nb_vectors();
        if missing > 0 {
            match on_missing_client {
                MissingClientPolicy::ExcludeAsZero => {
                    warn!(
                        missing,
                        participating_weight, "merging without the weight of the missing clients"
                    );
                }
                MissingClientPolicy::ExcludeAndRenormalize => {
                    if participating_weight <= 0. {
                        return Err(AggregatorError::ZeroParticipatingWeight);
                    }
                    debug!(missing, participating_weight, "renormalizing client weights");
                    sum.scale(1. / participating_weight);
                }
            }
        }

        Ok(sum.into_params())
    }

    /// Overwrites the parameters of every client with the global parameter vector.
    pub(super) fn broadcast(&mut self) -> Result<(), AggregatorError> {
        let global_params = self.global_learner.get_param_tensor()?.ok_or_else(|| {
            LearnerError::InvalidParams("the global learner yielded no parameters".into())
        })?;
        self.broadcast_params(&global_params)
    }

    /// Writes `params` to every client, in client order.
    ///
    /// If a client rejects the vector, the clients written so far get their previous parameters
    /// back before the error is returned.
    fn broadcast_params(&mut self, params: &ParamVector) -> Result<(), AggregatorError> {
        debug!(len = params.len(), "broadcasting global parameters");

        let mut previous = Vec::with_capacity(self.clients.len());
        let mut rejected = None;
        for client in self.clients.iter_mut() {
            let client_id = client.id();
            let snapshot = client.learner().get_param_tensor().ok().flatten();
            if let Err(err) = client.learner_mut().set_param_tensor(params) {
                rejected = Some((client_id, err));
                break;
            }
            previous.push(snapshot);
        }

        match rejected {
            Some((client_id, err)) => {
                error!(client_id, "client rejected the global parameters: {}", err);
                self.restore_clients(previous);
                Err(AggregatorError::ClientFailure {
                    client_id,
                    source: ClientError::Learner(err),
                })
            }
            None => Ok(()),
        }
    }

    /// Writes back the parameters the first clients held before a failed broadcast.
    fn restore_clients(&mut self, previous: Vec<Option<ParamVector>>) {
        for (client, snapshot) in self.clients.iter_mut().zip(previous) {
            let client_id = client.id();
            let restored = match snapshot {
                Some(params) => client.learner_mut().set_param_tensor(&params).is_ok(),
                None => false,
            };
            if !restored {
                warn!(client_id, "failed to restore the client parameters");
            }
        }
    }

    /// Writes back the global parameters of the previous round.
    fn restore_global(&mut self, previous: Option<ParamVector>) {
        let restored = match previous {
            Some(params) => self.global_learner.set_param_tensor(&params).is_ok(),
            None => false,
        };
        if restored {
            debug!("global model restored");
        } else {
            warn!("failed to restore the global model");
        }
    }
}
