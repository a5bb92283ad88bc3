use crate::{
    aggregator::{Aggregator, AggregatorError},
    client::{Client, Learner},
    logger::ScalarLogger,
};

impl<C, G, L> Aggregator<C, G, L>
where
    C: Client,
    G: Learner,
    L: ScalarLogger,
{
    /// Runs the local step of every client without any parameter exchange.
    pub(super) fn mix_isolated(&mut self) -> Result<(), AggregatorError> {
        self.local_phase()
    }
}
