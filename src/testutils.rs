//! Fake clients and learners for the aggregator tests.

use std::{
    cell::Cell,
    io,
    sync::{Arc, Mutex},
};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::{
    aggregator::{Aggregator, AggregatorOptions},
    client::{Client, ClientError, ClientLogs, Device, Learner, LearnerError},
    logger::InMemoryLogger,
    model::ParamVector,
    weighting::ClientsWeights,
};

pub type FakeAggregator = Aggregator<FakeClient, FakeLearner, InMemoryLogger>;

/// Creates an aggregator for fake clients with the given parameters and weights.
pub fn aggregator(
    client_params: Vec<Vec<f32>>,
    weights: Vec<f64>,
    global_params: Vec<f32>,
    options: AggregatorOptions,
) -> FakeAggregator {
    let clients = client_params
        .into_iter()
        .enumerate()
        .map(|(id, params)| FakeClient::new(id, params))
        .collect();
    Aggregator::new(
        clients,
        ClientsWeights::new(weights).unwrap(),
        FakeLearner::new(global_params),
        InMemoryLogger::new(),
        options,
    )
    .unwrap()
}

/// Collects the `info` and higher events emitted on this thread while `f` runs.
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ParamsBehaviour {
    Stored,
    Yield(Vec<f32>),
    Nothing,
    Fail,
}

/// A learner which stores its parameters as is.
#[derive(Debug)]
pub struct FakeLearner {
    params: ParamVector,
    model_dim: usize,
    device: Device,
    behaviour: ParamsBehaviour,
    reads: Cell<usize>,
    writes: usize,
    rejects_writes: bool,
}

impl FakeLearner {
    pub fn new(params: Vec<f32>) -> Self {
        Self {
            model_dim: params.len(),
            params: params.into(),
            device: Device::cpu(),
            behaviour: ParamsBehaviour::Stored,
            reads: Cell::new(0),
            writes: 0,
            rejects_writes: false,
        }
    }

    pub fn params(&self) -> &ParamVector {
        &self.params
    }

    /// Gets the number of parameter reads.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Gets the number of parameter writes.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Learner for FakeLearner {
    fn model_dim(&self) -> usize {
        self.model_dim
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn get_param_tensor(&self) -> Result<Option<ParamVector>, LearnerError> {
        self.reads.set(self.reads.get() + 1);
        match &self.behaviour {
            ParamsBehaviour::Stored => Ok(Some(self.params.clone())),
            ParamsBehaviour::Yield(params) => Ok(Some(params.clone().into())),
            ParamsBehaviour::Nothing => Ok(None),
            ParamsBehaviour::Fail => Err(LearnerError::InvalidParams("corrupted model".into())),
        }
    }

    fn set_param_tensor(&mut self, params: &ParamVector) -> Result<(), LearnerError> {
        if self.rejects_writes {
            return Err(LearnerError::InvalidParams("read-only model".into()));
        }
        params
            .check_dim(self.model_dim)
            .map_err(|err| LearnerError::InvalidParams(err.to_string()))?;
        self.params = params.clone();
        self.writes += 1;
        Ok(())
    }
}

/// A client whose local step adds a constant to every parameter.
#[derive(Debug)]
pub struct FakeClient {
    id: usize,
    learner: FakeLearner,
    num_samples: usize,
    step_increment: f32,
    steps: usize,
    fail_step_in: Option<usize>,
    logs: ClientLogs,
    logged_rounds: Vec<u64>,
}

impl FakeClient {
    pub fn new(id: usize, params: Vec<f32>) -> Self {
        Self {
            id,
            learner: FakeLearner::new(params),
            num_samples: 10,
            step_increment: 1.,
            steps: 0,
            fail_step_in: None,
            logs: ClientLogs::default(),
            logged_rounds: Vec::new(),
        }
    }

    pub fn with_logs(mut self, logs: ClientLogs) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn set_step_increment(&mut self, increment: f32) {
        self.step_increment = increment;
    }

    /// Lets the local step fail after `steps` more successful steps.
    pub fn fail_step_in(&mut self, steps: usize) {
        self.fail_step_in = Some(steps);
    }

    /// Lets the learner yield `params` instead of its stored parameters.
    pub fn yield_params(&mut self, params: Vec<f32>) {
        self.learner.behaviour = ParamsBehaviour::Yield(params);
    }

    pub fn yield_no_params(&mut self) {
        self.learner.behaviour = ParamsBehaviour::Nothing;
    }

    pub fn fail_param_reads(&mut self) {
        self.learner.behaviour = ParamsBehaviour::Fail;
    }

    /// Lets the learner reject every parameter vector it is given.
    pub fn reject_writes(&mut self) {
        self.learner.rejects_writes = true;
    }

    pub fn accept_writes(&mut self) {
        self.learner.rejects_writes = false;
    }

    pub fn params(&self) -> &ParamVector {
        self.learner.params()
    }

    /// Gets the number of successful local steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Gets the number of parameter vectors received from the aggregator.
    pub fn received(&self) -> usize {
        self.learner.writes()
    }

    pub fn logged_rounds(&self) -> &[u64] {
        &self.logged_rounds
    }
}

impl Client for FakeClient {
    type Learner = FakeLearner;

    fn id(&self) -> usize {
        self.id
    }

    fn step(&mut self) -> Result<(), ClientError> {
        match self.fail_step_in {
            Some(0) => {
                self.fail_step_in = None;
                return Err(ClientError::Step("out of memory".into()));
            }
            Some(n) => self.fail_step_in = Some(n - 1),
            None => {}
        }
        let increment = self.step_increment;
        self.learner
            .params
            .iter_mut()
            .for_each(|param| *param += increment);
        self.steps += 1;
        Ok(())
    }

    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn learner(&self) -> &FakeLearner {
        &self.learner
    }

    fn learner_mut(&mut self) -> &mut FakeLearner {
        &mut self.learner
    }

    fn write_logs(&mut self, counter: u64) -> Result<ClientLogs, ClientError> {
        self.logged_rounds.push(counter);
        Ok(self.logs)
    }
}
