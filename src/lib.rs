#![cfg_attr(docsrs, feature(doc_cfg))]
//! # fedsim: federated learning in a single process
//!
//! `fedsim` simulates a population of clients, each owning a private data partition and a local
//! learner, coordinated by an [`Aggregator`] which runs synchronous training rounds. The
//! aggregator either lets the clients train in isolation or merges their parameters into a global
//! model by federated averaging and broadcasts it back.
//!
//! The aggregation protocol is independent of the model: learners only expose their parameters as
//! a flat [`ParamVector`]. The [`simulation`] module provides a synthetic linear regression
//! workload to drive it end to end.
//!
//! ## Running a simulation
//!
//! ```text
//! fedsim -c configs/config.toml
//! ```
//!
//! The settings are described in [`settings`].
//!
//! [`Aggregator`]: aggregator::Aggregator
//! [`ParamVector`]: model::ParamVector

pub mod aggregator;
pub mod client;
pub mod logger;
pub mod model;
pub mod rng;
pub mod settings;
pub mod simulation;
#[cfg(test)]
pub(crate) mod testutils;
pub mod weighting;

pub use self::{
    aggregator::{Aggregator, AggregatorError, AggregatorOptions, GlobalLogs, Strategy},
    client::{Client, Learner},
    model::ParamVector,
    weighting::{ClientsWeights, WeightingPolicy},
};
