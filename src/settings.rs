//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables. An
//! example configuration file can be found in the `configs/` directory located in the repository
//! root.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    aggregator::{AggregatorType, MissingClientPolicy, Verbosity},
    weighting::WeightingPolicy,
};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    #[validate]
    pub simulation: SimulationSettings,
    pub log: LoggingSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("fedsim").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone, PartialEq)]
#[validate(schema(function = "validate_simulation"))]
#[serde(default)]
/// The simulation settings.
///
/// Every field may be omitted, in which case its default value is used.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [simulation]
/// n_clients = 10
/// n_rounds = 50
/// aggregator = "centralized"
/// objective = "weighted"
/// ```
///
/// **Environment variable**
/// ```text
/// FEDSIM_SIMULATION__N_ROUNDS=50
/// FEDSIM_SIMULATION__AGGREGATOR=no_communication
/// ```
pub struct SimulationSettings {
    /// The number of clients. Must be at least `1`.
    pub n_clients: usize,
    /// The number of training rounds.
    pub n_rounds: u64,
    /// The number of mini-batch updates a client performs per round. Must be at least `1`.
    pub local_steps: usize,
    /// The size of a mini-batch. Must be at least `1`.
    pub batch_size: usize,
    /// The learning rate of the clients. Must be positive.
    pub lr: f32,
    /// The number of input features of the regression task. Must be at least `1`.
    pub input_dim: usize,
    /// The minimal number of training samples of a client.
    pub min_samples: usize,
    /// The maximal number of training samples of a client.
    pub max_samples: usize,
    /// The magnitude of the uniform noise added to the targets. Must not be negative.
    pub noise: f32,
    /// The aggregation strategy.
    pub aggregator: AggregatorType,
    /// The weighting policy of the clients.
    pub objective: WeightingPolicy,
    /// The treatment of clients which don't yield parameters in the centralized strategy.
    pub on_missing_client: MissingClientPolicy,
    /// The verbosity level `0`, `1` or `2`.
    pub verbose: Verbosity,
    /// The seed of all random draws. A missing or negative seed is derived from the current time.
    pub seed: Option<i64>,
    /// The statistics are written every `log_freq` rounds. Must be at least `1`.
    pub log_freq: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            n_clients: 10,
            n_rounds: 10,
            local_steps: 5,
            batch_size: 16,
            lr: 0.05,
            input_dim: 4,
            min_samples: 20,
            max_samples: 100,
            noise: 0.1,
            aggregator: AggregatorType::Centralized,
            objective: WeightingPolicy::Weighted,
            on_missing_client: MissingClientPolicy::default(),
            verbose: Verbosity::default(),
            seed: None,
            log_freq: 1,
        }
    }
}

impl SimulationSettings {
    /// Checks the simulation settings.
    fn validate_simulation(&self) -> Result<(), ValidationError> {
        self.validate_counts()?;
        self.validate_samples()?;
        self.validate_training()
    }

    /// Checks the counts which must be positive.
    fn validate_counts(&self) -> Result<(), ValidationError> {
        // the validate attribute only accepts literals, therefore we check the invariants here
        if self.n_clients >= 1
            && self.local_steps >= 1
            && self.batch_size >= 1
            && self.input_dim >= 1
            && self.log_freq >= 1
        {
            Ok(())
        } else {
            Err(ValidationError::new("invalid count(s)"))
        }
    }

    /// Checks the sample range and the noise.
    fn validate_samples(&self) -> Result<(), ValidationError> {
        if self.min_samples > self.max_samples {
            return Err(ValidationError::new("invalid sample range"));
        }
        if self.objective == WeightingPolicy::Weighted && self.max_samples == 0 {
            return Err(ValidationError::new("weighting without samples"));
        }
        if self.noise.is_finite() && self.noise >= 0. {
            Ok(())
        } else {
            Err(ValidationError::new("invalid noise"))
        }
    }

    /// Checks the learning rate.
    fn validate_training(&self) -> Result<(), ValidationError> {
        if self.lr.is_finite() && self.lr > 0. {
            Ok(())
        } else {
            Err(ValidationError::new("invalid learning rate"))
        }
    }
}

/// A wrapper for validate derive.
fn validate_simulation(s: &SimulationSettings) -> Result<(), ValidationError> {
    s.validate_simulation()
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
/// The output settings.
pub struct OutputSettings {
    /// The file the scalar series are written to as JSON lines. Nothing is written if absent.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [output]
    /// scalars = "runs/scalars.jsonl"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSIM_OUTPUT__SCALARS=runs/scalars.jsonl
    /// ```
    pub scalars: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
/// The logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSIM_LOG__FILTER=fedsim=debug,info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_new() {
        assert!(Settings::new("configs/config.toml").is_ok());
        assert!(Settings::new("").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = Settings::new("configs/config.toml").unwrap();
        assert_eq!(settings.simulation.aggregator, AggregatorType::Centralized);
        assert_eq!(settings.simulation.objective, WeightingPolicy::Weighted);
        assert_eq!(settings.simulation.verbose, Verbosity::Summary);
        assert_eq!(settings.output, OutputSettings::default());
    }

    #[test]
    fn test_validate_simulation() {
        assert!(SimulationSettings::default().validate_simulation().is_ok());
        assert!(SimulationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_simulation_counts() {
        let settings = SimulationSettings {
            n_clients: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            local_steps: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            batch_size: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            input_dim: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            log_freq: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        // zero rounds only logs the initial state
        let settings = SimulationSettings {
            n_rounds: 0,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_simulation_samples() {
        let settings = SimulationSettings {
            min_samples: 11,
            max_samples: 10,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            min_samples: 0,
            max_samples: 0,
            objective: WeightingPolicy::Weighted,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            min_samples: 0,
            max_samples: 0,
            objective: WeightingPolicy::Average,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_ok());

        let settings = SimulationSettings {
            noise: -0.1,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_simulation_training() {
        let settings = SimulationSettings {
            lr: 0.,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulationSettings {
            lr: f32::NAN,
            ..SimulationSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
