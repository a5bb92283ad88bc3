//! Sinks for the per-round scalar series.
//!
//! The aggregator writes four series per round (`Train/Loss`, `Train/Metric`, `Test/Loss` and
//! `Test/Metric`) to a [`ScalarLogger`] and flushes it once the round is logged.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors related to writing scalar series.
pub enum LoggerError {
    #[error("failed to write scalar: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize scalar: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An append-only sink for scalar values keyed by a step.
#[cfg_attr(test, mockall::automock)]
pub trait ScalarLogger {
    /// Records `value` for the series `name` at `step`.
    fn add_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<(), LoggerError>;

    /// Flushes all buffered values.
    fn flush(&mut self) -> Result<(), LoggerError>;
}

impl<L: ScalarLogger + ?Sized> ScalarLogger for Box<L> {
    fn add_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<(), LoggerError> {
        (**self).add_scalar(name, value, step)
    }

    fn flush(&mut self) -> Result<(), LoggerError> {
        (**self).flush()
    }
}

impl<L: ScalarLogger + ?Sized> ScalarLogger for &mut L {
    fn add_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<(), LoggerError> {
        (**self).add_scalar(name, value, step)
    }

    fn flush(&mut self) -> Result<(), LoggerError> {
        (**self).flush()
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// A logger that drops every value.
pub struct NoopLogger;

impl ScalarLogger for NoopLogger {
    fn add_scalar(&mut self, _name: &str, _value: f64, _step: u64) -> Result<(), LoggerError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LoggerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
/// A logger that keeps every series in memory.
pub struct InMemoryLogger {
    series: BTreeMap<String, Vec<(u64, f64)>>,
    pending: usize,
    flushes: usize,
}

impl InMemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the `(step, value)` pairs recorded for the series `name`.
    pub fn series(&self, name: &str) -> &[(u64, f64)] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Gets the names of all recorded series.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Gets the number of values recorded since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Gets the number of flushes.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ScalarLogger for InMemoryLogger {
    fn add_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<(), LoggerError> {
        self.series
            .entry(name.to_string())
            .or_default()
            .push((step, value));
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LoggerError> {
        self.pending = 0;
        self.flushes += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct ScalarRecord<'a> {
    name: &'a str,
    value: f64,
    step: u64,
}

/// A logger that appends one JSON object per value to a writer.
pub struct JsonLinesLogger<W: Write> {
    writer: BufWriter<W>,
}

impl JsonLinesLogger<File> {
    /// Creates (or truncates) the file at `path` and logs into it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LoggerError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonLinesLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, LoggerError> {
        self.writer
            .into_inner()
            .map_err(|err| LoggerError::Io(err.into_error()))
    }
}

impl<W: Write> ScalarLogger for JsonLinesLogger<W> {
    fn add_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<(), LoggerError> {
        serde_json::to_writer(&mut self.writer, &ScalarRecord { name, value, step })?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LoggerError> {
        self.writer.flush()?;
        Ok(())
    }
}
