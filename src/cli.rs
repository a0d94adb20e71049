//! CLI command implementations for cellgp.

pub(crate) mod inspect;
pub(crate) mod stress;

mod output;

use cellgp::config::{ConfigError, OperatorConfig};
use cellgp::value::{Value, ValueType};
use cellgp::{GenomeError, GeneticOperator, PrimitiveSet};
use clap::ValueEnum;
use rand::{Rng, RngCore};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<GenomeError> for CliError {
    fn from(e: GenomeError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// The configuration at `path`, or the defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<OperatorConfig, CliError> {
    match path {
        Some(path) => OperatorConfig::load(path)
            .map_err(|e| CliError::new(format!("Failed to load {}: {e}", path.display()))),
        None => Ok(OperatorConfig::default()),
    }
}

/// An operator over the standard primitives.
pub(crate) fn operator(config: OperatorConfig) -> Result<Arc<GeneticOperator>, CliError> {
    Ok(Arc::new(GeneticOperator::new(PrimitiveSet::standard(), config)?))
}

/// Random collections matching the configured record shapes, up to
/// `max_len` records each.
pub(crate) fn random_collections(
    shapes: &[Vec<ValueType>],
    max_len: usize,
    rng: &mut dyn RngCore,
) -> Vec<Vec<Vec<Value>>> {
    shapes
        .iter()
        .map(|fields| {
            let len = rng.gen_range(0..=max_len);
            (0..len)
                .map(|_| fields.iter().map(|t| Value::random(*t, rng)).collect())
                .collect()
        })
        .collect()
}

/// Seed from the clock when none is given.
pub(crate) fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(42)
    })
}
