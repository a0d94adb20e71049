//! Operator configuration.
//!
//! Every scheme is configured by a plain serde struct with defaults, so a
//! JSON file only needs to name the fields it changes.

use crate::module::{LoopLimits, ModuleKind, RecursionLimits, StorageKind};
use crate::nucleus::Hierarchy;
use crate::operator::alteration::AlterationConfig;
use crate::operator::crossover::CrossoverConfig;
use crate::operator::mutation::MutationConfig;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Failure to load or accept a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for this schema.
    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Size range of generated branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSize {
    /// Smallest target size.
    pub min: usize,
    /// Largest target size.
    pub max: usize,
}

impl Default for BranchSize {
    fn default() -> Self {
        Self { min: 1, max: 12 }
    }
}

/// Shapes of the modules architecture alteration creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureConfig {
    /// Kinds that may be created.
    pub kinds: Vec<ModuleKind>,
    /// Modules created by the initializer.
    pub initial_modules: usize,
    /// Maximum modules per kind.
    pub max_modules: usize,
    /// Maximum arguments per module.
    pub max_arguments: usize,
    /// Types new arguments are drawn from.
    pub argument_types: Vec<ValueType>,
    /// Types new modules return.
    pub return_types: Vec<ValueType>,
    /// Target size of generated branches.
    pub branch_size: BranchSize,
    /// Budgets of new recursions.
    pub recursion: RecursionLimits,
    /// Budgets of new loops.
    pub looping: LoopLimits,
    /// Call budget of new iterators.
    pub iterator_max_calls: usize,
    /// Field types of the records of each collection, by collection id.
    /// Iterators are only created for collections listed here.
    pub collections: Vec<Vec<ValueType>>,
    /// Storage kinds new cells use.
    pub storage_kinds: Vec<StorageKind>,
    /// Capacity of new storage cells.
    pub storage_size: usize,
    /// Probability of picking a call over a primitive while growing a tree,
    /// when both fit.
    pub call_insertion_rate: f64,
    /// Visibility rules of new genomes.
    pub hierarchy: Hierarchy,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            kinds: ModuleKind::ALTERABLE.to_vec(),
            initial_modules: 2,
            max_modules: 4,
            max_arguments: 3,
            argument_types: vec![ValueType::Real],
            return_types: vec![ValueType::Real],
            branch_size: BranchSize::default(),
            recursion: RecursionLimits::default(),
            looping: LoopLimits::default(),
            iterator_max_calls: 8,
            collections: Vec::new(),
            storage_kinds: StorageKind::ALL.to_vec(),
            storage_size: 8,
            call_insertion_rate: 0.2,
            hierarchy: Hierarchy::default(),
        }
    }
}

/// Configuration of a genetic operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Crossover scheme.
    pub crossover: CrossoverConfig,
    /// Mutation scheme.
    pub mutation: MutationConfig,
    /// Architecture alteration scheme.
    pub alteration: AlterationConfig,
    /// Shapes of created modules.
    pub architecture: ArchitectureConfig,
    /// Limits on every branch produced by an operator.
    pub limits: BranchLimits,
}

/// Hard limits on branches produced by crossover, mutation and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchLimits {
    /// Maximum node count.
    pub max_size: usize,
    /// Maximum depth.
    pub max_depth: usize,
}

impl Default for BranchLimits {
    fn default() -> Self {
        Self {
            max_size: 64,
            max_depth: 12,
        }
    }
}

impl OperatorConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("crossover frequency", self.crossover.plan.frequency()),
            ("mutation frequency", self.mutation.plan.frequency()),
            ("alteration frequency", self.alteration.plan.frequency()),
            ("call insertion rate", Some(self.architecture.call_insertion_rate)),
        ];
        for (name, p) in probabilities.into_iter().filter_map(|(name, p)| p.map(|p| (name, p))) {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} {p} is not a probability")));
            }
        }
        if self.limits.max_size == 0 || self.limits.max_depth == 0 {
            return Err(ConfigError::Invalid("branch limits must be positive".into()));
        }
        let size = self.architecture.branch_size;
        if size.min == 0 || size.min > size.max {
            return Err(ConfigError::Invalid(format!(
                "branch size range {}..={} is empty",
                size.min, size.max
            )));
        }
        if self.architecture.argument_types.is_empty() || self.architecture.return_types.is_empty() {
            return Err(ConfigError::Invalid("argument and return types must not be empty".into()));
        }
        if self.architecture.kinds.contains(&ModuleKind::Program) {
            return Err(ConfigError::Invalid("programs cannot be created by alteration".into()));
        }
        Ok(())
    }
}
