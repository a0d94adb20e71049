//! Genetic operators over whole genomes.
//!
//! A [`GeneticOperator`] owns the primitive set and the configuration of
//! every variation scheme. Each [`Nucleus`] keeps a shared handle to the
//! operator it was built with, so repair and breeding always use the same
//! node pool as initialization did.

pub mod alteration;
pub mod crossover;
pub mod generate;
pub mod mutation;

pub use alteration::{AlterationConfig, AlterationPlan, ArchitectureOperator};
pub use crossover::{CrossoverConfig, CrossoverPlan, NodeSelection};
pub use generate::NodeSet;
pub use mutation::{MutationConfig, MutationPlan, PointMutator};

use crate::config::{ConfigError, OperatorConfig};
use crate::error::{GenomeError, GenomeResult};
use crate::module::{Argument, Module, ModuleKey, ModuleKind};
use crate::node::PrimitiveSet;
use crate::nucleus::Nucleus;
use crate::tree::Tree;
use crate::value::ValueType;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::sync::Arc;
use tracing::debug;

/// Shape of a main program created by [`GeneticOperator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramShape {
    /// Argument types.
    pub args: Vec<ValueType>,
    /// Type of the result.
    pub return_type: ValueType,
}

impl ProgramShape {
    /// A program taking `args` and returning `return_type`.
    #[must_use]
    pub fn new(args: Vec<ValueType>, return_type: ValueType) -> Self {
        Self { args, return_type }
    }
}

/// Primitive set plus every variation scheme.
#[derive(Debug)]
pub struct GeneticOperator {
    primitives: PrimitiveSet,
    config: OperatorConfig,
    mutator: Box<dyn PointMutator>,
    architecture: Box<dyn ArchitectureOperator>,
}

impl GeneticOperator {
    /// An operator using the default point mutators and architecture
    /// operators, weighted as configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails
    /// [`OperatorConfig::validate`].
    pub fn new(primitives: PrimitiveSet, config: OperatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mutator = Box::new(mutation::WeightedMutator::from_config(&config.mutation));
        let architecture = Box::new(alteration::WeightedArchitecture::from_config(&config.alteration));
        Ok(Self {
            primitives,
            config,
            mutator,
            architecture,
        })
    }

    /// Replace the point mutator.
    #[must_use]
    pub fn with_point_mutator(mut self, mutator: impl PointMutator + 'static) -> Self {
        self.mutator = Box::new(mutator);
        self
    }

    /// Replace the architecture operator.
    #[must_use]
    pub fn with_architecture_operator(mut self, operator: impl ArchitectureOperator + 'static) -> Self {
        self.architecture = Box::new(operator);
        self
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Primitives available to every branch.
    #[must_use]
    pub fn primitives(&self) -> &PrimitiveSet {
        &self.primitives
    }

    /// Point mutator used by [`GeneticOperator::mutate`].
    #[must_use]
    pub fn point_mutator(&self) -> &dyn PointMutator {
        self.mutator.as_ref()
    }

    /// Architecture operator used by [`GeneticOperator::alter`].
    #[must_use]
    pub fn architecture_operator(&self) -> &dyn ArchitectureOperator {
        self.architecture.as_ref()
    }

    /// Nodes available in the branches of `caller`. A module not in the
    /// nucleus gets an empty frame.
    #[must_use]
    pub fn node_set(&self, nucleus: &Nucleus, caller: ModuleKey) -> NodeSet {
        let frame = nucleus.module(caller).map(Module::frame_types).unwrap_or_default();
        self.node_set_with_frame(nucleus, caller, frame)
    }

    /// Nodes available in a branch of `caller` with an explicit frame.
    #[must_use]
    pub fn node_set_with_frame(&self, nucleus: &Nucleus, caller: ModuleKey, frame: Vec<ValueType>) -> NodeSet {
        NodeSet::new(
            &self.primitives,
            nucleus,
            caller,
            frame,
            self.config.architecture.call_insertion_rate,
        )
    }

    /// Grow a tree of type `t` of about `size` nodes within the branch
    /// limits.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::GenerationFailed`] if `nodes` cannot build a
    /// tree of type `t`.
    pub fn generate(&self, nodes: &NodeSet, t: ValueType, size: usize, rng: &mut dyn RngCore) -> GenomeResult<Tree> {
        let limits = self.config.limits;
        nodes.grow(t, size.min(limits.max_size), limits.max_depth, rng)
    }

    /// A random size from the configured branch size range.
    pub fn branch_size(&self, rng: &mut dyn RngCore) -> usize {
        let range = self.config.architecture.branch_size;
        rng.gen_range(range.min..=range.max.max(range.min))
    }

    /// Child of `a` with subtrees swapped in from `b`.
    #[must_use]
    pub fn crossover(&self, a: &Nucleus, b: &Nucleus, rng: &mut dyn RngCore) -> Nucleus {
        crossover::crossover(self, a, b, rng)
    }

    /// Point-mutate `nucleus` in place. Returns the number of nodes changed.
    pub fn mutate(&self, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> usize {
        mutation::mutate(self, nucleus, rng)
    }

    /// Apply architecture alterations. Returns the number applied.
    pub fn alter(&self, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> usize {
        alteration::alter(self, nucleus, rng)
    }

    /// Crossover, mutation and alteration in sequence, followed by
    /// consolidation.
    ///
    /// # Errors
    ///
    /// Fails only if the child does not consolidate, which means an operator
    /// produced a corrupt genome.
    pub fn breed(&self, a: &Nucleus, b: &Nucleus, rng: &mut dyn RngCore) -> GenomeResult<Nucleus> {
        let mut child = self.crossover(a, b, rng);
        let mutated = self.mutate(&mut child, rng);
        let altered = self.alter(&mut child, rng);
        child.consolidate()?;
        debug!(mutated, altered, size = child.total_size(), "bred");
        Ok(child)
    }

    /// A random genome with one main program per shape, followed by the
    /// configured number of module creations.
    ///
    /// # Errors
    ///
    /// Fails if a program body of the requested type cannot be generated.
    pub fn initialize(self: &Arc<Self>, programs: &[ProgramShape], rng: &mut dyn RngCore) -> GenomeResult<Nucleus> {
        let mut nucleus = Nucleus::new(Arc::clone(self));
        for (id, shape) in programs.iter().enumerate() {
            let key = ModuleKey::new(ModuleKind::Program, id);
            let nodes = self.node_set_with_frame(&nucleus, key, shape.args.clone());
            let size = self.branch_size(rng);
            let body = self.generate(&nodes, shape.return_type, size, rng)?;
            nucleus.push_module(Module::program(id, Argument::numbered(&shape.args), body)?);
        }
        let create = alteration::CreateModule;
        for _ in 0..self.config.architecture.initial_modules {
            alteration::apply_once(self, &create, &mut nucleus, rng);
        }
        nucleus.consolidate()?;
        Ok(nucleus)
    }
}

/// A module with at least one branch, chosen uniformly or in proportion to
/// its size.
pub fn select_module(nucleus: &Nucleus, size_weighted: bool, rng: &mut dyn RngCore) -> Option<ModuleKey> {
    let candidates: Vec<(ModuleKey, usize)> = nucleus
        .all_modules()
        .filter(|m| !m.branches().is_empty())
        .map(|m| (m.key(), m.size()))
        .collect();
    if size_weighted {
        let weights = WeightedIndex::new(candidates.iter().map(|(_, s)| *s)).ok()?;
        Some(candidates[weights.sample(rng)].0)
    } else {
        candidates.choose(rng).map(|(k, _)| *k)
    }
}

/// A branch of `module`, chosen uniformly or in proportion to its size.
pub fn select_branch(module: &Module, size_weighted: bool, rng: &mut dyn RngCore) -> Option<usize> {
    let branches = module.branches();
    if branches.is_empty() {
        return None;
    }
    if size_weighted {
        let weights = WeightedIndex::new(branches.iter().map(crate::module::Branch::size)).ok()?;
        Some(weights.sample(rng))
    } else {
        Some(rng.gen_range(0..branches.len()))
    }
}

/// Modules of `kinds` the nucleus still has room for under `max_modules`.
pub(crate) fn kinds_with_room(nucleus: &Nucleus, kinds: &[ModuleKind], max_modules: usize) -> Vec<ModuleKind> {
    kinds
        .iter()
        .copied()
        .filter(|k| *k != ModuleKind::Program && nucleus.modules(*k).len() < max_modules)
        .collect()
}

/// Pick from a non-empty list of types.
pub(crate) fn choose_type(types: &[ValueType], rng: &mut dyn RngCore) -> GenomeResult<ValueType> {
    types
        .choose(rng)
        .copied()
        .ok_or(GenomeError::GenerationFailed(ValueType::Real))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::value::Value;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn operator() -> Arc<GeneticOperator> {
        Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap())
    }

    fn shapes() -> Vec<ProgramShape> {
        vec![ProgramShape::new(vec![ValueType::Real], ValueType::Real)]
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = OperatorConfig::default();
        config.architecture.call_insertion_rate = 1.5;
        let err = GeneticOperator::new(PrimitiveSet::arithmetic(), config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_initialize_produces_valid_genomes() {
        let mut rng = SmallRng::seed_from_u64(11);
        let op = operator();
        for _ in 0..20 {
            let nucleus = op.initialize(&shapes(), &mut rng).unwrap();
            nucleus.validate().unwrap();
            assert_eq!(nucleus.programs().len(), 1);
            let mut cell = Cell::new(nucleus);
            let outcome = cell.execute(0, &[Value::Real(1.5)], &[]).unwrap();
            assert_eq!(outcome.value.value_type(), ValueType::Real);
        }
    }

    #[test]
    fn test_breed_keeps_genomes_valid() {
        let mut rng = SmallRng::seed_from_u64(12);
        let op = operator();
        let mut population: Vec<Nucleus> = (0..6).map(|_| op.initialize(&shapes(), &mut rng).unwrap()).collect();
        for generation in 0..10 {
            let a = &population[generation % population.len()];
            let b = &population[(generation + 1) % population.len()];
            let child = op.breed(a, b, &mut rng).unwrap();
            child.validate().unwrap();
            let limits = op.config().limits;
            for module in child.all_modules() {
                for branch in module.branches() {
                    assert!(branch.size() <= limits.max_size);
                    assert!(branch.depth() <= limits.max_depth);
                }
            }
            population.push(child);
        }
    }

    #[test]
    fn test_select_branch_weighted() {
        let mut rng = SmallRng::seed_from_u64(13);
        let op = operator();
        let nucleus = op.initialize(&shapes(), &mut rng).unwrap();
        let key = select_module(&nucleus, true, &mut rng).unwrap();
        let module = nucleus.module(key).unwrap();
        let branch = select_branch(module, true, &mut rng).unwrap();
        assert!(branch < module.branches().len());
        assert!(select_module(&Nucleus::new(op), false, &mut rng).is_none());
    }
}
