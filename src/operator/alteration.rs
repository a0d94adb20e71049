//! Architecture-altering operations.
//!
//! These change the set of modules and their argument lists while keeping
//! every call consistent. Each alteration works on a copy of the genome and
//! is committed only if it succeeds, the copy consolidates and every branch
//! stays within the limits.

use super::crossover::sort_sites;
use super::{GeneticOperator, choose_type, kinds_with_room, select_branch};
use crate::config::BranchLimits;
use crate::error::{GenomeError, GenomeResult};
use crate::module::{
    Argument, Behavior, Branch, BranchRole, IteratorSpec, Module, ModuleKey, ModuleKind, StorageKind, StorageSpec,
    required_type,
};
use crate::node::{Access, Call, Node, Signature};
use crate::nucleus::{Nucleus, Site};
use crate::tree::{NodeId, Tree};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Kinds whose modules take arguments.
const INVOKABLE: [ModuleKind; 4] = [
    ModuleKind::Function,
    ModuleKind::Recursion,
    ModuleKind::Loop,
    ModuleKind::Iterator,
];

/// How often alterations are attempted per breeding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlterationPlan {
    /// Never.
    None,
    /// Once with this probability.
    Frequency(f64),
    /// Repeatedly while a draw with this probability succeeds, at most
    /// `max_rounds` times.
    Looping {
        /// Probability of each further round.
        frequency: f64,
        /// Upper bound on rounds.
        max_rounds: usize,
    },
}

impl AlterationPlan {
    /// The per-round probability, if any.
    #[must_use]
    pub fn frequency(&self) -> Option<f64> {
        match self {
            AlterationPlan::None => None,
            AlterationPlan::Frequency(p) | AlterationPlan::Looping { frequency: p, .. } => Some(*p),
        }
    }

    fn rounds(self, rng: &mut dyn RngCore) -> usize {
        match self {
            AlterationPlan::None => 0,
            AlterationPlan::Frequency(p) => usize::from(rng.gen_bool(p)),
            AlterationPlan::Looping { frequency, max_rounds } => {
                let mut rounds = 0;
                while rounds < max_rounds && rng.gen_bool(frequency) {
                    rounds += 1;
                }
                rounds
            }
        }
    }
}

/// Alteration scheme and the weight of each operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlterationConfig {
    /// How often to alter.
    pub plan: AlterationPlan,
    /// Weight of creating a module.
    pub create_module: f64,
    /// Weight of duplicating a module.
    pub duplicate_module: f64,
    /// Weight of deleting a module.
    pub delete_module: f64,
    /// Weight of creating an argument.
    pub create_argument: f64,
    /// Weight of duplicating an argument.
    pub duplicate_argument: f64,
    /// Weight of deleting an argument.
    pub delete_argument: f64,
}

impl Default for AlterationConfig {
    fn default() -> Self {
        Self {
            plan: AlterationPlan::Frequency(0.1),
            create_module: 1.0,
            duplicate_module: 0.5,
            delete_module: 0.5,
            create_argument: 0.5,
            duplicate_argument: 0.25,
            delete_argument: 0.5,
        }
    }
}

/// One architecture-altering operation.
pub trait ArchitectureOperator: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Alter `nucleus` in place. Returns `Ok(false)` when the operation does
    /// not apply, for example when there is nothing to delete.
    ///
    /// # Errors
    ///
    /// An error means the nucleus may be half-altered and must be discarded.
    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool>;
}

/// Apply the configured number of alteration rounds.
pub(crate) fn alter(operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> usize {
    let rounds = operator.config().alteration.plan.rounds(rng);
    (0..rounds)
        .filter(|_| apply_once(operator, operator.architecture_operator(), nucleus, rng))
        .count()
}

/// Try one alteration on a copy and commit it if it yields a valid genome.
pub(crate) fn apply_once(
    operator: &GeneticOperator,
    alteration: &dyn ArchitectureOperator,
    nucleus: &mut Nucleus,
    rng: &mut dyn RngCore,
) -> bool {
    let mut candidate = nucleus.clone();
    match alteration.alter(operator, &mut candidate, rng) {
        Ok(true) => {}
        Ok(false) => return false,
        Err(err) => {
            debug!(operation = alteration.name(), %err, "alteration not applicable");
            return false;
        }
    }
    if let Err(err) = candidate.consolidate() {
        warn!(operation = alteration.name(), %err, "alteration produced an invalid genome");
        return false;
    }
    if !within_limits(&candidate, operator.config().limits) {
        debug!(operation = alteration.name(), "alteration exceeds branch limits");
        return false;
    }
    debug!(operation = alteration.name(), size = candidate.total_size(), "architecture altered");
    *nucleus = candidate;
    true
}

fn within_limits(nucleus: &Nucleus, limits: BranchLimits) -> bool {
    nucleus
        .all_modules()
        .flat_map(Module::branches)
        .all(|b| b.size() <= limits.max_size && b.depth() <= limits.max_depth)
}

fn missing(key: ModuleKey) -> GenomeError {
    GenomeError::NoSuchModule(key)
}

/// First `xN` name not used by `args`.
fn fresh_name(args: &[Argument]) -> String {
    (0..)
        .map(|n| format!("x{n}"))
        .find(|name| args.iter().all(|a| a.name != *name))
        .unwrap_or_default()
}

fn invokable_modules(nucleus: &Nucleus, accept: impl Fn(&Module) -> bool) -> Vec<ModuleKey> {
    INVOKABLE
        .iter()
        .flat_map(|k| nucleus.modules(*k))
        .filter(|m| accept(m))
        .map(Module::key)
        .collect()
}

/// Creates a random module of a kind with room left and calls it from a
/// random branch that may see it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateModule;

impl ArchitectureOperator for CreateModule {
    fn name(&self) -> &str {
        "create-module"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let arch = &operator.config().architecture;
        let kinds: Vec<ModuleKind> = kinds_with_room(nucleus, &arch.kinds, arch.max_modules)
            .into_iter()
            .filter(|k| *k != ModuleKind::Iterator || !arch.collections.is_empty())
            .collect();
        let Some(kind) = kinds.choose(rng).copied() else {
            return Ok(false);
        };
        let module = random_module(operator, nucleus, kind, rng)?;
        let key = nucleus.push_module(module);
        insert_call(operator, nucleus, key, rng)?;
        Ok(true)
    }
}

/// A random module of `kind` that would get the next id of its kind.
///
/// # Errors
///
/// Fails if a branch of the required type cannot be generated.
pub fn random_module(
    operator: &GeneticOperator,
    nucleus: &Nucleus,
    kind: ModuleKind,
    rng: &mut dyn RngCore,
) -> GenomeResult<Module> {
    let arch = &operator.config().architecture;
    let id = nucleus.modules(kind).len();
    let key = ModuleKey::new(kind, id);
    let return_type = choose_type(&arch.return_types, rng)?;
    let behavior = match kind {
        ModuleKind::Storage => {
            let spec = StorageSpec {
                kind: arch.storage_kinds.choose(rng).copied().unwrap_or(StorageKind::Variable),
                max_size: arch.storage_size,
            };
            return Ok(Module::storage(id, return_type, spec));
        }
        ModuleKind::Program => return Err(missing(key)),
        ModuleKind::Function => Behavior::Function,
        ModuleKind::Recursion => Behavior::Recursion(arch.recursion),
        ModuleKind::Loop => Behavior::Loop(arch.looping),
        ModuleKind::Iterator => {
            let collection = (!arch.collections.is_empty())
                .then(|| rng.gen_range(0..arch.collections.len()))
                .ok_or_else(|| missing(key))?;
            Behavior::Iterator(IteratorSpec {
                collection,
                fields: arch.collections[collection].clone(),
                max_calls: arch.iterator_max_calls,
            })
        }
    };
    let arity = rng.gen_range(0..=arch.max_arguments);
    let arg_types = (0..arity)
        .map(|_| choose_type(&arch.argument_types, rng))
        .collect::<GenomeResult<Vec<_>>>()?;
    let frame = behavior.frame_types(&arg_types, return_type);
    let nodes = operator.node_set_with_frame(nucleus, key, frame);
    // The ground branch ends a recursion, so only the other roles see the
    // module's own call.
    let recursive = (kind == ModuleKind::Recursion).then(|| {
        let own = Call::new(key, Access::Invoke, Signature::new(return_type, arg_types.clone()));
        nodes.clone().with_call(own)
    });
    let trees = behavior
        .roles()
        .iter()
        .map(|role| {
            let size = operator.branch_size(rng);
            let nodes = match &recursive {
                Some(recursive) if *role != BranchRole::Ground => recursive,
                _ => &nodes,
            };
            operator.generate(nodes, required_type(*role, return_type), size, rng)
        })
        .collect::<GenomeResult<Vec<_>>>()?;
    Module::from_parts(id, return_type, Argument::numbered(&arg_types), behavior, trees)
}

/// Replace a random subtree of a branch that may see `callee` with a call to
/// it. Does nothing if no branch has a subtree of the right type.
fn insert_call(operator: &GeneticOperator, nucleus: &mut Nucleus, callee: ModuleKey, rng: &mut dyn RngCore) -> GenomeResult<()> {
    let target = nucleus.module(callee).ok_or_else(|| missing(callee))?;
    let Some(call) = target.accesses().choose(rng).and_then(|a| target.call(*a)) else {
        return Ok(());
    };
    let callers: Vec<ModuleKey> = nucleus
        .all_modules()
        .filter(|m| m.key() != callee && !m.branches().is_empty() && nucleus.may_call(m.key(), callee))
        .map(Module::key)
        .collect();
    let Some(caller) = callers.choose(rng).copied() else {
        return Ok(());
    };
    let module = nucleus.module(caller).ok_or_else(|| missing(caller))?;
    let Some(branch) = select_branch(module, false, rng) else {
        return Ok(());
    };
    let tree = module.branch(branch).map(Branch::tree).ok_or_else(|| missing(caller))?;
    let sites: Vec<NodeId> = tree
        .ids()
        .filter(|id| tree.node(*id).return_type() == call.signature.return_type)
        .collect();
    let Some(site) = sites.choose(rng).copied() else {
        return Ok(());
    };
    let nodes = operator.node_set(nucleus, caller);
    let children = call
        .signature
        .arg_types
        .iter()
        .map(|t| {
            let size = rng.gen_range(1..=3);
            operator.generate(&nodes, *t, size, rng)
        })
        .collect::<GenomeResult<Vec<_>>>()?;
    let subtree = Tree::compose(Node::Call(call), children)?;
    nucleus
        .module_mut(caller)
        .ok_or_else(|| missing(caller))?
        .edit_branch(branch, |t| t.replace(site, subtree))?;
    debug!(%caller, %callee, "call inserted");
    Ok(())
}

/// Copies a module and rebinds each existing call to the copy with
/// probability one half. Calls inside a copied recursion keep pointing at
/// the module they live in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateModule;

impl ArchitectureOperator for DuplicateModule {
    fn name(&self) -> &str {
        "duplicate-module"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let arch = &operator.config().architecture;
        let kinds = kinds_with_room(nucleus, &arch.kinds, arch.max_modules);
        let candidates: Vec<ModuleKey> = nucleus
            .all_modules()
            .filter(|m| kinds.contains(&m.kind()))
            .map(Module::key)
            .collect();
        let Some(key) = candidates.choose(rng).copied() else {
            return Ok(false);
        };
        let copy = nucleus.module(key).cloned().ok_or_else(|| missing(key))?;
        let duplicate = nucleus.push_module(copy);
        for site in nucleus.call_sites(key) {
            if site.module == duplicate || rng.gen_bool(0.5) {
                // Invisible rebinds keep the old binding.
                if let Err(err) = nucleus.rebind_call(site, duplicate) {
                    debug!(%err, "call kept");
                }
            }
        }
        Ok(true)
    }
}

/// Deletes a module. Calls to a function are replaced by its body with the
/// call's arguments substituted when that fits; other calls are replaced by
/// freshly generated subtrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteModule;

impl ArchitectureOperator for DeleteModule {
    fn name(&self) -> &str {
        "delete-module"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let candidates: Vec<ModuleKey> = nucleus
            .all_modules()
            .filter(|m| m.kind() != ModuleKind::Program)
            .map(Module::key)
            .collect();
        let Some(key) = candidates.choose(rng).copied() else {
            return Ok(false);
        };
        let mut sites: Vec<Site> = nucleus.call_sites(key).into_iter().filter(|s| s.module != key).collect();
        sort_sites(&mut sites);
        for site in sites {
            let replacement = match inline(operator, nucleus, key, site) {
                Some(tree) => tree,
                None => regenerate(operator, nucleus, key, site, rng)?,
            };
            nucleus
                .module_mut(site.module)
                .ok_or_else(|| missing(site.module))?
                .edit_branch(site.branch, |t| t.replace(site.node, replacement))?;
        }
        nucleus.remove_module(key)?;
        Ok(true)
    }
}

/// Body of function `key` with each argument read replaced by the matching
/// child of the call at `site`, if it resolves and fits in the caller.
fn inline(operator: &GeneticOperator, nucleus: &Nucleus, key: ModuleKey, site: Site) -> Option<Tree> {
    let callee = nucleus.module(key)?;
    if callee.kind() != ModuleKind::Function {
        return None;
    }
    let body = callee.branch(0)?.tree();
    let caller = nucleus.module(site.module)?;
    let tree = caller.branch(site.branch)?.tree();
    let children: Vec<Tree> = tree.children(site.node).iter().map(|c| tree.subtree(*c)).collect();
    let mut nodes = Vec::with_capacity(body.size());
    for node in body.nodes() {
        match node.as_argument() {
            Some(a) => nodes.extend(children.get(a.index)?.nodes().cloned()),
            None => nodes.push(node.clone()),
        }
    }
    let inlined = Tree::from_preorder(nodes).ok()?;
    let limits = operator.config().limits;
    let fits = tree.size() - tree.subtree_size(site.node) + inlined.size() <= limits.max_size
        && tree.level(site.node) + inlined.depth() <= limits.max_depth;
    let frame = caller.frame_types();
    let resolves = inlined
        .nodes()
        .all(|n| n.as_call().is_none_or(|c| c.key != key) && nucleus.check_node(site.module, &frame, n).is_ok());
    (fits && resolves).then_some(inlined)
}

fn regenerate(
    operator: &GeneticOperator,
    nucleus: &Nucleus,
    key: ModuleKey,
    site: Site,
    rng: &mut dyn RngCore,
) -> GenomeResult<Tree> {
    let tree = nucleus
        .module(site.module)
        .and_then(|m| m.branch(site.branch))
        .map(Branch::tree)
        .ok_or_else(|| missing(site.module))?;
    let node = tree.get(site.node).ok_or(GenomeError::NoSuchNode(site.node.index()))?;
    let nodes = operator.node_set(nucleus, site.module).without_module(key);
    operator.generate(&nodes, node.return_type(), tree.subtree_size(site.node), rng)
}

/// Adds an argument of a random type to a module; every call gets a freshly
/// generated child for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateArgument;

impl ArchitectureOperator for CreateArgument {
    fn name(&self) -> &str {
        "create-argument"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let arch = &operator.config().architecture;
        let candidates = invokable_modules(nucleus, |m| m.args().len() < arch.max_arguments);
        let Some(key) = candidates.choose(rng).copied() else {
            return Ok(false);
        };
        let t = choose_type(&arch.argument_types, rng)?;
        let mut sites = nucleus.call_sites(key);
        sort_sites(&mut sites);
        let mut children = Vec::with_capacity(sites.len());
        for site in &sites {
            let nodes = operator.node_set(nucleus, site.module).without_module(key);
            let size = rng.gen_range(1..=3);
            children.push(operator.generate(&nodes, t, size, rng)?);
        }
        let module = nucleus.module_mut(key).ok_or_else(|| missing(key))?;
        let name = fresh_name(module.args());
        let position = module.push_argument(Argument::new(name, t))?;
        let signature = module.signature(Access::Invoke).ok_or_else(|| missing(key))?;
        for (site, child) in sites.into_iter().zip(children) {
            nucleus
                .module_mut(site.module)
                .ok_or_else(|| missing(site.module))?
                .edit_branch(site.branch, |tree| tree.push_child(site.node, child, signature.clone()))?;
        }
        debug!(module = %key, position, "argument created");
        Ok(true)
    }
}

/// Copies an argument. Every call passes a copy of the original child for
/// it, and each read of the original switches to the copy with probability
/// one half.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateArgument;

impl ArchitectureOperator for DuplicateArgument {
    fn name(&self) -> &str {
        "duplicate-argument"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let max = operator.config().architecture.max_arguments;
        let candidates = invokable_modules(nucleus, |m| !m.args().is_empty() && m.args().len() < max);
        let Some(key) = candidates.choose(rng).copied() else {
            return Ok(false);
        };
        let mut sites = nucleus.call_sites(key);
        sort_sites(&mut sites);
        let module = nucleus.module_mut(key).ok_or_else(|| missing(key))?;
        let original = rng.gen_range(0..module.args().len());
        let copy = Argument::new(fresh_name(module.args()), module.args()[original].value_type);
        let position = module.push_argument(copy)?;
        for branch in 0..module.branches().len() {
            module.edit_branch(branch, |tree| {
                tree.edit_nodes(|node| {
                    if let Node::Argument(a) = node
                        && a.index == original
                        && rng.gen_bool(0.5)
                    {
                        a.index = position;
                    }
                })
            })?;
        }
        let signature = module.signature(Access::Invoke).ok_or_else(|| missing(key))?;
        for site in sites {
            nucleus
                .module_mut(site.module)
                .ok_or_else(|| missing(site.module))?
                .edit_branch(site.branch, |tree| {
                    let child = tree
                        .child(site.node, original)
                        .ok_or(GenomeError::NoSuchNode(site.node.index()))?;
                    let copy = tree.subtree(child);
                    tree.push_child(site.node, copy, signature.clone())
                })?;
        }
        debug!(module = %key, original, position, "argument duplicated");
        Ok(true)
    }
}

/// Removes an argument. Reads of it are replaced by generated subtrees and
/// every call drops the matching child.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteArgument;

impl ArchitectureOperator for DeleteArgument {
    fn name(&self) -> &str {
        "delete-argument"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let candidates = invokable_modules(nucleus, |m| !m.args().is_empty());
        let Some(key) = candidates.choose(rng).copied() else {
            return Ok(false);
        };
        let module = nucleus.module(key).ok_or_else(|| missing(key))?;
        let position = rng.gen_range(0..module.args().len());
        let nodes = operator.node_set(nucleus, key).without_argument(position).without_module(key);
        let mut plans: Vec<(usize, NodeId, Tree)> = Vec::new();
        for (b, branch) in module.branches().iter().enumerate() {
            let tree = branch.tree();
            for id in tree.ids() {
                if let Some(a) = tree.node(id).as_argument()
                    && a.index == position
                {
                    let size = rng.gen_range(1..=2);
                    plans.push((b, id, operator.generate(&nodes, a.value_type, size, rng)?));
                }
            }
        }
        let mut signature = module.signature(Access::Invoke).ok_or_else(|| missing(key))?;
        signature.arg_types.remove(position);

        // Later nodes first so earlier ids stay valid.
        plans.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        let module = nucleus.module_mut(key).ok_or_else(|| missing(key))?;
        for (branch, id, tree) in plans {
            module.edit_branch(branch, |t| t.replace(id, tree))?;
        }

        let mut sites = nucleus.call_sites(key);
        sort_sites(&mut sites);
        for site in sites {
            nucleus
                .module_mut(site.module)
                .ok_or_else(|| missing(site.module))?
                .edit_branch(site.branch, |tree| tree.remove_child(site.node, position, signature.clone()))?;
        }
        nucleus
            .module_mut(key)
            .ok_or_else(|| missing(key))?
            .remove_argument(position)?;
        debug!(module = %key, position, "argument deleted");
        Ok(true)
    }
}

/// Picks one of several architecture operators by weight.
#[derive(Debug, Default)]
pub struct WeightedArchitecture {
    choices: Vec<(f64, Box<dyn ArchitectureOperator>)>,
}

impl WeightedArchitecture {
    /// No alternatives; add them with [`WeightedArchitecture::with`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All six operations with the configured weights.
    #[must_use]
    pub fn from_config(config: &AlterationConfig) -> Self {
        Self::new()
            .with(config.create_module, CreateModule)
            .with(config.duplicate_module, DuplicateModule)
            .with(config.delete_module, DeleteModule)
            .with(config.create_argument, CreateArgument)
            .with(config.duplicate_argument, DuplicateArgument)
            .with(config.delete_argument, DeleteArgument)
    }

    /// Add an alternative.
    #[must_use]
    pub fn with(mut self, weight: f64, operation: impl ArchitectureOperator + 'static) -> Self {
        self.choices.push((weight, Box::new(operation)));
        self
    }
}

impl ArchitectureOperator for WeightedArchitecture {
    fn name(&self) -> &str {
        "weighted"
    }

    fn alter(&self, operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> GenomeResult<bool> {
        let Ok(weights) = WeightedIndex::new(self.choices.iter().map(|(w, _)| *w)) else {
            return Ok(false);
        };
        let (_, operation) = &self.choices[weights.sample(rng)];
        debug!(operation = operation.name(), "altering architecture");
        operation.alter(operator, nucleus, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::config::OperatorConfig;
    use crate::node::{Constant, PrimitiveSet, Sum};
    use crate::value::{Value, ValueType};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn operator() -> Arc<GeneticOperator> {
        Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap())
    }

    fn real(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    fn arg(i: usize) -> Tree {
        Tree::leaf(Node::argument(i, ValueType::Real)).unwrap()
    }

    fn f0() -> ModuleKey {
        ModuleKey::new(ModuleKind::Function, 0)
    }

    /// RPB0(x) = ADF0(x, 3) with ADF0(a, b) = a + b.
    fn adder(op: &Arc<GeneticOperator>) -> Nucleus {
        let mut nucleus = Nucleus::new(Arc::clone(op));
        let body = Tree::compose(Node::primitive(Sum), vec![arg(0), arg(1)]).unwrap();
        let f = Module::function(0, Argument::numbered(&[ValueType::Real; 2]), body).unwrap();
        let key = nucleus.push_module(f);
        let call = nucleus.module(key).unwrap().call(Access::Invoke).unwrap();
        let main = Tree::compose(call.into(), vec![arg(0), real(3.0)]).unwrap();
        nucleus.push_module(Module::program(0, Argument::numbered(&[ValueType::Real]), main).unwrap());
        nucleus.consolidate().unwrap();
        nucleus
    }

    fn run(nucleus: &Nucleus, x: f64) -> Value {
        Cell::new(nucleus.clone()).execute(0, &[Value::Real(x)], &[]).unwrap().value
    }

    #[test]
    fn test_delete_module_inlines_function() {
        let mut rng = SmallRng::seed_from_u64(41);
        let op = operator();
        let mut nucleus = adder(&op);
        assert!(DeleteModule.alter(&op, &mut nucleus, &mut rng).unwrap());
        nucleus.consolidate().unwrap();
        assert!(nucleus.modules(ModuleKind::Function).is_empty());
        assert_eq!(nucleus.program(0).unwrap().branch(0).unwrap().tree().to_string(), "(Sum ARG0 3)");
        assert_eq!(run(&nucleus, 2.0), Value::Real(5.0));
    }

    #[test]
    fn test_create_argument_extends_calls() {
        let mut rng = SmallRng::seed_from_u64(42);
        let op = operator();
        let mut nucleus = adder(&op);
        assert!(CreateArgument.alter(&op, &mut nucleus, &mut rng).unwrap());
        nucleus.consolidate().unwrap();
        let f = nucleus.module(f0()).unwrap();
        assert_eq!(f.args().len(), 3);
        assert_eq!(f.args()[2].name, "x2");
        let main = nucleus.program(0).unwrap().branch(0).unwrap().tree();
        assert_eq!(main.children(NodeId::ROOT).len(), 3);
        // The new argument is not read yet.
        assert_eq!(run(&nucleus, 2.0), Value::Real(5.0));
    }

    #[test]
    fn test_duplicate_argument_preserves_behavior() {
        let op = operator();
        for seed in 0..10 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut nucleus = adder(&op);
            assert!(DuplicateArgument.alter(&op, &mut nucleus, &mut rng).unwrap());
            nucleus.consolidate().unwrap();
            assert_eq!(nucleus.module(f0()).unwrap().args().len(), 3);
            assert_eq!(run(&nucleus, 2.0), Value::Real(5.0));
        }
    }

    #[test]
    fn test_delete_argument_shrinks_calls() {
        let mut rng = SmallRng::seed_from_u64(44);
        let op = operator();
        let mut nucleus = adder(&op);
        assert!(DeleteArgument.alter(&op, &mut nucleus, &mut rng).unwrap());
        nucleus.consolidate().unwrap();
        assert_eq!(nucleus.module(f0()).unwrap().args().len(), 1);
        let main = nucleus.program(0).unwrap().branch(0).unwrap().tree();
        assert_eq!(main.children(NodeId::ROOT).len(), 1);
    }

    #[test]
    fn test_duplicate_module_keeps_calls_valid() {
        let op = operator();
        for seed in 0..10 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut nucleus = adder(&op);
            assert!(DuplicateModule.alter(&op, &mut nucleus, &mut rng).unwrap());
            nucleus.consolidate().unwrap();
            assert_eq!(nucleus.modules(ModuleKind::Function).len(), 2);
            assert_eq!(run(&nucleus, 2.0), Value::Real(5.0));
        }
    }

    #[test]
    fn test_create_module_respects_max_modules() {
        let mut rng = SmallRng::seed_from_u64(46);
        let mut config = OperatorConfig::default();
        config.architecture.kinds = vec![ModuleKind::Function];
        config.architecture.max_modules = 2;
        let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), config).unwrap());
        let mut nucleus = adder(&op);
        for _ in 0..5 {
            apply_once(&op, &CreateModule, &mut nucleus, &mut rng);
        }
        assert_eq!(nucleus.modules(ModuleKind::Function).len(), 2);
        nucleus.validate().unwrap();
    }

    #[test]
    fn test_random_alterations_keep_genomes_valid() {
        let mut rng = SmallRng::seed_from_u64(47);
        let op = operator();
        let weighted = WeightedArchitecture::from_config(&op.config().alteration);
        let mut nucleus = adder(&op);
        let mut applied = 0;
        for _ in 0..200 {
            if apply_once(&op, &weighted, &mut nucleus, &mut rng) {
                applied += 1;
            }
            nucleus.validate().unwrap();
            Cell::new(nucleus.clone())
                .execute(0, &[Value::Real(1.0)], &[])
                .unwrap();
        }
        assert!(applied > 0);
    }

    #[test]
    fn test_recursion_ground_never_calls_itself() {
        let mut rng = SmallRng::seed_from_u64(49);
        let op = operator();
        let nucleus = adder(&op);
        for _ in 0..100 {
            let module = random_module(&op, &nucleus, ModuleKind::Recursion, &mut rng).unwrap();
            let ground = module.branches()[2].tree();
            assert!(ground.nodes().all(|n| n.as_call().is_none_or(|c| c.key != module.key())));
        }
    }

    #[test]
    fn test_looping_plan_rounds_are_bounded() {
        let mut rng = SmallRng::seed_from_u64(48);
        let plan = AlterationPlan::Looping {
            frequency: 1.0,
            max_rounds: 3,
        };
        assert_eq!(plan.rounds(&mut rng), 3);
        assert_eq!(AlterationPlan::None.rounds(&mut rng), 0);
        assert_eq!(AlterationPlan::Frequency(1.0).rounds(&mut rng), 1);
    }
}
