//! Point mutation.
//!
//! Mutation sites are chosen per branch, either a fixed number of points or
//! every node with a fixed probability. A [`PointMutator`] proposes a
//! replacement for each site; the proposal is applied only if it keeps the
//! branch within its limits.

use super::GeneticOperator;
use super::generate::NodeSet;
use crate::config::BranchLimits;
use crate::error::GenomeResult;
use crate::module::{Branch, Module, ModuleKey};
use crate::node::{Constant, Node};
use crate::nucleus::Nucleus;
use crate::runtime::evaluate_detached;
use crate::tree::{NodeId, Tree};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// How mutation sites are chosen within each branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MutationPlan {
    /// No mutation.
    None,
    /// This many distinct nodes per branch, or every node of a smaller
    /// branch.
    Points(usize),
    /// Every node with this probability.
    Frequency(f64),
}

impl MutationPlan {
    /// The per-node probability, for frequency plans.
    #[must_use]
    pub fn frequency(&self) -> Option<f64> {
        match self {
            MutationPlan::Frequency(p) => Some(*p),
            _ => None,
        }
    }

    fn sites(self, size: usize, rng: &mut dyn RngCore) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = match self {
            MutationPlan::None => Vec::new(),
            MutationPlan::Points(n) => rand::seq::index::sample(rng, size, n.min(size))
                .into_iter()
                .map(NodeId::new)
                .collect(),
            MutationPlan::Frequency(p) => (0..size).filter(|_| rng.gen_bool(p)).map(NodeId::new).collect(),
        };
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }
}

/// Size of the subtree the regenerating mutator grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegenerateSize {
    /// Uniform in `1..=2s` for a replaced subtree of `s` nodes.
    Relative,
    /// Always this size.
    Fixed(usize),
}

/// Mutation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Site selection.
    pub plan: MutationPlan,
    /// Weight of replacing a node by a variant with the same signature.
    pub delegate_weight: f64,
    /// Weight of regrowing the subtree at the site.
    pub regenerate_weight: f64,
    /// Weight of folding a constant subtree into a single constant.
    pub shrink_weight: f64,
    /// Size of regrown subtrees.
    pub regenerate_size: RegenerateSize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            plan: MutationPlan::Frequency(0.05),
            delegate_weight: 0.5,
            regenerate_weight: 0.4,
            shrink_weight: 0.1,
            regenerate_size: RegenerateSize::Relative,
        }
    }
}

/// A proposed change at one site.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// Swap the node, keeping its children.
    Node(Node),
    /// Swap the whole subtree.
    Subtree(Tree),
}

/// What a point mutator can see of the branch it mutates.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'c> {
    /// Nodes available in the branch.
    pub nodes: &'c NodeSet,
    /// Limits of the branch.
    pub limits: BranchLimits,
}

/// Proposes a replacement for one node.
pub trait PointMutator: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// A replacement for the node at `id` in `tree`, or `None` to leave it.
    fn propose(&self, ctx: &MutationContext<'_>, tree: &Tree, id: NodeId, rng: &mut dyn RngCore) -> Option<Replacement>;
}

/// Lets each node mutate itself: primitives with a mutable payload perturb
/// it, other nodes are swapped for a different node with the same
/// signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delegate;

impl PointMutator for Delegate {
    fn name(&self) -> &str {
        "delegate"
    }

    fn propose(&self, ctx: &MutationContext<'_>, tree: &Tree, id: NodeId, rng: &mut dyn RngCore) -> Option<Replacement> {
        let node = tree.get(id)?;
        if let Node::Primitive(p) = node
            && let Some(copy) = p.mutated_copy(rng)
        {
            return Some(Replacement::Node(Node::Primitive(copy)));
        }
        ctx.nodes.find_matching(node, rng).map(Replacement::Node)
    }
}

/// Regrows the subtree at the site.
#[derive(Debug, Clone, Copy)]
pub struct Regenerate {
    /// Size of the new subtree.
    pub size: RegenerateSize,
}

impl PointMutator for Regenerate {
    fn name(&self) -> &str {
        "regenerate"
    }

    fn propose(&self, ctx: &MutationContext<'_>, tree: &Tree, id: NodeId, rng: &mut dyn RngCore) -> Option<Replacement> {
        let t = tree.get(id)?.return_type();
        let size = match self.size {
            RegenerateSize::Relative => rng.gen_range(1..=2 * tree.subtree_size(id)),
            RegenerateSize::Fixed(n) => n.max(1),
        };
        let depth = ctx.limits.max_depth.saturating_sub(tree.level(id));
        ctx.nodes.grow(t, size, depth, rng).ok().map(Replacement::Subtree)
    }
}

/// Folds a subtree that reads no arguments and calls no modules into the
/// constant it evaluates to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shrink;

impl PointMutator for Shrink {
    fn name(&self) -> &str {
        "shrink"
    }

    fn propose(&self, _ctx: &MutationContext<'_>, tree: &Tree, id: NodeId, _rng: &mut dyn RngCore) -> Option<Replacement> {
        let closed = tree.subtree_ids(id).all(|i| matches!(tree.node(i), Node::Primitive(_)));
        if !closed {
            return None;
        }
        if let Node::Primitive(p) = tree.get(id)?
            && p.constant_value().is_some()
        {
            return None;
        }
        let outcome = evaluate_detached(&tree.subtree(id)).ok()?;
        Tree::leaf(Node::primitive(Constant::new(outcome.value)))
            .ok()
            .map(Replacement::Subtree)
    }
}

/// Picks one of several mutators by weight.
#[derive(Debug, Default)]
pub struct WeightedMutator {
    choices: Vec<(f64, Box<dyn PointMutator>)>,
}

impl WeightedMutator {
    /// No alternatives; add them with [`WeightedMutator::with`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate, regenerate and shrink with the configured weights.
    #[must_use]
    pub fn from_config(config: &MutationConfig) -> Self {
        Self::new()
            .with(config.delegate_weight, Delegate)
            .with(
                config.regenerate_weight,
                Regenerate {
                    size: config.regenerate_size,
                },
            )
            .with(config.shrink_weight, Shrink)
    }

    /// Add an alternative.
    #[must_use]
    pub fn with(mut self, weight: f64, mutator: impl PointMutator + 'static) -> Self {
        self.choices.push((weight, Box::new(mutator)));
        self
    }
}

impl PointMutator for WeightedMutator {
    fn name(&self) -> &str {
        "weighted"
    }

    fn propose(&self, ctx: &MutationContext<'_>, tree: &Tree, id: NodeId, rng: &mut dyn RngCore) -> Option<Replacement> {
        let weights = WeightedIndex::new(self.choices.iter().map(|(w, _)| *w)).ok()?;
        let (_, mutator) = &self.choices[weights.sample(rng)];
        trace!(mutator = mutator.name(), node = %id, "point mutation");
        mutator.propose(ctx, tree, id, rng)
    }
}

/// Mutate every branch of `nucleus` per the configured plan.
pub(crate) fn mutate(operator: &GeneticOperator, nucleus: &mut Nucleus, rng: &mut dyn RngCore) -> usize {
    let config = operator.config();
    let keys: Vec<ModuleKey> = nucleus
        .all_modules()
        .filter(|m| !m.branches().is_empty())
        .map(Module::key)
        .collect();
    let mut changed = 0;
    for key in keys {
        let nodes = operator.node_set(nucleus, key);
        let ctx = MutationContext {
            nodes: &nodes,
            limits: config.limits,
        };
        let Some(module) = nucleus.module_mut(key) else {
            continue;
        };
        for b in 0..module.branches().len() {
            let size = module.branch(b).map_or(0, Branch::size);
            for id in config.mutation.plan.sites(size, rng) {
                let applied = module.edit_branch(b, |tree| {
                    let Some(replacement) = operator.point_mutator().propose(&ctx, tree, id, rng) else {
                        return Ok(false);
                    };
                    apply(tree, id, replacement, config.limits)
                });
                match applied {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(err) => debug!(module = %key, branch = b, %err, "mutation rejected"),
                }
            }
        }
    }
    changed
}

fn apply(tree: &mut Tree, id: NodeId, replacement: Replacement, limits: BranchLimits) -> GenomeResult<bool> {
    match replacement {
        Replacement::Node(node) => {
            tree.replace_node(id, node)?;
        }
        Replacement::Subtree(subtree) => {
            let size = tree.size() - tree.subtree_size(id) + subtree.size();
            let depth = tree.level(id) + subtree.depth();
            if size > limits.max_size || depth > limits.max_depth {
                return Ok(false);
            }
            tree.replace(id, subtree)?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::module::{Argument, ModuleKind};
    use crate::node::{PrimitiveSet, Sum};
    use crate::value::{Value, ValueType};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn constant(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    fn arg(i: usize) -> Tree {
        Tree::leaf(Node::argument(i, ValueType::Real)).unwrap()
    }

    fn nodes() -> NodeSet {
        let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap());
        let nucleus = Nucleus::new(op);
        NodeSet::new(
            &PrimitiveSet::arithmetic(),
            &nucleus,
            ModuleKey::new(ModuleKind::Program, 0),
            vec![ValueType::Real],
            0.0,
        )
    }

    #[test]
    fn test_shrink_folds_closed_subtrees() {
        let mut rng = SmallRng::seed_from_u64(31);
        let set = nodes();
        let ctx = MutationContext {
            nodes: &set,
            limits: BranchLimits::default(),
        };
        let closed = Tree::compose(Node::primitive(Sum), vec![constant(1.0), constant(2.0)]).unwrap();
        match Shrink.propose(&ctx, &closed, NodeId::ROOT, &mut rng) {
            Some(Replacement::Subtree(t)) => assert_eq!(t.to_string(), "3"),
            other => panic!("unexpected {other:?}"),
        }
        let open = Tree::compose(Node::primitive(Sum), vec![arg(0), constant(2.0)]).unwrap();
        assert!(Shrink.propose(&ctx, &open, NodeId::ROOT, &mut rng).is_none());
        assert!(Shrink.propose(&ctx, &constant(4.0), NodeId::ROOT, &mut rng).is_none());
    }

    #[test]
    fn test_delegate_keeps_signature() {
        let mut rng = SmallRng::seed_from_u64(32);
        let set = nodes();
        let ctx = MutationContext {
            nodes: &set,
            limits: BranchLimits::default(),
        };
        let tree = Tree::compose(Node::primitive(Sum), vec![arg(0), constant(2.0)]).unwrap();
        for id in tree.ids() {
            let Some(replacement) = Delegate.propose(&ctx, &tree, id, &mut rng) else {
                continue;
            };
            let mut copy = tree.clone();
            match replacement {
                Replacement::Node(node) => {
                    copy.replace_node(id, node).unwrap();
                }
                Replacement::Subtree(t) => {
                    copy.replace(id, t).unwrap();
                }
            }
            assert!(copy.is_ready());
        }
    }

    #[test]
    fn test_points_plan_picks_distinct_sites() {
        let mut rng = SmallRng::seed_from_u64(33);
        let sites = MutationPlan::Points(3).sites(10, &mut rng);
        assert_eq!(sites.len(), 3);
        assert!(sites.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(MutationPlan::Points(5).sites(2, &mut rng).len(), 2);
        assert!(MutationPlan::None.sites(10, &mut rng).is_empty());
    }

    #[test]
    fn test_mutate_keeps_nucleus_valid() {
        let mut rng = SmallRng::seed_from_u64(34);
        let mut config = OperatorConfig::default();
        config.mutation.plan = MutationPlan::Frequency(0.5);
        let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), config).unwrap());
        let mut nucleus = Nucleus::new(Arc::clone(&op));
        let body = Tree::compose(Node::primitive(Sum), vec![arg(0), constant(2.0)]).unwrap();
        nucleus.push_module(Module::program(0, Argument::numbered(&[ValueType::Real]), body).unwrap());
        let mut changed = 0;
        for _ in 0..30 {
            changed += op.mutate(&mut nucleus, &mut rng);
            nucleus.consolidate().unwrap();
            assert!(nucleus.total_size() <= op.config().limits.max_size);
        }
        assert!(changed > 0);
    }
}
