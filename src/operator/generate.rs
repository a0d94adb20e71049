//! Random tree generation.
//!
//! A [`NodeSet`] lists every node that may appear in one branch: the
//! primitives, reads of the branch's frame and calls to the modules the
//! branch's owner can see. Trees are grown top-down towards a target size,
//! never choosing a node whose cheapest completion would overshoot the
//! remaining size or depth budget.

use crate::error::{GenomeError, GenomeResult};
use crate::module::ModuleKey;
use crate::node::{Call, Node, PrimitiveSet};
use crate::nucleus::Nucleus;
use crate::tree::Tree;
use crate::value::ValueType;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

fn slot(t: ValueType) -> usize {
    match t {
        ValueType::Real => 0,
        ValueType::Boolean => 1,
        ValueType::Vector => 2,
    }
}

/// Nodes available in one branch context.
#[derive(Debug, Clone)]
pub struct NodeSet {
    caller: ModuleKey,
    frame: Vec<ValueType>,
    nodes: Vec<Node>,
    call_rate: f64,
    min_size: [Option<usize>; 3],
    min_depth: [Option<usize>; 3],
}

impl NodeSet {
    /// Nodes for a branch of `caller` whose frame is `frame`.
    #[must_use]
    pub fn new(primitives: &PrimitiveSet, nucleus: &Nucleus, caller: ModuleKey, frame: Vec<ValueType>, call_rate: f64) -> Self {
        let mut nodes: Vec<Node> = primitives
            .primitives()
            .iter()
            .map(|p| Node::Primitive(p.boxed_clone()))
            .collect();
        nodes.extend(frame.iter().enumerate().map(|(i, t)| Node::argument(i, *t)));
        for callee in nucleus.callable_from(caller) {
            if let Some(module) = nucleus.module(callee) {
                nodes.extend(module.accesses().iter().filter_map(|a| module.call(*a)).map(Node::Call));
            }
        }
        let mut set = Self {
            caller,
            frame,
            nodes,
            call_rate,
            min_size: [None; 3],
            min_depth: [None; 3],
        };
        set.refresh();
        set
    }

    /// Drop reads of frame slot `index`.
    #[must_use]
    pub fn without_argument(mut self, index: usize) -> Self {
        self.nodes
            .retain(|n| n.as_argument().is_none_or(|a| a.index != index));
        self.refresh();
        self
    }

    /// Drop calls to `key`.
    #[must_use]
    pub fn without_module(mut self, key: ModuleKey) -> Self {
        self.nodes.retain(|n| n.as_call().is_none_or(|c| c.key != key));
        self.refresh();
        self
    }

    /// Add a call, for modules not yet in the nucleus.
    #[must_use]
    pub fn with_call(mut self, call: Call) -> Self {
        self.nodes.push(Node::Call(call));
        self.refresh();
        self
    }

    /// Owner of the branch.
    #[must_use]
    pub fn caller(&self) -> ModuleKey {
        self.caller
    }

    /// Frame of the branch.
    #[must_use]
    pub fn frame(&self) -> &[ValueType] {
        &self.frame
    }

    /// Every available node.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether some tree of type `t` can be built.
    #[must_use]
    pub fn can_generate(&self, t: ValueType) -> bool {
        self.min_size[slot(t)].is_some()
    }

    /// Size of the smallest tree returning `t`.
    #[must_use]
    pub fn min_size(&self, t: ValueType) -> Option<usize> {
        self.min_size[slot(t)]
    }

    fn refresh(&mut self) {
        self.min_size = fixed_point(&self.nodes, sum_plus_one);
        self.min_depth = fixed_point(&self.nodes, max_plus_one);
    }

    fn min_size_of(&self, node: &Node) -> Option<usize> {
        node_min(node, &self.min_size, sum_plus_one)
    }

    fn min_depth_of(&self, node: &Node) -> Option<usize> {
        node_min(node, &self.min_depth, max_plus_one)
    }

    /// A fresh terminal returning `t`.
    pub fn find_terminal(&self, t: ValueType, rng: &mut dyn RngCore) -> Option<Node> {
        let terminals: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.is_terminal() && n.return_type() == t)
            .collect();
        self.pick(&terminals, rng).map(|n| n.spawn(rng))
    }

    /// A fresh node with exactly the signature of `node` but another name,
    /// so `node`'s children can be reattached to it.
    pub fn find_matching(&self, node: &Node, rng: &mut dyn RngCore) -> Option<Node> {
        let name = node.name();
        let matches: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.same_signature(node) && n.name() != name)
            .collect();
        self.pick(&matches, rng).map(|n| n.spawn(rng))
    }

    /// Grow a tree returning `t` of about `size` nodes and at most `depth`
    /// levels. When no tree fits the budgets, the smallest possible tree is
    /// built instead.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::GenerationFailed`] if no tree of type `t` can
    /// be built from this set at all.
    pub fn grow(&self, t: ValueType, size: usize, depth: usize, rng: &mut dyn RngCore) -> GenomeResult<Tree> {
        let mut nodes = Vec::with_capacity(size);
        self.grow_into(t, size.max(1), depth.max(1), rng, &mut nodes)?;
        Tree::from_preorder(nodes)
    }

    fn grow_into(&self, t: ValueType, size: usize, depth: usize, rng: &mut dyn RngCore, out: &mut Vec<Node>) -> GenomeResult<()> {
        let typed: Vec<(&Node, usize)> = self
            .nodes
            .iter()
            .filter(|n| n.return_type() == t)
            .filter_map(|n| self.min_size_of(n).map(|s| (n, s)))
            .collect();
        let fitting: Vec<&Node> = typed
            .iter()
            .filter(|(n, s)| *s <= size && self.min_depth_of(n).is_some_and(|d| d <= depth))
            .map(|(n, _)| *n)
            .collect();

        let chosen = if fitting.is_empty() {
            typed
                .iter()
                .min_by_key(|(_, s)| *s)
                .map(|(n, _)| *n)
                .ok_or(GenomeError::GenerationFailed(t))?
        } else {
            let (functions, terminals): (Vec<&Node>, Vec<&Node>) =
                fitting.into_iter().partition(|n| !n.is_terminal());
            let preferred = if terminals.is_empty() || (size > 1 && !functions.is_empty()) {
                &functions
            } else {
                &terminals
            };
            self.pick(preferred, rng).ok_or(GenomeError::GenerationFailed(t))?
        };

        let arg_types = chosen.arg_types().to_vec();
        out.push(chosen.spawn(rng));
        if arg_types.is_empty() {
            return Ok(());
        }

        let mut budgets: Vec<usize> = arg_types
            .iter()
            .map(|a| self.min_size[slot(*a)].unwrap_or(1))
            .collect();
        let extra = size.saturating_sub(1 + budgets.iter().sum::<usize>());
        for _ in 0..extra {
            let i = rng.gen_range(0..budgets.len());
            budgets[i] += 1;
        }
        for (a, budget) in arg_types.iter().zip(budgets) {
            self.grow_into(*a, budget, depth.saturating_sub(1), rng, out)?;
        }
        Ok(())
    }

    /// Choose among candidates, taking a call with the configured rate when
    /// both calls and other nodes are available.
    fn pick<'s>(&self, candidates: &[&'s Node], rng: &mut dyn RngCore) -> Option<&'s Node> {
        let (calls, others): (Vec<&Node>, Vec<&Node>) =
            candidates.iter().copied().partition(|n| n.as_call().is_some());
        let pool = if calls.is_empty() {
            others
        } else if others.is_empty() || rng.gen_bool(self.call_rate) {
            calls
        } else {
            others
        };
        pool.choose(rng).copied()
    }
}

fn sum_plus_one(children: &[usize]) -> usize {
    children.iter().sum::<usize>() + 1
}

fn max_plus_one(children: &[usize]) -> usize {
    children.iter().max().copied().unwrap_or(0) + 1
}

/// Cheapest completion of `node` given the cheapest tree per type.
fn node_min(node: &Node, table: &[Option<usize>; 3], combine: fn(&[usize]) -> usize) -> Option<usize> {
    let children: Option<Vec<usize>> = node.arg_types().iter().map(|t| table[slot(*t)]).collect();
    children.map(|c| combine(&c))
}

fn fixed_point(nodes: &[Node], combine: fn(&[usize]) -> usize) -> [Option<usize>; 3] {
    let mut table = [None; 3];
    loop {
        let mut changed = false;
        for node in nodes {
            let Some(value) = node_min(node, &table, combine) else {
                continue;
            };
            let entry = &mut table[slot(node.return_type())];
            if entry.is_none_or(|current| value < current) {
                *entry = Some(value);
                changed = true;
            }
        }
        if !changed {
            return table;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::module::ModuleKind;
    use crate::node::{Greater, Sum};
    use crate::operator::GeneticOperator;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn empty_nucleus() -> Nucleus {
        Nucleus::new(Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap()))
    }

    fn rpb() -> ModuleKey {
        ModuleKey::new(ModuleKind::Program, 0)
    }

    #[test]
    fn test_min_sizes() {
        let set = NodeSet::new(&PrimitiveSet::arithmetic(), &empty_nucleus(), rpb(), vec![ValueType::Real], 0.0);
        assert_eq!(set.min_size(ValueType::Real), Some(1));
        assert_eq!(set.min_size(ValueType::Boolean), None);

        // Booleans only through a comparison of two reals.
        let primitives = PrimitiveSet::new().with(Sum).with(Greater);
        let set = NodeSet::new(&primitives, &empty_nucleus(), rpb(), vec![ValueType::Real], 0.0);
        assert_eq!(set.min_size(ValueType::Boolean), Some(3));
    }

    #[test]
    fn test_grow_respects_budgets() {
        let mut rng = SmallRng::seed_from_u64(3);
        let set = NodeSet::new(&PrimitiveSet::arithmetic(), &empty_nucleus(), rpb(), vec![ValueType::Real], 0.0);
        for size in 1..20 {
            let tree = set.grow(ValueType::Real, size, 6, &mut rng).unwrap();
            assert!(tree.is_ready());
            assert!(tree.size() <= size.max(1));
            assert!(tree.depth() <= 6);
            assert_eq!(tree.return_type(), ValueType::Real);
        }
    }

    #[test]
    fn test_grow_fails_for_unreachable_type() {
        let mut rng = SmallRng::seed_from_u64(4);
        let set = NodeSet::new(&PrimitiveSet::arithmetic(), &empty_nucleus(), rpb(), Vec::new(), 0.0);
        assert_eq!(
            set.grow(ValueType::Vector, 5, 5, &mut rng).unwrap_err(),
            GenomeError::GenerationFailed(ValueType::Vector)
        );
    }

    #[test]
    fn test_without_argument() {
        let mut rng = SmallRng::seed_from_u64(8);
        let set = NodeSet::new(&PrimitiveSet::new().with(Sum), &empty_nucleus(), rpb(), vec![ValueType::Real; 2], 0.0)
            .without_argument(0);
        for _ in 0..20 {
            let tree = set.grow(ValueType::Real, 7, 4, &mut rng).unwrap();
            assert!(tree.nodes().all(|n| n.as_argument().is_none_or(|a| a.index == 1)));
        }
    }

    #[test]
    fn test_find_matching_keeps_signature() {
        let mut rng = SmallRng::seed_from_u64(1);
        let set = NodeSet::new(&PrimitiveSet::arithmetic(), &empty_nucleus(), rpb(), Vec::new(), 0.0);
        let sum = Node::primitive(Sum);
        for _ in 0..20 {
            let other = set.find_matching(&sum, &mut rng).unwrap();
            assert!(other.same_signature(&sum));
            assert_ne!(other.name(), "Sum");
        }
        assert!(set.find_terminal(ValueType::Real, &mut rng).is_some());
    }
}
