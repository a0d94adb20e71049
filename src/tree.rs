//! Expression trees stored as pre-order arenas.
//!
//! Nodes are kept in a single vector in pre-order, so the subtree rooted at
//! a node always occupies the contiguous range `id..id + size`. Children are
//! owned indices, the parent link is a non-owning index used only to find a
//! node's position during replacement. Every structural edit splices the node
//! vector and re-links the arena, validating arity on the way.

use crate::error::{GenomeError, GenomeResult};
use crate::node::{Call, Node, Signature};
use crate::value::ValueType;
use std::fmt;
use std::ops::Range;

/// Index of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Wrap a raw pre-order index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw pre-order index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct Link {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    size: usize,
    level: usize,
}

/// A typed expression tree.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl Tree {
    /// A single-node tree. The node must be a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::ArityMismatch`] if the node takes children.
    pub fn leaf(node: Node) -> GenomeResult<Self> {
        Self::compose(node, Vec::new())
    }

    /// Attach `children` under `node`, checking that each child returns the
    /// type the node declares for that position.
    ///
    /// # Errors
    ///
    /// Returns an arity or type mismatch if the node is not ready with these
    /// children.
    pub fn compose(node: Node, children: Vec<Tree>) -> GenomeResult<Self> {
        if node.arity() != children.len() {
            return Err(GenomeError::ArityMismatch {
                expected: node.arity(),
                found: children.len(),
            });
        }
        for (expected, child) in node.arg_types().iter().zip(&children) {
            if *expected != child.return_type() {
                return Err(GenomeError::TypeMismatch {
                    expected: *expected,
                    found: child.return_type(),
                });
            }
        }
        let mut nodes = Vec::with_capacity(1 + children.iter().map(Tree::size).sum::<usize>());
        nodes.push(node);
        for child in children {
            nodes.extend(child.nodes);
        }
        Self::from_preorder(nodes)
    }

    /// Build a tree from nodes listed in pre-order. Only the shape is
    /// checked; use [`Tree::check_ready`] to check types.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::MalformedTree`] unless the arities describe
    /// exactly one tree.
    pub fn from_preorder(nodes: Vec<Node>) -> GenomeResult<Self> {
        let mut tree = Self {
            nodes,
            links: Vec::new(),
        };
        tree.relink()?;
        Ok(tree)
    }

    /// Number of nodes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of levels; a single node has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.links.iter().map(|l| l.level).max().unwrap_or(0) + 1
    }

    /// Return type of the root.
    #[must_use]
    pub fn return_type(&self) -> ValueType {
        self.nodes[0].return_type()
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Node at `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node at `id`, if any.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.links[id.0].children
    }

    /// Child `i` of `id`.
    #[must_use]
    pub fn child(&self, id: NodeId, i: usize) -> Option<NodeId> {
        self.links.get(id.0).and_then(|l| l.children.get(i).copied())
    }

    /// Parent of `id`; `None` for the root.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.links[id.0].parent
    }

    /// Number of nodes in the subtree rooted at `id`.
    #[must_use]
    pub fn subtree_size(&self, id: NodeId) -> usize {
        self.links[id.0].size
    }

    /// Depth of the subtree rooted at `id`; a leaf has depth 1.
    #[must_use]
    pub fn subtree_depth(&self, id: NodeId) -> usize {
        let base = self.links[id.0].level;
        self.links[self.range(id)].iter().map(|l| l.level - base).max().unwrap_or(0) + 1
    }

    /// Distance from the root; the root is level 0.
    #[must_use]
    pub fn level(&self, id: NodeId) -> usize {
        self.links[id.0].level
    }

    /// All node ids in pre-order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }

    /// The subtree rooted at `id`, in pre-order, `id` included.
    pub fn subtree_ids(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.range(id).map(NodeId)
    }

    /// Every node outside the subtree rooted at `excluded`, in pre-order.
    pub fn ids_excluding(&self, excluded: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let skip = self.range(excluded);
        self.ids().filter(move |id| !skip.contains(&id.0))
    }

    /// Whether `id` lies in the subtree rooted at `ancestor`.
    #[must_use]
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.range(ancestor).contains(&id.0)
    }

    /// First node in pre-order satisfying `pred`.
    pub fn find(&self, mut pred: impl FnMut(&Node) -> bool) -> Option<NodeId> {
        self.nodes.iter().position(|n| pred(n)).map(NodeId)
    }

    /// Deep copy of the subtree rooted at `id`.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Tree {
        let nodes = self.nodes[self.range(id)].to_vec();
        let links = self.links[self.range(id)]
            .iter()
            .map(|l| Link {
                parent: l.parent.filter(|p| p.0 >= id.0).map(|p| NodeId(p.0 - id.0)),
                children: l.children.iter().map(|c| NodeId(c.0 - id.0)).collect(),
                size: l.size,
                level: l.level - self.links[id.0].level,
            })
            .collect::<Vec<_>>();
        let mut links = links;
        links[0].parent = None;
        Tree { nodes, links }
    }

    /// Replace the subtree at `id` with `donor`, returning the removed
    /// subtree.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::TypeMismatch`] if `donor` returns a different
    /// type than the node it replaces; the tree is left unchanged.
    pub fn replace(&mut self, id: NodeId, donor: Tree) -> GenomeResult<Tree> {
        let current = self.get(id).ok_or(GenomeError::NoSuchNode(id.0))?;
        if current.return_type() != donor.return_type() {
            return Err(GenomeError::TypeMismatch {
                expected: current.return_type(),
                found: donor.return_type(),
            });
        }
        let removed = self.subtree(id);
        let range = self.range(id);
        self.nodes.splice(range, donor.nodes);
        self.relink()?;
        Ok(removed)
    }

    /// Swap the node at `id` for `node`, keeping its children.
    ///
    /// # Errors
    ///
    /// Returns a type or arity mismatch unless `node` has exactly the same
    /// signature as the node it replaces.
    pub fn replace_node(&mut self, id: NodeId, node: Node) -> GenomeResult<Node> {
        let current = self.get(id).ok_or(GenomeError::NoSuchNode(id.0))?;
        if current.return_type() != node.return_type() {
            return Err(GenomeError::TypeMismatch {
                expected: current.return_type(),
                found: node.return_type(),
            });
        }
        if current.arg_types() != node.arg_types() {
            return Err(GenomeError::ArityMismatch {
                expected: current.arity(),
                found: node.arity(),
            });
        }
        Ok(std::mem::replace(&mut self.nodes[id.0], node))
    }

    /// Append `child` as the last child of the call at `id`, whose signature
    /// becomes `signature`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a call, or if `signature` does not
    /// extend the call's arguments by exactly the child's type.
    pub fn push_child(&mut self, id: NodeId, child: Tree, signature: Signature) -> GenomeResult<()> {
        let call = self.call_at(id)?;
        let mut expected = call.signature.arg_types.clone();
        expected.push(child.return_type());
        if signature.arg_types != expected || signature.return_type != call.signature.return_type {
            return Err(GenomeError::ArityMismatch {
                expected: expected.len(),
                found: signature.arg_types.len(),
            });
        }
        let end = self.range(id).end;
        self.call_at_mut(id)?.signature = signature;
        self.nodes.splice(end..end, child.nodes);
        self.relink()
    }

    /// Remove child `position` of the call at `id`, whose signature becomes
    /// `signature`. Returns the removed subtree.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a call, the position is out of range,
    /// or `signature` does not drop exactly that argument.
    pub fn remove_child(&mut self, id: NodeId, position: usize, signature: Signature) -> GenomeResult<Tree> {
        let call = self.call_at(id)?;
        let mut expected = call.signature.arg_types.clone();
        if position >= expected.len() {
            return Err(GenomeError::ArityMismatch {
                expected: expected.len(),
                found: position + 1,
            });
        }
        expected.remove(position);
        if signature.arg_types != expected || signature.return_type != call.signature.return_type {
            return Err(GenomeError::ArityMismatch {
                expected: expected.len(),
                found: signature.arg_types.len(),
            });
        }
        let child = self.links[id.0].children[position];
        let removed = self.subtree(child);
        let range = self.range(child);
        self.call_at_mut(id)?.signature = signature;
        self.nodes.drain(range);
        self.relink()?;
        Ok(removed)
    }

    /// Apply `f` to every node. The closure must not change any node's
    /// arity.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::MalformedTree`] if an arity was changed.
    pub fn edit_nodes(&mut self, f: impl FnMut(&mut Node)) -> GenomeResult<()> {
        self.nodes.iter_mut().for_each(f);
        self.relink()
    }

    /// Whether every node's children return exactly the declared types.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    /// Check that every node's children return exactly the declared types.
    ///
    /// # Errors
    ///
    /// Returns the first type mismatch found in pre-order.
    pub fn check_ready(&self) -> GenomeResult<()> {
        for (node, link) in self.nodes.iter().zip(&self.links) {
            for (expected, child) in node.arg_types().iter().zip(&link.children) {
                let found = self.nodes[child.0].return_type();
                if *expected != found {
                    return Err(GenomeError::TypeMismatch {
                        expected: *expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    fn range(&self, id: NodeId) -> Range<usize> {
        id.0..id.0 + self.links[id.0].size
    }

    fn call_at(&self, id: NodeId) -> GenomeResult<&Call> {
        self.get(id)
            .ok_or(GenomeError::NoSuchNode(id.0))?
            .as_call()
            .ok_or(GenomeError::NotACall(id.0))
    }

    fn call_at_mut(&mut self, id: NodeId) -> GenomeResult<&mut Call> {
        match self.nodes.get_mut(id.0) {
            Some(Node::Call(call)) => Ok(call),
            Some(_) => Err(GenomeError::NotACall(id.0)),
            None => Err(GenomeError::NoSuchNode(id.0)),
        }
    }

    fn relink(&mut self) -> GenomeResult<()> {
        if self.nodes.is_empty() {
            return Err(GenomeError::MalformedTree("empty tree"));
        }
        let mut links = vec![Link::default(); self.nodes.len()];
        let end = link_subtree(&self.nodes, &mut links, 0, None, 0)?;
        if end != self.nodes.len() {
            return Err(GenomeError::MalformedTree("trailing nodes after the root subtree"));
        }
        self.links = links;
        Ok(())
    }
}

fn link_subtree(
    nodes: &[Node],
    links: &mut [Link],
    index: usize,
    parent: Option<NodeId>,
    level: usize,
) -> GenomeResult<usize> {
    let node = nodes
        .get(index)
        .ok_or(GenomeError::MalformedTree("node is missing children"))?;
    let mut children = Vec::with_capacity(node.arity());
    let mut next = index + 1;
    for _ in 0..node.arity() {
        children.push(NodeId(next));
        next = link_subtree(nodes, links, next, Some(NodeId(index)), level + 1)?;
    }
    links[index] = Link {
        parent,
        children,
        size: next - index,
        level,
    };
    Ok(next)
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(tree: &Tree, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let node = tree.node(id);
            if node.is_terminal() {
                return write!(f, "{node}");
            }
            write!(f, "({node}")?;
            for child in tree.children(id) {
                write!(f, " ")?;
                write_node(tree, *child, f)?;
            }
            write!(f, ")")
        }
        write_node(self, NodeId::ROOT, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleKey, ModuleKind};
    use crate::node::{Access, Constant, Greater, Negate, Subtract, Sum};
    use crate::value::Value;

    fn real(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    fn arg(i: usize) -> Tree {
        Tree::leaf(Node::argument(i, ValueType::Real)).unwrap()
    }

    /// `(Subtract (Sum ARG0 2) 1)`
    fn sample() -> Tree {
        Tree::compose(
            Node::primitive(Subtract),
            vec![Tree::compose(Node::primitive(Sum), vec![arg(0), real(2.0)]).unwrap(), real(1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_links() {
        let tree = sample();
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.children(NodeId::ROOT), &[NodeId(1), NodeId(4)]);
        assert_eq!(tree.parent(NodeId(2)), Some(NodeId(1)));
        assert_eq!(tree.parent(NodeId::ROOT), None);
        assert_eq!(tree.subtree_size(NodeId(1)), 3);
        assert_eq!(tree.level(NodeId(3)), 2);
        assert_eq!(tree.to_string(), "(Subtract (Sum ARG0 2) 1)");
    }

    #[test]
    fn test_compose_rejects_wrong_types() {
        let boolean = Tree::compose(Node::primitive(Greater), vec![real(1.0), real(2.0)]).unwrap();
        let err = Tree::compose(Node::primitive(Sum), vec![boolean, real(1.0)]).unwrap_err();
        assert!(matches!(err, GenomeError::TypeMismatch { .. }));

        let err = Tree::compose(Node::primitive(Sum), vec![real(1.0)]).unwrap_err();
        assert_eq!(err, GenomeError::ArityMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn test_from_preorder_rejects_malformed() {
        let nodes = vec![Node::primitive(Sum), Node::argument(0, ValueType::Real)];
        assert!(matches!(Tree::from_preorder(nodes), Err(GenomeError::MalformedTree(_))));

        let nodes = vec![Node::argument(0, ValueType::Real), Node::argument(1, ValueType::Real)];
        assert!(matches!(Tree::from_preorder(nodes), Err(GenomeError::MalformedTree(_))));
    }

    #[test]
    fn test_subtree_and_ranges() {
        let tree = sample();
        let sub = tree.subtree(NodeId(1));
        assert_eq!(sub.to_string(), "(Sum ARG0 2)");
        assert_eq!(sub.parent(NodeId::ROOT), None);
        assert_eq!(sub.level(NodeId(1)), 1);

        let inside: Vec<_> = tree.subtree_ids(NodeId(1)).collect();
        assert_eq!(inside, vec![NodeId(1), NodeId(2), NodeId(3)]);
        let outside: Vec<_> = tree.ids_excluding(NodeId(1)).collect();
        assert_eq!(outside, vec![NodeId(0), NodeId(4)]);
        assert!(tree.is_within(NodeId(3), NodeId(1)));
        assert!(!tree.is_within(NodeId(4), NodeId(1)));
    }

    #[test]
    fn test_replace_relinks() {
        let mut tree = sample();
        let removed = tree.replace(NodeId(1), real(7.0)).unwrap();
        assert_eq!(removed.to_string(), "(Sum ARG0 2)");
        assert_eq!(tree.to_string(), "(Subtract 7 1)");
        assert_eq!(tree.children(NodeId::ROOT), &[NodeId(1), NodeId(2)]);
        assert!(tree.is_ready());
    }

    #[test]
    fn test_replace_rejects_type_change() {
        let mut tree = sample();
        let boolean = Tree::compose(Node::primitive(Greater), vec![real(1.0), real(2.0)]).unwrap();
        assert!(tree.replace(NodeId(4), boolean).is_err());
        assert_eq!(tree.to_string(), "(Subtract (Sum ARG0 2) 1)");
    }

    #[test]
    fn test_replace_node_keeps_children() {
        let mut tree = sample();
        tree.replace_node(NodeId::ROOT, Node::primitive(Sum)).unwrap();
        assert_eq!(tree.to_string(), "(Sum (Sum ARG0 2) 1)");
        assert!(tree.replace_node(NodeId::ROOT, Node::primitive(Negate)).is_err());
    }

    #[test]
    fn test_call_arity_edits() {
        let key = ModuleKey::new(ModuleKind::Function, 0);
        let one = Signature::new(ValueType::Real, vec![ValueType::Real]);
        let two = Signature::new(ValueType::Real, vec![ValueType::Real, ValueType::Real]);
        let call = Node::Call(Call::new(key, Access::Invoke, one.clone()));
        let mut tree = Tree::compose(Node::primitive(Negate), vec![Tree::compose(call, vec![arg(0)]).unwrap()]).unwrap();

        tree.push_child(NodeId(1), real(3.0), two.clone()).unwrap();
        assert_eq!(tree.to_string(), "(Negate (ADF0 ARG0 3))");
        assert!(tree.is_ready());

        let removed = tree.remove_child(NodeId(1), 0, one).unwrap();
        assert_eq!(removed.to_string(), "ARG0");
        assert_eq!(tree.to_string(), "(Negate (ADF0 3))");

        assert!(tree.push_child(NodeId(0), real(1.0), two).is_err());
    }
}
