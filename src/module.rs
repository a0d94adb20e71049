//! Modules: the independently executable parts of a genome.
//!
//! Every genome has one or more main programs (RPB) plus optional
//! architecture-altering modules: functions (ADF), recursions (ADR), loops
//! (ADL), collection iterators (ADI) and storage cells (ADS). Modules are
//! addressed by a [`ModuleKey`] of kind and id; ids are dense within a kind.

pub(crate) mod iterator;
pub(crate) mod looping;
pub(crate) mod recursion;
pub(crate) mod storage;

pub use iterator::{IteratorSpec, IteratorState};
pub use looping::{LoopLimits, LoopState};
pub use recursion::{RecursionLimits, RecursionState};
pub use storage::{StorageKind, StorageSpec, StorageState};

use crate::error::{GenomeError, GenomeResult};
use crate::node::{Access, Call, Node, Signature};
use crate::tree::{NodeId, Tree};
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The six module kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Main program branch (RPB).
    Program,
    /// Automatically defined function (ADF).
    Function,
    /// Automatically defined recursion (ADR).
    Recursion,
    /// Automatically defined loop (ADL).
    Loop,
    /// Automatically defined iterator (ADI).
    Iterator,
    /// Automatically defined storage (ADS).
    Storage,
}

impl ModuleKind {
    /// Every kind, programs first.
    pub const ALL: [ModuleKind; 6] = [
        ModuleKind::Program,
        ModuleKind::Function,
        ModuleKind::Recursion,
        ModuleKind::Loop,
        ModuleKind::Iterator,
        ModuleKind::Storage,
    ];

    /// Kinds that architecture alteration may create and delete.
    pub const ALTERABLE: [ModuleKind; 5] = [
        ModuleKind::Function,
        ModuleKind::Recursion,
        ModuleKind::Loop,
        ModuleKind::Iterator,
        ModuleKind::Storage,
    ];

    /// Position in [`ModuleKind::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            ModuleKind::Program => 0,
            ModuleKind::Function => 1,
            ModuleKind::Recursion => 2,
            ModuleKind::Loop => 3,
            ModuleKind::Iterator => 4,
            ModuleKind::Storage => 5,
        }
    }

    /// Short name used in rendered trees.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ModuleKind::Program => "RPB",
            ModuleKind::Function => "ADF",
            ModuleKind::Recursion => "ADR",
            ModuleKind::Loop => "ADL",
            ModuleKind::Iterator => "ADI",
            ModuleKind::Storage => "ADS",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Stable address of a module within its nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    /// Module kind.
    pub kind: ModuleKind,
    /// Position within the kind.
    pub id: usize,
}

impl ModuleKey {
    /// Create a key.
    #[must_use]
    pub fn new(kind: ModuleKind, id: usize) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

/// A declared module argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    /// Display name.
    pub name: String,
    /// Declared type.
    pub value_type: ValueType,
}

impl Argument {
    /// Create an argument.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    /// Arguments named `x0`, `x1`, ... for a list of types.
    #[must_use]
    pub fn numbered(types: &[ValueType]) -> Vec<Self> {
        types.iter().enumerate().map(|(i, t)| Self::new(format!("x{i}"), *t)).collect()
    }
}

/// What a branch computes for its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchRole {
    /// The module's result.
    Body,
    /// Real-valued test; positive means true.
    Condition,
    /// Recursion base case.
    Ground,
    /// Loop start value.
    Initialization,
}

impl fmt::Display for BranchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BranchRole::Body => "body",
            BranchRole::Condition => "condition",
            BranchRole::Ground => "ground",
            BranchRole::Initialization => "init",
        };
        f.write_str(name)
    }
}

/// A branch root with its cached metrics.
#[derive(Debug, Clone)]
pub struct Branch {
    role: BranchRole,
    tree: Tree,
    size: usize,
    depth: usize,
}

impl Branch {
    fn new(role: BranchRole, tree: Tree) -> Self {
        let mut branch = Self {
            role,
            tree,
            size: 0,
            depth: 0,
        };
        branch.refresh();
        branch
    }

    fn refresh(&mut self) {
        self.size = self.tree.size();
        self.depth = self.tree.depth();
    }

    /// Role of the branch.
    #[must_use]
    pub fn role(&self) -> BranchRole {
        self.role
    }

    /// The branch tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Cached node count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cached depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Kind-specific configuration of a module.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Main program.
    Program,
    /// Plain function.
    Function,
    /// Recursion with depth and call budgets.
    Recursion(RecursionLimits),
    /// Loop with iteration and call budgets.
    Loop(LoopLimits),
    /// Fold over an external collection.
    Iterator(IteratorSpec),
    /// Memory cell.
    Storage(StorageSpec),
}

impl Behavior {
    /// Kind of module this behavior belongs to.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        match self {
            Behavior::Program => ModuleKind::Program,
            Behavior::Function => ModuleKind::Function,
            Behavior::Recursion(_) => ModuleKind::Recursion,
            Behavior::Loop(_) => ModuleKind::Loop,
            Behavior::Iterator(_) => ModuleKind::Iterator,
            Behavior::Storage(_) => ModuleKind::Storage,
        }
    }

    /// Branch roles in order.
    #[must_use]
    pub fn roles(&self) -> &'static [BranchRole] {
        match self {
            Behavior::Program | Behavior::Function | Behavior::Iterator(_) => &[BranchRole::Body],
            Behavior::Recursion(_) => &[BranchRole::Condition, BranchRole::Body, BranchRole::Ground],
            Behavior::Loop(_) => &[BranchRole::Initialization, BranchRole::Condition, BranchRole::Body],
            Behavior::Storage(_) => &[],
        }
    }

    /// Values visible to argument nodes inside the module's branches.
    ///
    /// Loops append the iteration index and the current loop value; iterators
    /// append the record fields, the element index, the collection length
    /// and the fold accumulator.
    #[must_use]
    pub fn frame_types(&self, args: &[ValueType], return_type: ValueType) -> Vec<ValueType> {
        let mut frame = args.to_vec();
        match self {
            Behavior::Loop(_) => {
                frame.push(ValueType::Real);
                frame.push(return_type);
            }
            Behavior::Iterator(spec) => {
                frame.extend_from_slice(&spec.fields);
                frame.push(ValueType::Real);
                frame.push(ValueType::Real);
                frame.push(return_type);
            }
            _ => {}
        }
        frame
    }
}

/// One module of a genome.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) id: usize,
    return_type: ValueType,
    args: Vec<Argument>,
    branches: Vec<Branch>,
    behavior: Behavior,
}

impl Module {
    /// Build a module, checking the branch count and each branch's return
    /// type against the behavior's layout.
    ///
    /// # Errors
    ///
    /// Returns an arity mismatch for a wrong number of trees and a type
    /// mismatch for a branch returning the wrong type.
    pub fn from_parts(
        id: usize,
        return_type: ValueType,
        args: Vec<Argument>,
        behavior: Behavior,
        trees: Vec<Tree>,
    ) -> GenomeResult<Self> {
        let roles = behavior.roles();
        if roles.len() != trees.len() {
            return Err(GenomeError::ArityMismatch {
                expected: roles.len(),
                found: trees.len(),
            });
        }
        let mut branches = Vec::with_capacity(trees.len());
        for (role, tree) in roles.iter().zip(trees) {
            let expected = required_type(*role, return_type);
            if tree.return_type() != expected {
                return Err(GenomeError::TypeMismatch {
                    expected,
                    found: tree.return_type(),
                });
            }
            branches.push(Branch::new(*role, tree));
        }
        Ok(Self {
            id,
            return_type,
            args,
            branches,
            behavior,
        })
    }

    /// A main program returning the type of `body`.
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed tree; kept fallible for symmetry.
    pub fn program(id: usize, args: Vec<Argument>, body: Tree) -> GenomeResult<Self> {
        Self::from_parts(id, body.return_type(), args, Behavior::Program, vec![body])
    }

    /// A function returning the type of `body`.
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed tree; kept fallible for symmetry.
    pub fn function(id: usize, args: Vec<Argument>, body: Tree) -> GenomeResult<Self> {
        Self::from_parts(id, body.return_type(), args, Behavior::Function, vec![body])
    }

    /// A recursion. `condition` must return a real; `ground` must return
    /// the type of `body`.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the branches disagree.
    pub fn recursion(
        id: usize,
        args: Vec<Argument>,
        limits: RecursionLimits,
        condition: Tree,
        body: Tree,
        ground: Tree,
    ) -> GenomeResult<Self> {
        Self::from_parts(
            id,
            body.return_type(),
            args,
            Behavior::Recursion(limits),
            vec![condition, body, ground],
        )
    }

    /// A loop. `condition` must return a real; `initialization` must return
    /// the type of `body`.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the branches disagree.
    pub fn looping(
        id: usize,
        args: Vec<Argument>,
        limits: LoopLimits,
        initialization: Tree,
        condition: Tree,
        body: Tree,
    ) -> GenomeResult<Self> {
        Self::from_parts(
            id,
            body.return_type(),
            args,
            Behavior::Loop(limits),
            vec![initialization, condition, body],
        )
    }

    /// An iterator folding `body` over collection `spec.collection`.
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed tree; kept fallible for symmetry.
    pub fn iterator(id: usize, args: Vec<Argument>, spec: IteratorSpec, body: Tree) -> GenomeResult<Self> {
        Self::from_parts(id, body.return_type(), args, Behavior::Iterator(spec), vec![body])
    }

    /// A storage cell holding values of `value_type`.
    #[must_use]
    pub fn storage(id: usize, value_type: ValueType, spec: StorageSpec) -> Self {
        Self {
            id,
            return_type: value_type,
            args: Vec::new(),
            branches: Vec::new(),
            behavior: Behavior::Storage(spec),
        }
    }

    /// Address of this module.
    #[must_use]
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.kind(), self.id)
    }

    /// Module kind.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.behavior.kind()
    }

    /// Position within the kind.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Type of the value the module produces.
    #[must_use]
    pub fn return_type(&self) -> ValueType {
        self.return_type
    }

    /// Declared arguments.
    #[must_use]
    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Declared argument types.
    #[must_use]
    pub fn arg_types(&self) -> Vec<ValueType> {
        self.args.iter().map(|a| a.value_type).collect()
    }

    /// Kind-specific configuration.
    #[must_use]
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// Branches in layout order.
    #[must_use]
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Branch `i`.
    #[must_use]
    pub fn branch(&self, i: usize) -> Option<&Branch> {
        self.branches.get(i)
    }

    /// Types visible to argument nodes in this module's branches.
    #[must_use]
    pub fn frame_types(&self) -> Vec<ValueType> {
        self.behavior.frame_types(&self.arg_types(), self.return_type)
    }

    /// Type branch `i` must return.
    #[must_use]
    pub fn branch_type(&self, i: usize) -> Option<ValueType> {
        self.branches.get(i).map(|b| required_type(b.role, self.return_type))
    }

    /// Access paths through which calls may reach this module.
    #[must_use]
    pub fn accesses(&self) -> &'static [Access] {
        match self.behavior {
            Behavior::Program => &[],
            Behavior::Storage(_) => &[Access::Read, Access::Write],
            _ => &[Access::Invoke],
        }
    }

    /// Signature a call through `access` must carry, if the access is
    /// allowed.
    #[must_use]
    pub fn signature(&self, access: Access) -> Option<Signature> {
        match (&self.behavior, access) {
            (Behavior::Program, _) | (Behavior::Storage(_), Access::Invoke) => None,
            (Behavior::Storage(spec), Access::Read) => Some(spec.read_signature(self.return_type)),
            (Behavior::Storage(spec), Access::Write) => Some(spec.write_signature(self.return_type)),
            (_, Access::Invoke) => Some(Signature::new(self.return_type, self.arg_types())),
            (_, Access::Read | Access::Write) => None,
        }
    }

    /// A call node through `access` with this module's current signature.
    #[must_use]
    pub fn call(&self, access: Access) -> Option<Call> {
        self.signature(access).map(|s| Call::new(self.key(), access, s))
    }

    /// Total node count over all branches.
    #[must_use]
    pub fn size(&self) -> usize {
        self.branches.iter().map(Branch::size).sum()
    }

    /// Deepest branch.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.branches.iter().map(Branch::depth).max().unwrap_or(0)
    }

    /// Replace branch `i`, returning the previous tree.
    ///
    /// # Errors
    ///
    /// Fails if the branch does not exist or `tree` returns the wrong type.
    pub fn set_branch(&mut self, i: usize, tree: Tree) -> GenomeResult<Tree> {
        let expected = self.branch_type(i).ok_or(GenomeError::NoSuchBranch {
            module: self.key(),
            branch: i,
        })?;
        if tree.return_type() != expected {
            return Err(GenomeError::TypeMismatch {
                expected,
                found: tree.return_type(),
            });
        }
        let branch = &mut self.branches[i];
        let old = std::mem::replace(&mut branch.tree, tree);
        branch.refresh();
        Ok(old)
    }

    /// Edit branch `i` in place; metrics are refreshed afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the branch does not exist, or with whatever `edit` returns.
    pub fn edit_branch<R>(&mut self, i: usize, edit: impl FnOnce(&mut Tree) -> GenomeResult<R>) -> GenomeResult<R> {
        let key = self.key();
        let branch = self
            .branches
            .get_mut(i)
            .ok_or(GenomeError::NoSuchBranch { module: key, branch: i })?;
        let result = edit(&mut branch.tree);
        branch.refresh();
        result
    }

    /// Recompute the cached size and depth of every branch.
    pub fn refresh_metrics(&mut self) {
        self.branches.iter_mut().for_each(Branch::refresh);
    }

    /// Every call in every branch as `(branch, node, call)`.
    pub fn calls(&self) -> impl Iterator<Item = (usize, NodeId, &Call)> + '_ {
        self.branches.iter().enumerate().flat_map(|(b, branch)| {
            branch
                .tree
                .ids()
                .filter_map(move |id| branch.tree.node(id).as_call().map(|c| (b, id, c)))
        })
    }

    /// Append an argument. Frame slots after the arguments shift up by one.
    ///
    /// # Errors
    ///
    /// Fails if argument renumbering breaks a branch.
    pub(crate) fn push_argument(&mut self, argument: Argument) -> GenomeResult<usize> {
        let position = self.args.len();
        self.renumber_arguments(|i| if i >= position { i + 1 } else { i })?;
        self.args.push(argument);
        Ok(position)
    }

    /// Remove argument `position`. No branch may still read it.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::ArgumentMismatch`] if a branch reads the
    /// argument.
    pub(crate) fn remove_argument(&mut self, position: usize) -> GenomeResult<Argument> {
        if position >= self.args.len() {
            return Err(GenomeError::ArgumentMismatch {
                module: self.key(),
                index: position,
            });
        }
        let still_read = self.branches.iter().any(|b| {
            b.tree
                .nodes()
                .any(|n| n.as_argument().is_some_and(|a| a.index == position))
        });
        if still_read {
            return Err(GenomeError::ArgumentMismatch {
                module: self.key(),
                index: position,
            });
        }
        self.renumber_arguments(|i| if i > position { i - 1 } else { i })?;
        Ok(self.args.remove(position))
    }

    fn renumber_arguments(&mut self, map: impl Fn(usize) -> usize) -> GenomeResult<()> {
        for branch in &mut self.branches {
            branch.tree.edit_nodes(|node| {
                if let Node::Argument(a) = node {
                    a.index = map(a.index);
                }
            })?;
        }
        Ok(())
    }
}

/// Type a branch with `role` must return in a module returning `return_type`.
#[must_use]
pub fn required_type(role: BranchRole, return_type: ValueType) -> ValueType {
    match role {
        BranchRole::Condition => ValueType::Real,
        _ => return_type,
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.key())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", arg.name, arg.value_type)?;
        }
        write!(f, ") -> {}", self.return_type)?;
        if let Behavior::Storage(spec) = &self.behavior {
            return write!(f, " [{:?}, max {}]", spec.kind, spec.max_size);
        }
        for branch in &self.branches {
            write!(f, "\n  {}: {}", branch.role, branch.tree)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Constant, Sum};
    use crate::value::Value;

    fn real(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    fn arg(i: usize) -> Tree {
        Tree::leaf(Node::argument(i, ValueType::Real)).unwrap()
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ModuleKey::new(ModuleKind::Recursion, 2).to_string(), "ADR2");
        assert_eq!(ModuleKey::new(ModuleKind::Program, 0).to_string(), "RPB0");
    }

    #[test]
    fn test_recursion_layout_checks_types() {
        let boolean = Tree::leaf(Node::primitive(Constant::new(Value::Boolean(true)))).unwrap();
        let err = Module::recursion(0, Vec::new(), RecursionLimits::default(), boolean, real(1.0), real(0.0))
            .unwrap_err();
        assert!(matches!(err, GenomeError::TypeMismatch { .. }));

        let module =
            Module::recursion(0, Vec::new(), RecursionLimits::default(), real(1.0), real(1.0), real(0.0)).unwrap();
        assert_eq!(module.branches().len(), 3);
        assert_eq!(module.branch(2).unwrap().role(), BranchRole::Ground);
    }

    #[test]
    fn test_frames() {
        let args = Argument::numbered(&[ValueType::Boolean]);
        let looping =
            Module::looping(0, args.clone(), LoopLimits::default(), real(0.0), real(1.0), real(1.0)).unwrap();
        assert_eq!(
            looping.frame_types(),
            vec![ValueType::Boolean, ValueType::Real, ValueType::Real]
        );

        let spec = IteratorSpec {
            collection: 0,
            fields: vec![ValueType::Vector],
            max_calls: 4,
        };
        let iterator = Module::iterator(0, args, spec, real(0.0)).unwrap();
        assert_eq!(
            iterator.frame_types(),
            vec![
                ValueType::Boolean,
                ValueType::Vector,
                ValueType::Real,
                ValueType::Real,
                ValueType::Real
            ]
        );
    }

    #[test]
    fn test_storage_signatures() {
        let spec = StorageSpec {
            kind: StorageKind::ArrayList,
            max_size: 4,
        };
        let module = Module::storage(1, ValueType::Boolean, spec);
        assert_eq!(module.signature(Access::Invoke), None);
        assert_eq!(
            module.signature(Access::Read).unwrap().arg_types,
            vec![ValueType::Real]
        );
        assert_eq!(
            module.signature(Access::Write).unwrap().arg_types,
            vec![ValueType::Real, ValueType::Boolean]
        );
        assert_eq!(module.to_string(), "ADS1() -> boolean [ArrayList, max 4]");
    }

    #[test]
    fn test_set_branch_refreshes_metrics() {
        let mut module = Module::function(0, Argument::numbered(&[ValueType::Real]), arg(0)).unwrap();
        assert_eq!(module.size(), 1);
        module
            .set_branch(0, Tree::compose(Node::primitive(Sum), vec![arg(0), real(1.0)]).unwrap())
            .unwrap();
        assert_eq!(module.size(), 3);
        assert_eq!(module.depth(), 2);
        assert!(module.set_branch(1, real(1.0)).is_err());
    }

    #[test]
    fn test_argument_renumbering_in_loops() {
        // The loop's current value (slot 1) moves to slot 2 when an argument is added.
        let mut module =
            Module::looping(0, Argument::numbered(&[ValueType::Real]), LoopLimits::default(), real(0.0), real(1.0), arg(2))
                .unwrap();
        module.push_argument(Argument::new("x1", ValueType::Real)).unwrap();
        assert_eq!(module.branch(2).unwrap().tree().to_string(), "ARG3");

        assert!(module.remove_argument(0).is_ok());
        assert_eq!(module.branch(2).unwrap().tree().to_string(), "ARG2");
        assert_eq!(module.args().len(), 1);
    }

    #[test]
    fn test_remove_argument_still_read() {
        let mut module = Module::function(0, Argument::numbered(&[ValueType::Real]), arg(0)).unwrap();
        assert!(matches!(
            module.remove_argument(0),
            Err(GenomeError::ArgumentMismatch { index: 0, .. })
        ));
    }
}
