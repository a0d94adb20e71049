//! Tree execution.
//!
//! The [`Nucleus`] stays immutable while a tree runs. Everything that changes
//! during a run lives elsewhere: module counters and storage contents in a
//! [`Runtime`], argument bindings on the [`Executor`]'s frame stack. A module
//! call pushes a fresh frame and pops it on return, so sibling calls never see
//! each other's arguments.

use crate::error::{ExecError, ExecResult, GenomeError};
use crate::module::{
    Behavior, IteratorState, LoopState, Module, ModuleKind, RecursionState, StorageState, iterator, looping,
    recursion, storage,
};
use crate::node::{Access, Call, Node, Outcome};
use crate::nucleus::Nucleus;
use crate::tree::{NodeId, Tree};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// One element of an iterator collection: a tuple of field values.
pub type Record = Vec<Value>;

/// A list of records, supplied per execution and addressed by collection id.
pub type Collection = Vec<Record>;

/// Limits applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Maximum number of nested module calls before execution fails.
    pub max_call_depth: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { max_call_depth: 64 }
    }
}

/// Mutable per-module execution state of one genome.
///
/// Recursion, loop and iterator counters are cleared by [`Runtime::reset`];
/// storage contents survive it.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    recursions: Vec<RecursionState>,
    loops: Vec<LoopState>,
    iterators: Vec<IteratorState>,
    storages: Vec<StorageState>,
}

impl Runtime {
    /// Fresh state sized for `nucleus`.
    #[must_use]
    pub fn for_nucleus(nucleus: &Nucleus) -> Self {
        let mut runtime = Self::default();
        runtime.sync(nucleus);
        runtime
    }

    /// Clear the per-call state of recursions, loops and iterators.
    pub fn reset(&mut self, nucleus: &Nucleus) {
        self.sync(nucleus);
        self.recursions.iter_mut().for_each(RecursionState::reset);
        self.loops.iter_mut().for_each(LoopState::reset);
        self.iterators.iter_mut().for_each(IteratorState::reset);
    }

    /// Empty every storage module.
    pub fn clear_storage(&mut self) {
        self.storages.iter_mut().for_each(StorageState::clear);
    }

    /// Contents of a storage module, front first.
    #[must_use]
    pub fn storage(&self, id: usize) -> Option<&StorageState> {
        self.storages.get(id)
    }

    /// Match the number of state slots to the nucleus. Storage contents of
    /// modules that still exist are kept.
    fn sync(&mut self, nucleus: &Nucleus) {
        self.recursions
            .resize_with(nucleus.modules(ModuleKind::Recursion).len(), Default::default);
        self.loops.resize_with(nucleus.modules(ModuleKind::Loop).len(), Default::default);
        self.iterators
            .resize_with(nucleus.modules(ModuleKind::Iterator).len(), Default::default);
        self.storages
            .resize_with(nucleus.modules(ModuleKind::Storage).len(), Default::default);
    }

    pub(crate) fn recursion(&mut self, id: usize) -> &mut RecursionState {
        slot(&mut self.recursions, id)
    }

    pub(crate) fn looping(&mut self, id: usize) -> &mut LoopState {
        slot(&mut self.loops, id)
    }

    pub(crate) fn iterator(&mut self, id: usize) -> &mut IteratorState {
        slot(&mut self.iterators, id)
    }

    pub(crate) fn storage_mut(&mut self, id: usize) -> &mut StorageState {
        slot(&mut self.storages, id)
    }
}

fn slot<T: Default>(states: &mut Vec<T>, id: usize) -> &mut T {
    if states.len() <= id {
        states.resize_with(id + 1, T::default);
    }
    &mut states[id]
}

/// Evaluates trees against a nucleus.
#[derive(Debug)]
pub struct Executor<'a> {
    nucleus: Option<&'a Nucleus>,
    runtime: &'a mut Runtime,
    collections: &'a [Collection],
    frames: Vec<Vec<Value>>,
    call_depth: usize,
    max_call_depth: usize,
}

impl<'a> Executor<'a> {
    /// Executor resolving calls through `nucleus`.
    pub fn new(
        nucleus: &'a Nucleus,
        runtime: &'a mut Runtime,
        collections: &'a [Collection],
        config: &ExecConfig,
    ) -> Self {
        Self {
            nucleus: Some(nucleus),
            runtime,
            collections,
            frames: Vec::new(),
            call_depth: 0,
            max_call_depth: config.max_call_depth,
        }
    }

    /// Executor for trees that contain no calls.
    fn detached(runtime: &'a mut Runtime) -> Self {
        Self {
            nucleus: None,
            runtime,
            collections: &[],
            frames: vec![Vec::new()],
            call_depth: 0,
            max_call_depth: 0,
        }
    }

    /// Run main program `index` with `args`.
    ///
    /// # Errors
    ///
    /// Fails if the program does not exist, the arguments do not match its
    /// declaration, or the tree fails.
    pub fn run_program(&mut self, index: usize, args: Vec<Value>) -> ExecResult<Outcome> {
        let nucleus = self.nucleus.ok_or(ExecError::NoSuchProgram(index))?;
        let module = nucleus.program(index).ok_or(ExecError::NoSuchProgram(index))?;
        check_arguments(module, &args)?;
        self.eval_branch(module, 0, args)
    }

    /// Evaluate branch `branch` of `module` with `frame` bound.
    pub(crate) fn eval_branch(&mut self, module: &Module, branch: usize, frame: Vec<Value>) -> ExecResult<Outcome> {
        let tree = module
            .branch(branch)
            .ok_or(GenomeError::NoSuchBranch {
                module: module.key(),
                branch,
            })?
            .tree();
        self.frames.push(frame);
        let outcome = self.eval(tree, NodeId::ROOT);
        self.frames.pop();
        outcome
    }

    /// Evaluate the subtree rooted at `id`.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any node in the subtree.
    pub fn eval(&mut self, tree: &Tree, id: NodeId) -> ExecResult<Outcome> {
        match tree.node(id) {
            Node::Primitive(p) => {
                let mut args = Args {
                    exec: self,
                    tree,
                    node: id,
                    cost: 0,
                };
                let value = p.execute(&mut args)?;
                let cost = args.cost + p.overhead();
                Ok(Outcome::new(value, cost))
            }
            Node::Argument(a) => {
                let value = self
                    .frames
                    .last()
                    .and_then(|frame| frame.get(a.index))
                    .ok_or(ExecError::UnboundArgument(a.index))?;
                if value.value_type() != a.value_type {
                    return Err(ExecError::ValueType {
                        expected: a.value_type,
                        found: value.value_type(),
                    });
                }
                Ok(Outcome::free(value.clone()))
            }
            Node::Call(call) => {
                let mut cost = 0;
                let mut values = Vec::with_capacity(call.signature.arg_types.len());
                for child in tree.children(id) {
                    let outcome = self.eval(tree, *child)?;
                    cost += outcome.cost;
                    values.push(outcome.value);
                }
                let result = self.call(call, values)?;
                Ok(Outcome::new(result.value, cost + result.cost + tree.node(id).overhead()))
            }
        }
    }

    fn call(&mut self, call: &Call, args: Vec<Value>) -> ExecResult<Outcome> {
        let nucleus = self.nucleus.ok_or(ExecError::UnknownModule(call.key))?;
        let module = nucleus.module(call.key).ok_or(ExecError::UnknownModule(call.key))?;
        if self.call_depth >= self.max_call_depth {
            return Err(ExecError::CallDepthExceeded(self.max_call_depth));
        }
        self.call_depth += 1;
        let result = match (module.behavior(), call.access) {
            (Behavior::Function, Access::Invoke) => {
                check_arguments(module, &args).and_then(|()| self.eval_branch(module, 0, args))
            }
            (Behavior::Recursion(limits), Access::Invoke) => {
                check_arguments(module, &args).and_then(|()| recursion::invoke(self, module, limits, args))
            }
            (Behavior::Loop(limits), Access::Invoke) => {
                check_arguments(module, &args).and_then(|()| looping::invoke(self, module, limits, args))
            }
            (Behavior::Iterator(spec), Access::Invoke) => {
                check_arguments(module, &args).and_then(|()| iterator::invoke(self, module, spec, args))
            }
            (Behavior::Storage(spec), Access::Read) => storage::read(self.runtime, module, spec, &args),
            (Behavior::Storage(spec), Access::Write) => storage::write(self.runtime, module, spec, args),
            _ => Err(ExecError::NotCallable(call.key)),
        };
        self.call_depth -= 1;
        result
    }

    pub(crate) fn runtime(&mut self) -> &mut Runtime {
        self.runtime
    }

    pub(crate) fn collection(&self, id: usize) -> &'a [Record] {
        self.collections.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}

fn check_arguments(module: &Module, args: &[Value]) -> ExecResult<()> {
    if args.len() != module.args().len() {
        return Err(ExecError::ArgumentCount {
            expected: module.args().len(),
            found: args.len(),
        });
    }
    for (arg, value) in module.args().iter().zip(args) {
        if arg.value_type != value.value_type() {
            return Err(ExecError::ValueType {
                expected: arg.value_type,
                found: value.value_type(),
            });
        }
    }
    Ok(())
}

/// Children of the primitive being executed.
///
/// Children are evaluated on demand and their costs accumulate onto the
/// parent's result.
#[derive(Debug)]
pub struct Args<'x, 'a> {
    exec: &'x mut Executor<'a>,
    tree: &'x Tree,
    node: NodeId,
    cost: u64,
}

impl Args<'_, '_> {
    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.children(self.node).len()
    }

    /// Whether the node has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cost accumulated by the children evaluated so far.
    #[must_use]
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Evaluate child `i`.
    ///
    /// # Errors
    ///
    /// Fails if the child does not exist or its evaluation fails.
    pub fn eval(&mut self, i: usize) -> ExecResult<Value> {
        let child = self.tree.child(self.node, i).ok_or(GenomeError::ArityMismatch {
            expected: i + 1,
            found: self.len(),
        })?;
        let outcome = self.exec.eval(self.tree, child)?;
        self.cost += outcome.cost;
        Ok(outcome.value)
    }

    /// Evaluate child `i` as a real.
    ///
    /// # Errors
    ///
    /// Fails if the child fails or returns another type.
    pub fn real(&mut self, i: usize) -> ExecResult<f64> {
        match self.eval(i)? {
            Value::Real(x) => Ok(x),
            other => Err(mismatch(ValueType::Real, &other)),
        }
    }

    /// Evaluate child `i` as a boolean.
    ///
    /// # Errors
    ///
    /// Fails if the child fails or returns another type.
    pub fn boolean(&mut self, i: usize) -> ExecResult<bool> {
        match self.eval(i)? {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(ValueType::Boolean, &other)),
        }
    }

    /// Evaluate child `i` as a vector.
    ///
    /// # Errors
    ///
    /// Fails if the child fails or returns another type.
    pub fn vector(&mut self, i: usize) -> ExecResult<Vec<f64>> {
        match self.eval(i)? {
            Value::Vector(v) => Ok(v),
            other => Err(mismatch(ValueType::Vector, &other)),
        }
    }
}

fn mismatch(expected: ValueType, found: &Value) -> ExecError {
    ExecError::ValueType {
        expected,
        found: found.value_type(),
    }
}

/// Evaluate a tree that references no modules and no arguments.
///
/// # Errors
///
/// Fails on any argument read or module call, or if a primitive fails.
pub fn evaluate_detached(tree: &Tree) -> ExecResult<Outcome> {
    let mut runtime = Runtime::default();
    Executor::detached(&mut runtime).eval(tree, NodeId::ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Constant, Sum};

    #[test]
    fn test_detached_rejects_arguments() {
        let tree = Tree::leaf(Node::argument(0, ValueType::Real)).unwrap();
        assert_eq!(evaluate_detached(&tree), Err(ExecError::UnboundArgument(0)));
    }

    #[test]
    fn test_detached_accumulates_cost() {
        let one = || Tree::leaf(Node::primitive(Constant::new(Value::Real(1.0)))).unwrap();
        let inner = Tree::compose(Node::primitive(Sum), vec![one(), one()]).unwrap();
        let tree = Tree::compose(Node::primitive(Sum), vec![inner, one()]).unwrap();
        let outcome = evaluate_detached(&tree).unwrap();
        assert_eq!(outcome.value, Value::Real(3.0));
        assert_eq!(outcome.cost, 4);
    }

    #[test]
    fn test_exec_config_default() {
        assert!(ExecConfig::default().max_call_depth > 0);
    }
}
