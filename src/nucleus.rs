//! The complete genome.
//!
//! A [`Nucleus`] holds the modules of every kind, the visibility rules
//! between them and the genetic operator bound to the individual. Calls name
//! their target by [`ModuleKey`], so binding a call is a lookup; consolidation
//! re-derives module ids and branch metrics and verifies that every call and
//! argument read resolves.

use crate::error::{GenomeError, GenomeResult};
use crate::module::{Module, ModuleKey, ModuleKind};
use crate::node::{Call, Node};
use crate::operator::GeneticOperator;
use crate::tree::{NodeId, Tree};
use crate::value::ValueType;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which architecture-altering kinds may only call earlier modules of their
/// own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    /// Functions call only functions with a smaller id.
    pub functions: bool,
    /// Recursions call only recursions with a smaller id, or themselves.
    pub recursions: bool,
    /// Loops call only loops with a smaller id.
    pub loops: bool,
    /// Iterators call only iterators with a smaller id.
    pub iterators: bool,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self {
            functions: true,
            recursions: true,
            loops: true,
            iterators: true,
        }
    }
}

impl Hierarchy {
    /// Whether `kind` is restricted to earlier modules.
    #[must_use]
    pub fn is_hierarchical(&self, kind: ModuleKind) -> bool {
        match kind {
            ModuleKind::Function => self.functions,
            ModuleKind::Recursion => self.recursions,
            ModuleKind::Loop => self.loops,
            ModuleKind::Iterator => self.iterators,
            ModuleKind::Program | ModuleKind::Storage => false,
        }
    }

    /// Whether every kind is hierarchical. Calls then never form a cycle
    /// other than a recursion calling itself.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.functions && self.recursions && self.loops && self.iterators
    }

    /// Whether a branch of `caller` may contain a call to `callee`.
    ///
    /// Programs call every other kind and every module calls storage. Other
    /// calls stay within a kind: hierarchical kinds reach smaller ids, the
    /// rest reach any other id. Recursions may always call themselves.
    #[must_use]
    pub fn allows(&self, caller: ModuleKey, callee: ModuleKey) -> bool {
        match (caller.kind, callee.kind) {
            (_, ModuleKind::Program) => false,
            (_, ModuleKind::Storage) | (ModuleKind::Program, _) => true,
            (a, b) if a != b => false,
            (kind, _) => {
                let own = kind == ModuleKind::Recursion && callee.id == caller.id;
                if self.is_hierarchical(kind) {
                    own || callee.id < caller.id
                } else {
                    own || callee.id != caller.id
                }
            }
        }
    }
}

/// How [`Nucleus::merge`] picks modules present in both parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Always the first parent's module.
    #[default]
    FirstParent,
    /// Either parent's module with equal probability.
    Uniform,
}

/// Position of a node within a nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    /// Owning module.
    pub module: ModuleKey,
    /// Branch within the module.
    pub branch: usize,
    /// Node within the branch.
    pub node: NodeId,
}

/// A whole genome.
#[derive(Debug, Clone)]
pub struct Nucleus {
    modules: [Vec<Module>; 6],
    hierarchy: Hierarchy,
    operator: Arc<GeneticOperator>,
}

impl Nucleus {
    /// An empty nucleus bound to `operator`, using the operator's hierarchy.
    #[must_use]
    pub fn new(operator: Arc<GeneticOperator>) -> Self {
        let hierarchy = operator.config().architecture.hierarchy;
        Self {
            modules: Default::default(),
            hierarchy,
            operator,
        }
    }

    /// Replace the visibility rules.
    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// The bound genetic operator.
    #[must_use]
    pub fn operator(&self) -> &Arc<GeneticOperator> {
        &self.operator
    }

    /// Visibility rules.
    #[must_use]
    pub fn hierarchy(&self) -> Hierarchy {
        self.hierarchy
    }

    /// Modules of one kind, ordered by id.
    #[must_use]
    pub fn modules(&self, kind: ModuleKind) -> &[Module] {
        &self.modules[kind.index()]
    }

    /// Every module, programs first.
    pub fn all_modules(&self) -> impl Iterator<Item = &Module> + '_ {
        self.modules.iter().flatten()
    }

    /// Main programs.
    #[must_use]
    pub fn programs(&self) -> &[Module] {
        self.modules(ModuleKind::Program)
    }

    /// Main program `index`.
    #[must_use]
    pub fn program(&self, index: usize) -> Option<&Module> {
        self.programs().get(index)
    }

    /// Module at `key`.
    #[must_use]
    pub fn module(&self, key: ModuleKey) -> Option<&Module> {
        self.modules[key.kind.index()].get(key.id)
    }

    /// Mutable module at `key`.
    pub fn module_mut(&mut self, key: ModuleKey) -> Option<&mut Module> {
        self.modules[key.kind.index()].get_mut(key.id)
    }

    /// Append a module, assigning it the next id of its kind.
    pub fn push_module(&mut self, mut module: Module) -> ModuleKey {
        let list = &mut self.modules[module.kind().index()];
        module.id = list.len();
        let key = module.key();
        list.push(module);
        key
    }

    /// Remove a module and renumber the later modules of its kind, rewriting
    /// every call to them.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::DanglingCall`] if another module still calls
    /// the one being removed; nothing is changed in that case.
    pub fn remove_module(&mut self, key: ModuleKey) -> GenomeResult<Module> {
        if self.module(key).is_none() {
            return Err(GenomeError::NoSuchModule(key));
        }
        let still_called = self
            .all_modules()
            .filter(|m| m.key() != key)
            .any(|m| m.calls().any(|(_, _, c)| c.key == key));
        if still_called {
            return Err(GenomeError::DanglingCall(key));
        }
        let removed = self.modules[key.kind.index()].remove(key.id);
        for (id, module) in self.modules[key.kind.index()].iter_mut().enumerate() {
            module.id = id;
        }
        for module in self.modules.iter_mut().flatten() {
            for branch in 0..module.branches().len() {
                module.edit_branch(branch, |tree| {
                    tree.edit_nodes(|node| {
                        if let Node::Call(call) = node
                            && call.key.kind == key.kind
                            && call.key.id > key.id
                        {
                            call.key.id -= 1;
                        }
                    })
                })?;
            }
        }
        Ok(removed)
    }

    /// Whether a branch of `caller` may call `callee`.
    #[must_use]
    pub fn may_call(&self, caller: ModuleKey, callee: ModuleKey) -> bool {
        self.hierarchy.allows(caller, callee)
    }

    /// Every existing module a branch of `caller` may call.
    #[must_use]
    pub fn callable_from(&self, caller: ModuleKey) -> Vec<ModuleKey> {
        self.all_modules()
            .map(Module::key)
            .filter(|callee| self.may_call(caller, *callee))
            .collect()
    }

    /// Every call to `target`, as sites in other modules and in `target`
    /// itself.
    #[must_use]
    pub fn call_sites(&self, target: ModuleKey) -> Vec<Site> {
        self.all_modules()
            .flat_map(|m| {
                m.calls().filter(|(_, _, c)| c.key == target).map(|(branch, node, _)| Site {
                    module: m.key(),
                    branch,
                    node,
                })
            })
            .collect()
    }

    /// Total node count.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.all_modules().map(Module::size).sum()
    }

    /// Depth of the deepest branch.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.all_modules().map(Module::depth).max().unwrap_or(0)
    }

    /// Check one node against the context of a branch of `caller` whose
    /// frame is `frame`.
    ///
    /// # Errors
    ///
    /// Returns the violation found: an argument outside the frame, a call to
    /// a missing or invisible module, or a stale call signature.
    pub fn check_node(&self, caller: ModuleKey, frame: &[ValueType], node: &Node) -> GenomeResult<()> {
        match node {
            Node::Primitive(_) => Ok(()),
            Node::Argument(a) => {
                if frame.get(a.index) == Some(&a.value_type) {
                    Ok(())
                } else {
                    Err(GenomeError::ArgumentMismatch {
                        module: caller,
                        index: a.index,
                    })
                }
            }
            Node::Call(call) => self.check_call(caller, call),
        }
    }

    fn check_call(&self, caller: ModuleKey, call: &Call) -> GenomeResult<()> {
        let target = self.module(call.key).ok_or(GenomeError::DanglingCall(call.key))?;
        if !self.may_call(caller, call.key) {
            return Err(GenomeError::NotVisible {
                caller,
                callee: call.key,
            });
        }
        if target.signature(call.access).as_ref() != Some(&call.signature) {
            return Err(GenomeError::SignatureMismatch(call.key));
        }
        Ok(())
    }

    /// Check every branch: children types, argument reads and calls.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> GenomeResult<()> {
        for (kind, list) in ModuleKind::ALL.iter().zip(&self.modules) {
            for (id, module) in list.iter().enumerate() {
                if module.kind() != *kind || module.id() != id {
                    return Err(GenomeError::NoSuchModule(ModuleKey::new(*kind, id)));
                }
                let frame = module.frame_types();
                for (b, branch) in module.branches().iter().enumerate() {
                    let tree = branch.tree();
                    tree.check_ready()?;
                    if Some(tree.return_type()) != module.branch_type(b) {
                        return Err(GenomeError::NoSuchBranch {
                            module: module.key(),
                            branch: b,
                        });
                    }
                    for node in tree.nodes() {
                        self.check_node(module.key(), &frame, node)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-derive module ids and branch metrics, then verify every binding.
    ///
    /// Idempotent: a second call changes nothing.
    ///
    /// # Errors
    ///
    /// Returns the first binding that does not resolve. Such a nucleus is
    /// corrupt and should be discarded.
    pub fn consolidate(&mut self) -> GenomeResult<()> {
        for list in &mut self.modules {
            for (id, module) in list.iter_mut().enumerate() {
                module.id = id;
                module.refresh_metrics();
            }
        }
        self.validate()
    }

    /// Bind the call at `site` to `target`, another module of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::RebindRejected`] unless `target` accepts the
    /// call's existing children and return type, and
    /// [`GenomeError::NotVisible`] if the owner may not call `target`. The
    /// old binding is kept on error.
    pub fn rebind_call(&mut self, site: Site, target: ModuleKey) -> GenomeResult<()> {
        let current = self
            .module(site.module)
            .ok_or(GenomeError::NoSuchModule(site.module))?
            .branch(site.branch)
            .ok_or(GenomeError::NoSuchBranch {
                module: site.module,
                branch: site.branch,
            })?
            .tree()
            .get(site.node)
            .ok_or(GenomeError::NoSuchNode(site.node.index()))?
            .as_call()
            .ok_or(GenomeError::NotACall(site.node.index()))?
            .clone();
        let rejected = GenomeError::RebindRejected {
            from: current.key,
            to: target,
        };
        if target.kind != current.key.kind {
            return Err(rejected);
        }
        let module = self.module(target).ok_or(GenomeError::NoSuchModule(target))?;
        if module.signature(current.access).as_ref() != Some(&current.signature) {
            debug!(from = %current.key, to = %target, "rebind rejected");
            return Err(rejected);
        }
        if !self.may_call(site.module, target) {
            return Err(GenomeError::NotVisible {
                caller: site.module,
                callee: target,
            });
        }
        let rebound = Call::new(target, current.access, current.signature);
        self.module_mut(site.module)
            .ok_or(GenomeError::NoSuchModule(site.module))?
            .edit_branch(site.branch, |tree| tree.replace_node(site.node, rebound.into()))?;
        Ok(())
    }

    /// Replace every node that does not resolve in its branch (dangling or
    /// invisible calls, stale signatures, reads outside the frame) with a
    /// freshly generated subtree of the same type, then consolidate.
    /// Returns the number of subtrees replaced.
    ///
    /// # Errors
    ///
    /// Fails if no replacement can be generated for some type, or if
    /// consolidation still fails afterwards.
    pub fn repair(&mut self, rng: &mut dyn RngCore) -> GenomeResult<usize> {
        let operator = Arc::clone(&self.operator);
        let mut repaired = 0;
        let keys: Vec<ModuleKey> = self.all_modules().map(Module::key).collect();
        for key in keys {
            let Some(module) = self.module(key) else {
                continue;
            };
            let frame = module.frame_types();
            let mut plans: Vec<(usize, NodeId, Tree)> = Vec::new();
            {
                let nodes = operator.node_set(self, key);
                for (b, branch) in module.branches().iter().enumerate() {
                    let tree = branch.tree();
                    for id in tree.ids() {
                        let node = tree.node(id);
                        if self.check_node(key, &frame, node).is_ok() {
                            continue;
                        }
                        let size = tree.subtree_size(id).max(1);
                        let replacement = operator.generate(&nodes, node.return_type(), size, rng)?;
                        plans.push((b, id, replacement));
                    }
                }
            }
            // Later nodes first so earlier ids stay valid.
            plans.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
            let module = self.module_mut(key).ok_or(GenomeError::NoSuchModule(key))?;
            for (branch, id, replacement) in plans {
                module.edit_branch(branch, |tree| tree.replace(id, replacement))?;
                repaired += 1;
            }
        }
        if repaired > 0 {
            warn!(repaired, "replaced unresolved nodes");
        }
        self.consolidate()?;
        Ok(repaired)
    }

    /// Combine two parents into a new genome.
    ///
    /// Module lists are merged position by position: where both parents have
    /// a module the policy decides, otherwise the one parent that has it
    /// contributes. Calls that no longer resolve are repaired and the result
    /// is consolidated. The child is bound to `a`'s operator.
    ///
    /// # Errors
    ///
    /// Fails if the merged genome cannot be repaired.
    pub fn merge(a: &Nucleus, b: &Nucleus, policy: MergePolicy, rng: &mut dyn RngCore) -> GenomeResult<Nucleus> {
        let mut child = Nucleus {
            modules: Default::default(),
            hierarchy: a.hierarchy,
            operator: Arc::clone(&a.operator),
        };
        for kind in ModuleKind::ALL {
            let (left, right) = (a.modules(kind), b.modules(kind));
            for id in 0..left.len().max(right.len()) {
                let chosen = match (left.get(id), right.get(id)) {
                    (Some(x), Some(y)) => match policy {
                        MergePolicy::FirstParent => x,
                        MergePolicy::Uniform => {
                            if rng.gen_bool(0.5) {
                                x
                            } else {
                                y
                            }
                        }
                    },
                    (Some(x), None) => x,
                    (None, Some(y)) => y,
                    (None, None) => continue,
                };
                child.push_module(chosen.clone());
            }
        }
        child.repair(rng)?;
        Ok(child)
    }
}

impl fmt::Display for Nucleus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, module) in self.all_modules().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{module}")?;
        }
        Ok(())
    }
}
