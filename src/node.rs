//! Tree nodes.
//!
//! A tree node is one of three things:
//!
//! - a [`Primitive`]: a user-extensible function or terminal with a fixed
//!   signature (arithmetic, logic, constants, ...),
//! - an [`ArgumentRef`]: a read of the enclosing module's frame,
//! - a [`Call`]: a proxy that reaches a module of the nucleus through its
//!   [`ModuleKey`] instead of a direct reference, so module bodies can be
//!   swapped, renumbered or copied without touching the calling trees.
//!
//! Primitive libraries are an open extension point, the structural node
//! kinds are closed.

mod arithmetic;
mod constant;
mod logic;
mod vector;

pub use arithmetic::{Cosine, Maximum, Minimum, Multiply, Negate, ProtectedDivide, Sine, Subtract, Sum};
pub use constant::Constant;
pub use logic::{And, Greater, IfElse, Less, Not, Or};
pub use vector::{VectorComponent, VectorNorm, VectorScale};

use crate::error::ExecResult;
use crate::module::ModuleKey;
use crate::runtime::Args;
use crate::value::{Value, ValueType};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// Result of executing a node: a value plus the accumulated cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Produced value.
    pub value: Value,
    /// Cost of producing it, additive over child executions.
    pub cost: u64,
}

impl Outcome {
    /// Create an outcome.
    #[must_use]
    pub fn new(value: Value, cost: u64) -> Self {
        Self { value, cost }
    }

    /// An outcome that cost nothing.
    #[must_use]
    pub fn free(value: Value) -> Self {
        Self { value, cost: 0 }
    }
}

/// A typed function or terminal supplied by a problem domain.
///
/// Implementations must be cheap to clone; generation and replication clone
/// primitives freely. Children are evaluated on demand through [`Args`], so
/// conditionals only pay for the branch they take.
pub trait Primitive: fmt::Debug + Send + Sync {
    /// Stable name, used for matching and display.
    fn name(&self) -> &str;

    /// Type of the produced value.
    fn return_type(&self) -> ValueType;

    /// Types of the children, in order.
    fn arg_types(&self) -> &[ValueType];

    /// Compute the node's value.
    ///
    /// # Errors
    ///
    /// Returns an error if a child fails or the inputs are outside the
    /// primitive's domain.
    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value>;

    /// Fixed cost added on top of the children's costs.
    fn overhead(&self) -> u64 {
        self.arg_types().len() as u64
    }

    /// Clone behind a box.
    fn boxed_clone(&self) -> Box<dyn Primitive>;

    /// Fresh instance for a newly generated tree. Ephemeral constants draw
    /// a new value here; everything else returns a plain copy.
    fn spawn(&self, _rng: &mut dyn RngCore) -> Box<dyn Primitive> {
        self.boxed_clone()
    }

    /// A perturbed copy of this node, if the node knows how to vary itself.
    ///
    /// Returning `None` lets the mutation operator pick a structurally
    /// matching replacement instead.
    fn mutated_copy(&self, _rng: &mut dyn RngCore) -> Option<Box<dyn Primitive>> {
        None
    }

    /// The stored value, for constants.
    fn constant_value(&self) -> Option<&Value> {
        None
    }

    /// Text shown when rendering a tree.
    fn describe(&self) -> String {
        self.name().to_owned()
    }
}

impl Clone for Box<dyn Primitive> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Reference to a slot of the enclosing module's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentRef {
    /// Frame index.
    pub index: usize,
    /// Declared type of the slot.
    pub value_type: ValueType,
}

/// How a call reaches its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Invoke a function, recursion, loop or iterator.
    Invoke,
    /// Read from a storage module.
    Read,
    /// Write to a storage module.
    Write,
}

/// Return and argument types of a call target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Type of the value returned.
    pub return_type: ValueType,
    /// Types of the arguments, in order.
    pub arg_types: Vec<ValueType>,
}

impl Signature {
    /// Create a signature.
    #[must_use]
    pub fn new(return_type: ValueType, arg_types: Vec<ValueType>) -> Self {
        Self {
            return_type,
            arg_types,
        }
    }
}

/// A proxy node bound to a module by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target module.
    pub key: ModuleKey,
    /// Access path.
    pub access: Access,
    /// Cached signature of the target, refreshed on consolidation.
    pub signature: Signature,
}

impl Call {
    /// Create a call.
    #[must_use]
    pub fn new(key: ModuleKey, access: Access, signature: Signature) -> Self {
        Self {
            key,
            access,
            signature,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access {
            Access::Invoke => write!(f, "{}", self.key),
            Access::Read => write!(f, "{}.read", self.key),
            Access::Write => write!(f, "{}.write", self.key),
        }
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Domain function or terminal.
    Primitive(Box<dyn Primitive>),
    /// Read of the module frame.
    Argument(ArgumentRef),
    /// Proxy to a module.
    Call(Call),
}

impl Node {
    /// Wrap a primitive.
    #[must_use]
    pub fn primitive(p: impl Primitive + 'static) -> Self {
        Node::Primitive(Box::new(p))
    }

    /// Frame read.
    #[must_use]
    pub fn argument(index: usize, value_type: ValueType) -> Self {
        Node::Argument(ArgumentRef { index, value_type })
    }

    /// Type of the produced value.
    #[must_use]
    pub fn return_type(&self) -> ValueType {
        match self {
            Node::Primitive(p) => p.return_type(),
            Node::Argument(a) => a.value_type,
            Node::Call(c) => c.signature.return_type,
        }
    }

    /// Types the children must return, in order.
    #[must_use]
    pub fn arg_types(&self) -> &[ValueType] {
        match self {
            Node::Primitive(p) => p.arg_types(),
            Node::Argument(_) => &[],
            Node::Call(c) => &c.signature.arg_types,
        }
    }

    /// Number of children.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arg_types().len()
    }

    /// Whether the node takes no children.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.arity() == 0
    }

    /// Fixed cost added on top of the children's costs.
    #[must_use]
    pub fn overhead(&self) -> u64 {
        match self {
            Node::Primitive(p) => p.overhead(),
            Node::Argument(_) => 0,
            Node::Call(c) => c.signature.arg_types.len() as u64,
        }
    }

    /// Same type for crossover and mutation purposes: equal return types.
    #[must_use]
    pub fn same_type(&self, other: &Node) -> bool {
        self.return_type() == other.return_type()
    }

    /// Same return type and identical argument types, so the children of
    /// one can be reattached to the other.
    #[must_use]
    pub fn same_signature(&self, other: &Node) -> bool {
        self.return_type() == other.return_type() && self.arg_types() == other.arg_types()
    }

    /// Name used for matching. Constants share their primitive name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Node::Primitive(p) => p.name().to_owned(),
            Node::Argument(a) => format!("ARG{}", a.index),
            Node::Call(c) => c.to_string(),
        }
    }

    /// The call, if this node is one.
    #[must_use]
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Node::Call(c) => Some(c),
            _ => None,
        }
    }

    /// The frame reference, if this node is one.
    #[must_use]
    pub fn as_argument(&self) -> Option<&ArgumentRef> {
        match self {
            Node::Argument(a) => Some(a),
            _ => None,
        }
    }

    /// Fresh instance of this node used as a generation prototype.
    #[must_use]
    pub fn spawn(&self, rng: &mut dyn RngCore) -> Node {
        match self {
            Node::Primitive(p) => Node::Primitive(p.spawn(rng)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Primitive(p) => write!(f, "{}", p.describe()),
            Node::Argument(a) => write!(f, "ARG{}", a.index),
            Node::Call(c) => write!(f, "{c}"),
        }
    }
}

impl From<Call> for Node {
    fn from(call: Call) -> Self {
        Node::Call(call)
    }
}

/// The function and terminal library a genetic operator generates from.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveSet {
    primitives: Vec<Arc<dyn Primitive>>,
}

impl PrimitiveSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primitive.
    #[must_use]
    pub fn with(mut self, primitive: impl Primitive + 'static) -> Self {
        self.primitives.push(Arc::new(primitive));
        self
    }

    /// Add a shared primitive.
    pub fn push(&mut self, primitive: Arc<dyn Primitive>) {
        self.primitives.push(primitive);
    }

    /// Real arithmetic: `Sum`, `Subtract`, `Multiply`, `ProtectedDivide`
    /// and ephemeral constants in `[-1, 1)`.
    #[must_use]
    pub fn arithmetic() -> Self {
        Self::new()
            .with(Sum)
            .with(Subtract)
            .with(Multiply)
            .with(ProtectedDivide)
            .with(Constant::real_range(-1.0, 1.0))
    }

    /// Arithmetic plus trigonometry, comparisons, boolean logic,
    /// conditionals and vector reductions.
    #[must_use]
    pub fn standard() -> Self {
        Self::arithmetic()
            .with(Minimum)
            .with(Maximum)
            .with(Negate)
            .with(Sine)
            .with(Cosine)
            .with(Greater)
            .with(Less)
            .with(And)
            .with(Or)
            .with(Not)
            .with(IfElse)
            .with(Constant::ephemeral(ValueType::Boolean))
            .with(VectorNorm)
            .with(VectorComponent)
            .with(VectorScale)
    }

    /// The primitives, in insertion order.
    #[must_use]
    pub fn primitives(&self) -> &[Arc<dyn Primitive>] {
        &self.primitives
    }

    /// Number of primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;

    #[test]
    fn test_node_signatures() {
        let sum = Node::primitive(Sum);
        assert_eq!(sum.return_type(), ValueType::Real);
        assert_eq!(sum.arity(), 2);
        assert_eq!(sum.overhead(), 2);

        let arg = Node::argument(1, ValueType::Boolean);
        assert!(arg.is_terminal());
        assert_eq!(arg.overhead(), 0);
        assert_eq!(arg.to_string(), "ARG1");
    }

    #[test]
    fn test_same_signature() {
        let sum = Node::primitive(Sum);
        let sub = Node::primitive(Subtract);
        let neg = Node::primitive(Negate);
        assert!(sum.same_signature(&sub));
        assert!(sum.same_type(&neg));
        assert!(!sum.same_signature(&neg));
    }

    #[test]
    fn test_call_display() {
        let key = ModuleKey::new(ModuleKind::Storage, 2);
        let call = Call::new(key, Access::Write, Signature::new(ValueType::Real, vec![ValueType::Real]));
        assert_eq!(Node::from(call).to_string(), "ADS2.write");
    }

    #[test]
    fn test_standard_set_contains_arithmetic() {
        let set = PrimitiveSet::standard();
        assert!(set.len() > PrimitiveSet::arithmetic().len());
        assert!(set.primitives().iter().any(|p| p.name() == "ProtectedDivide"));
    }
}
