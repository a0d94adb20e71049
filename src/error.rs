//! Error types for genome construction, editing and execution.

use crate::module::ModuleKey;
use crate::value::ValueType;
use thiserror::Error;

/// Structural and type violations raised while building or editing a genome.
///
/// These are contract violations: the operation that raised one is rejected
/// and the genome is left as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GenomeError {
    /// A subtree or child has the wrong return type for its position.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type required by the position.
        expected: ValueType,
        /// Type actually supplied.
        found: ValueType,
    },
    /// A node received a different number of children than its arity.
    #[error("arity mismatch: expected {expected} children, found {found}")]
    ArityMismatch {
        /// Declared arity.
        expected: usize,
        /// Children supplied.
        found: usize,
    },
    /// A pre-order node sequence does not describe exactly one tree.
    #[error("malformed tree: {0}")]
    MalformedTree(&'static str),
    /// A call references a module that is not present in the nucleus.
    #[error("dangling call to {0}")]
    DanglingCall(ModuleKey),
    /// A call could not be bound to a module because the signatures differ.
    #[error("rebind of call to {to} rejected: signature incompatible with existing children")]
    RebindRejected {
        /// Module the call is bound to.
        from: ModuleKey,
        /// Module the call was to be bound to.
        to: ModuleKey,
    },
    /// A call's cached signature differs from its module's current one.
    #[error("call to {0} does not match the module signature")]
    SignatureMismatch(ModuleKey),
    /// An argument node does not match the frame of its enclosing module.
    #[error("argument {index} of {module} does not match the module frame")]
    ArgumentMismatch {
        /// Module owning the branch.
        module: ModuleKey,
        /// Offending frame index.
        index: usize,
    },
    /// A branch calls a module it is not allowed to see.
    #[error("{caller} may not call {callee}")]
    NotVisible {
        /// Module owning the branch.
        caller: ModuleKey,
        /// Module referenced by the call.
        callee: ModuleKey,
    },
    /// No tree of the requested type can be built from the node set.
    #[error("cannot generate a tree returning {0}")]
    GenerationFailed(ValueType),
    /// The requested module does not exist.
    #[error("no module {0}")]
    NoSuchModule(ModuleKey),
    /// The requested branch does not exist on the module.
    #[error("module {module} has no branch {branch}")]
    NoSuchBranch {
        /// Module addressed.
        module: ModuleKey,
        /// Branch index requested.
        branch: usize,
    },
    /// A node id does not address a node of the tree.
    #[error("node {0} is out of range")]
    NoSuchNode(usize),
    /// The edit requires a call node at the addressed position.
    #[error("node {0} is not a call")]
    NotACall(usize),
}

/// Failures raised while executing a tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// A module or program was invoked with the wrong number of arguments.
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount {
        /// Declared number of arguments.
        expected: usize,
        /// Number supplied.
        found: usize,
    },
    /// An argument node read past the current frame.
    #[error("argument {0} is not bound")]
    UnboundArgument(usize),
    /// A value of the wrong type reached a primitive.
    #[error("expected a {expected} value, found {found}")]
    ValueType {
        /// Type the primitive consumes.
        expected: ValueType,
        /// Type it received.
        found: ValueType,
    },
    /// The call target does not exist.
    #[error("unknown module {0}")]
    UnknownModule(ModuleKey),
    /// The call target cannot be invoked through the given access.
    #[error("module {0} is not callable this way")]
    NotCallable(ModuleKey),
    /// There is no main program with the given index.
    #[error("no program {0}")]
    NoSuchProgram(usize),
    /// Module calls nested deeper than the configured limit.
    #[error("call depth exceeded {0}")]
    CallDepthExceeded(usize),
    /// A collection record does not match the iterator's field types.
    #[error("record {record} of collection {collection} does not match the iterator fields")]
    RecordShape {
        /// Collection id.
        collection: usize,
        /// Index of the offending record.
        record: usize,
    },
    /// The tree itself is inconsistent.
    #[error(transparent)]
    Genome(#[from] GenomeError),
    /// A primitive could not produce a value.
    #[error("{0}")]
    Domain(String),
}

/// Result type for genome editing operations.
pub type GenomeResult<T> = Result<T, GenomeError>;

/// Result type for tree execution.
pub type ExecResult<T> = Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;

    #[test]
    fn test_error_messages() {
        let err = GenomeError::DanglingCall(ModuleKey::new(ModuleKind::Function, 3));
        assert_eq!(err.to_string(), "dangling call to ADF3");

        let err = ExecError::ArgumentCount {
            expected: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "expected 2 arguments, got 1");
    }

    #[test]
    fn test_genome_error_converts() {
        let err: ExecError = GenomeError::NoSuchNode(4).into();
        assert!(matches!(err, ExecError::Genome(GenomeError::NoSuchNode(4))));
    }
}
