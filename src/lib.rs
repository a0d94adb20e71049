// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! cellgp: typed genetic programming with architecture-altering modules.
//!
//! Candidate programs are genomes of typed expression trees. A genome
//! ([`Nucleus`]) holds one or more main programs plus modules that the
//! programs call: functions, bounded recursions, bounded loops, iterators
//! over external collections and storage cells. Every variation operator
//! keeps the genome type-safe and every call bound to an existing, visible
//! module.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ GeneticOperator                             │
//! │   crossover · mutation · alteration · init  │
//! ├─────────────────────────────────────────────┤
//! │ Nucleus: modules by kind, visibility        │
//! │   Module: branches of Tree, Behavior        │
//! ├─────────────────────────────────────────────┤
//! │ Cell: Nucleus + Runtime → Executor          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Randomness is always passed in explicitly, so a seeded
//! `rand::rngs::SmallRng` reproduces a run exactly.

pub mod cell;
pub mod config;
pub mod error;
pub mod fitness;
pub mod module;
pub mod node;
pub mod nucleus;
pub mod operator;
pub mod runtime;
pub mod tree;
pub mod value;

pub use cell::Cell;
pub use config::{ConfigError, OperatorConfig};
pub use error::{ExecError, ExecResult, GenomeError, GenomeResult};
pub use fitness::{FitnessDirection, FitnessFunction, Individual};
pub use module::{Module, ModuleKey, ModuleKind};
pub use node::{Node, Outcome, Primitive, PrimitiveSet};
pub use nucleus::Nucleus;
pub use operator::{GeneticOperator, ProgramShape};
pub use tree::{NodeId, Tree};
pub use value::{Value, ValueType};
