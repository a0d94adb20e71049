//! Execution entry point of an individual.

use crate::error::ExecResult;
use crate::node::Outcome;
use crate::nucleus::Nucleus;
use crate::runtime::{Collection, ExecConfig, Executor, Runtime};
use crate::value::Value;
use tracing::trace;

/// A nucleus together with its execution state.
///
/// Every top-level execution starts from cleared recursion, loop and
/// iterator counters. Storage contents persist across executions of the
/// same cell until [`Cell::clear_storage`].
#[derive(Debug, Clone)]
pub struct Cell {
    nucleus: Nucleus,
    runtime: Runtime,
    config: ExecConfig,
    last_cost: Option<u64>,
}

impl Cell {
    /// Wrap a nucleus with default execution limits.
    #[must_use]
    pub fn new(nucleus: Nucleus) -> Self {
        Self::with_config(nucleus, ExecConfig::default())
    }

    /// Wrap a nucleus with explicit execution limits.
    #[must_use]
    pub fn with_config(nucleus: Nucleus, config: ExecConfig) -> Self {
        let runtime = Runtime::for_nucleus(&nucleus);
        Self {
            nucleus,
            runtime,
            config,
            last_cost: None,
        }
    }

    /// The genome.
    #[must_use]
    pub fn nucleus(&self) -> &Nucleus {
        &self.nucleus
    }

    /// Mutable access to the genome. Storage is cleared, since its modules
    /// may change.
    pub fn nucleus_mut(&mut self) -> &mut Nucleus {
        self.runtime = Runtime::default();
        self.last_cost = None;
        &mut self.nucleus
    }

    /// Unwrap the genome.
    #[must_use]
    pub fn into_nucleus(self) -> Nucleus {
        self.nucleus
    }

    /// Execution state, for inspecting storage contents.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run main program `program` with `args`. `collections[i]` is the
    /// collection iterators declared on collection `i` fold over; missing
    /// collections count as empty.
    ///
    /// # Errors
    ///
    /// Fails if the program does not exist, the arguments do not match, or
    /// execution fails.
    pub fn execute(&mut self, program: usize, args: &[Value], collections: &[Collection]) -> ExecResult<Outcome> {
        self.runtime.reset(&self.nucleus);
        let mut exec = Executor::new(&self.nucleus, &mut self.runtime, collections, &self.config);
        let outcome = exec.run_program(program, args.to_vec())?;
        trace!(program, cost = outcome.cost, "executed");
        self.last_cost = Some(outcome.cost);
        Ok(outcome)
    }

    /// Like [`Cell::execute`], but a failure yields `None`.
    pub fn execute_unconditionally(&mut self, program: usize, args: &[Value], collections: &[Collection]) -> Option<Outcome> {
        match self.execute(program, args, collections) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                trace!(program, %err, "execution failed");
                self.last_cost = None;
                None
            }
        }
    }

    /// Empty every storage module.
    pub fn clear_storage(&mut self) {
        self.runtime.clear_storage();
    }

    /// Cost of the last successful execution.
    #[must_use]
    pub fn last_cost(&self) -> Option<u64> {
        self.last_cost
    }

    /// Depth of the deepest branch.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.nucleus.max_depth()
    }

    /// Total node count.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.nucleus.total_size()
    }
}

impl From<Nucleus> for Cell {
    fn from(nucleus: Nucleus) -> Self {
        Self::new(nucleus)
    }
}
