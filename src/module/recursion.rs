//! Recursions (ADR).

use crate::error::ExecResult;
use crate::module::Module;
use crate::node::Outcome;
use crate::runtime::Executor;
use crate::value::Value;
use serde::{Deserialize, Serialize};

const CONDITION: usize = 0;
const BODY: usize = 1;
const GROUND: usize = 2;

/// Budgets of a recursion within one top-level execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursionLimits {
    /// Nesting level beyond which the ground branch is taken.
    pub max_recursion_depth: usize,
    /// Calls after which every further call takes the ground branch.
    pub max_calls: usize,
}

impl Default for RecursionLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 4,
            max_calls: 32,
        }
    }
}

/// Per-execution counters of one recursion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecursionState {
    /// Calls made in the current execution.
    pub calls: usize,
    /// Current nesting level.
    pub depth: usize,
    /// Ground branches entered on an exhausted budget and not yet left.
    pub grounding: usize,
}

impl RecursionState {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Call a recursion.
///
/// While the budgets allow it the condition is evaluated and selects the body
/// (positive) or the ground branch. Once the call budget is spent or the
/// nesting level passes the depth limit, the ground branch is evaluated
/// directly. A call reached from inside such a ground evaluation returns the
/// default of the return type, so exhaustion never recurses further.
pub(crate) fn invoke(exec: &mut Executor<'_>, module: &Module, limits: &RecursionLimits, args: Vec<Value>) -> ExecResult<Outcome> {
    let state = exec.runtime().recursion(module.id());
    if state.grounding > 0 {
        return Ok(Outcome::free(Value::default_for(module.return_type())));
    }
    if state.calls >= limits.max_calls {
        return ground(exec, module, args);
    }
    state.calls += 1;
    state.depth += 1;
    let depth = state.depth;

    let result = if depth <= limits.max_recursion_depth {
        exec.eval_branch(module, CONDITION, args.clone()).and_then(|condition| {
            let branch = if condition.value.truthy() { BODY } else { GROUND };
            let outcome = exec.eval_branch(module, branch, args)?;
            Ok(Outcome::new(outcome.value, condition.cost + outcome.cost))
        })
    } else {
        ground(exec, module, args)
    };

    let state = exec.runtime().recursion(module.id());
    state.depth = state.depth.saturating_sub(1);
    result
}

/// Evaluate the ground branch on an exhausted budget.
fn ground(exec: &mut Executor<'_>, module: &Module, args: Vec<Value>) -> ExecResult<Outcome> {
    exec.runtime().recursion(module.id()).grounding += 1;
    let result = exec.eval_branch(module, GROUND, args);
    let state = exec.runtime().recursion(module.id());
    state.grounding = state.grounding.saturating_sub(1);
    result
}
