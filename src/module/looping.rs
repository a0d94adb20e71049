//! Loops (ADL).

use crate::error::ExecResult;
use crate::module::Module;
use crate::node::Outcome;
use crate::runtime::Executor;
use crate::value::Value;
use serde::{Deserialize, Serialize};

const INITIALIZATION: usize = 0;
const CONDITION: usize = 1;
const BODY: usize = 2;

/// Budgets of a loop within one top-level execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLimits {
    /// Maximum body evaluations per call.
    pub max_iterations: usize,
    /// Calls after which the last result is returned without looping.
    pub max_calls: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            max_calls: 16,
        }
    }
}

/// Per-execution state of one loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopState {
    /// Calls made in the current execution.
    pub calls: usize,
    /// Result of the most recent completed call.
    pub last_value: Option<Value>,
}

impl LoopState {
    pub(crate) fn reset(&mut self) {
        self.calls = 0;
        self.last_value = None;
    }
}

/// Call a loop.
///
/// The initialization branch sets the loop value, then condition and body
/// alternate until the condition is not positive or the iteration budget is
/// spent. Branches see the call arguments followed by the iteration index
/// and the current loop value. A call past the call budget returns the last
/// result at no cost.
pub(crate) fn invoke(exec: &mut Executor<'_>, module: &Module, limits: &LoopLimits, args: Vec<Value>) -> ExecResult<Outcome> {
    let state = exec.runtime().looping(module.id());
    if state.calls >= limits.max_calls {
        let last = state
            .last_value
            .clone()
            .unwrap_or_else(|| Value::default_for(module.return_type()));
        return Ok(Outcome::free(last));
    }
    state.calls += 1;

    let start = Value::default_for(module.return_type());
    let init = exec.eval_branch(module, INITIALIZATION, frame(&args, 0, start))?;
    let mut cost = init.cost;
    let mut current = init.value;
    let mut index = 0;
    while index < limits.max_iterations {
        let condition = exec.eval_branch(module, CONDITION, frame(&args, index, current.clone()))?;
        cost += condition.cost;
        if !condition.value.truthy() {
            break;
        }
        let body = exec.eval_branch(module, BODY, frame(&args, index, current))?;
        cost += body.cost;
        current = body.value;
        index += 1;
    }

    exec.runtime().looping(module.id()).last_value = Some(current.clone());
    Ok(Outcome::new(current, cost))
}

// Loop counters stay far below f64's exact integer range
#[allow(clippy::cast_precision_loss)]
fn frame(args: &[Value], index: usize, current: Value) -> Vec<Value> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.extend_from_slice(args);
    frame.push(Value::Real(index as f64));
    frame.push(current);
    frame
}
