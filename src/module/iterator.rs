//! Collection iterators (ADI).

// Element indices and lengths are exposed to trees as reals
#![allow(clippy::cast_precision_loss)]

use crate::error::{ExecError, ExecResult};
use crate::module::Module;
use crate::node::Outcome;
use crate::runtime::Executor;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

const BODY: usize = 0;

/// Which collection an iterator folds over and what its records hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IteratorSpec {
    /// Index into the collections supplied per execution.
    pub collection: usize,
    /// Field types of every record.
    pub fields: Vec<ValueType>,
    /// Calls after which the last result is returned without iterating.
    pub max_calls: usize,
}

/// Per-execution state of one iterator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IteratorState {
    /// Calls made in the current execution.
    pub calls: usize,
    /// Result of the most recent fold.
    pub last_value: Option<Value>,
}

impl IteratorState {
    pub(crate) fn reset(&mut self) {
        self.calls = 0;
        self.last_value = None;
    }
}

/// Call an iterator.
///
/// The body is folded over every record of the attached collection. Each
/// step sees the call arguments, the record fields, the element index, the
/// collection length and the accumulator, which starts at the default value
/// of the return type. With the call budget spent or no records attached,
/// the last result (initially that default) is returned at no cost.
pub(crate) fn invoke(exec: &mut Executor<'_>, module: &Module, spec: &IteratorSpec, args: Vec<Value>) -> ExecResult<Outcome> {
    let records = exec.collection(spec.collection);
    let state = exec.runtime().iterator(module.id());
    if state.calls >= spec.max_calls || records.is_empty() {
        let last = state
            .last_value
            .clone()
            .unwrap_or_else(|| Value::default_for(module.return_type()));
        return Ok(Outcome::free(last));
    }
    state.calls += 1;

    let length = Value::Real(records.len() as f64);
    let mut accumulator = Value::default_for(module.return_type());
    let mut cost = 0;
    for (index, record) in records.iter().enumerate() {
        let matches = record.len() == spec.fields.len()
            && record.iter().zip(&spec.fields).all(|(v, t)| v.value_type() == *t);
        if !matches {
            return Err(ExecError::RecordShape {
                collection: spec.collection,
                record: index,
            });
        }
        let mut frame = Vec::with_capacity(args.len() + record.len() + 3);
        frame.extend_from_slice(&args);
        frame.extend_from_slice(record);
        frame.push(Value::Real(index as f64));
        frame.push(length.clone());
        frame.push(accumulator);
        let step = exec.eval_branch(module, BODY, frame)?;
        cost += step.cost;
        accumulator = step.value;
    }

    exec.runtime().iterator(module.id()).last_value = Some(accumulator.clone());
    Ok(Outcome::new(accumulator, cost))
}
