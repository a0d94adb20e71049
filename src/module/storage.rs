//! Storage cells (ADS).

// Real indices are rounded into slot positions
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use crate::error::{ExecError, ExecResult};
use crate::module::Module;
use crate::node::{Outcome, Signature};
use crate::runtime::Runtime;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Access discipline of a storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    /// A single slot; writes overwrite it, reads leave it in place.
    Variable,
    /// Writes push to the front, reads pop from the front.
    Stack,
    /// Writes push to the front, reads pop from the back.
    Queue,
    /// Indexed slots. Indices are clamped into range; a write one past the
    /// end appends while there is room.
    ArrayList,
}

impl StorageKind {
    /// Every storage kind.
    pub const ALL: [StorageKind; 4] = [
        StorageKind::Variable,
        StorageKind::Stack,
        StorageKind::Queue,
        StorageKind::ArrayList,
    ];
}

/// Configuration of a storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpec {
    /// Access discipline.
    pub kind: StorageKind,
    /// Capacity; writes beyond it are dropped.
    pub max_size: usize,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            kind: StorageKind::Variable,
            max_size: 8,
        }
    }
}

impl StorageSpec {
    /// Signature of a read from a cell holding `value_type`.
    #[must_use]
    pub fn read_signature(&self, value_type: ValueType) -> Signature {
        match self.kind {
            StorageKind::ArrayList => Signature::new(value_type, vec![ValueType::Real]),
            _ => Signature::new(value_type, Vec::new()),
        }
    }

    /// Signature of a write to a cell holding `value_type`. Writes return
    /// the value written.
    #[must_use]
    pub fn write_signature(&self, value_type: ValueType) -> Signature {
        match self.kind {
            StorageKind::ArrayList => Signature::new(value_type, vec![ValueType::Real, value_type]),
            _ => Signature::new(value_type, vec![value_type]),
        }
    }
}

/// Contents of one storage cell, front first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageState {
    items: VecDeque<Value>,
}

impl StorageState {
    /// Stored values, front first.
    pub fn items(&self) -> impl Iterator<Item = &Value> + '_ {
        self.items.iter()
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cell is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

/// Read from a storage cell. Empty cells yield the default value.
pub(crate) fn read(runtime: &mut Runtime, module: &Module, spec: &StorageSpec, args: &[Value]) -> ExecResult<Outcome> {
    let items = &mut runtime.storage_mut(module.id()).items;
    let value = match spec.kind {
        StorageKind::Variable => items.front().cloned(),
        StorageKind::Stack => items.pop_front(),
        StorageKind::Queue => items.pop_back(),
        StorageKind::ArrayList => {
            let index = index_argument(args, 0)?;
            if items.is_empty() {
                None
            } else {
                items.get(clamp(index, items.len() - 1)).cloned()
            }
        }
    };
    Ok(Outcome::free(
        value.unwrap_or_else(|| Value::default_for(module.return_type())),
    ))
}

/// Write to a storage cell, returning the written value. Writes to a full
/// cell are dropped.
pub(crate) fn write(runtime: &mut Runtime, module: &Module, spec: &StorageSpec, mut args: Vec<Value>) -> ExecResult<Outcome> {
    let value = args.pop().ok_or(ExecError::ArgumentCount {
        expected: spec.write_signature(module.return_type()).arg_types.len(),
        found: 0,
    })?;
    if value.value_type() != module.return_type() {
        return Err(ExecError::ValueType {
            expected: module.return_type(),
            found: value.value_type(),
        });
    }
    let items = &mut runtime.storage_mut(module.id()).items;
    match spec.kind {
        StorageKind::Variable => {
            items.clear();
            items.push_back(value.clone());
        }
        StorageKind::Stack | StorageKind::Queue => {
            if items.len() < spec.max_size {
                items.push_front(value.clone());
            }
        }
        StorageKind::ArrayList => {
            let position = clamp(index_argument(&args, 0)?, items.len());
            if position < items.len() {
                items[position] = value.clone();
            } else if items.len() < spec.max_size {
                items.push_back(value.clone());
            }
        }
    }
    Ok(Outcome::free(value))
}

fn index_argument(args: &[Value], i: usize) -> ExecResult<f64> {
    match args.get(i) {
        Some(Value::Real(x)) => Ok(*x),
        Some(other) => Err(ExecError::ValueType {
            expected: ValueType::Real,
            found: other.value_type(),
        }),
        None => Err(ExecError::ArgumentCount {
            expected: i + 1,
            found: args.len(),
        }),
    }
}

/// Round `index` into `0..=max`.
fn clamp(index: f64, max: usize) -> usize {
    if index.is_nan() || index <= 0.0 {
        0
    } else {
        (index.round() as usize).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: StorageKind, max_size: usize) -> (Module, StorageSpec) {
        let spec = StorageSpec { kind, max_size };
        (Module::storage(0, ValueType::Real, spec), spec)
    }

    fn put(runtime: &mut Runtime, module: &Module, spec: &StorageSpec, args: Vec<Value>) {
        write(runtime, module, spec, args).unwrap();
    }

    fn get(runtime: &mut Runtime, module: &Module, spec: &StorageSpec, args: &[Value]) -> Value {
        read(runtime, module, spec, args).unwrap().value
    }

    #[test]
    fn test_variable_keeps_last_write() {
        let (module, spec) = cell(StorageKind::Variable, 1);
        let mut runtime = Runtime::default();
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(0.0));
        put(&mut runtime, &module, &spec, vec![Value::Real(1.0)]);
        put(&mut runtime, &module, &spec, vec![Value::Real(2.0)]);
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(2.0));
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(2.0));
    }

    #[test]
    fn test_stack_and_queue_order() {
        let (module, spec) = cell(StorageKind::Stack, 4);
        let mut runtime = Runtime::default();
        for x in [1.0, 2.0, 3.0] {
            put(&mut runtime, &module, &spec, vec![Value::Real(x)]);
        }
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(3.0));
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(2.0));

        let (module, spec) = cell(StorageKind::Queue, 4);
        let mut runtime = Runtime::default();
        for x in [1.0, 2.0, 3.0] {
            put(&mut runtime, &module, &spec, vec![Value::Real(x)]);
        }
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(1.0));
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(2.0));
    }

    #[test]
    fn test_full_stack_drops_writes() {
        let (module, spec) = cell(StorageKind::Stack, 2);
        let mut runtime = Runtime::default();
        for x in [1.0, 2.0, 3.0] {
            let written = write(&mut runtime, &module, &spec, vec![Value::Real(x)]).unwrap();
            assert_eq!(written.value, Value::Real(x));
        }
        assert_eq!(runtime.storage(0).unwrap().len(), 2);
        assert_eq!(get(&mut runtime, &module, &spec, &[]), Value::Real(2.0));
    }

    #[test]
    fn test_array_list_clamps() {
        let (module, spec) = cell(StorageKind::ArrayList, 2);
        let mut runtime = Runtime::default();
        assert_eq!(get(&mut runtime, &module, &spec, &[Value::Real(5.0)]), Value::Real(0.0));

        put(&mut runtime, &module, &spec, vec![Value::Real(9.0), Value::Real(1.0)]);
        put(&mut runtime, &module, &spec, vec![Value::Real(9.0), Value::Real(2.0)]);
        // Full: a write past the end is ignored.
        put(&mut runtime, &module, &spec, vec![Value::Real(9.0), Value::Real(3.0)]);
        assert_eq!(runtime.storage(0).unwrap().len(), 2);

        assert_eq!(get(&mut runtime, &module, &spec, &[Value::Real(-4.0)]), Value::Real(1.0));
        assert_eq!(get(&mut runtime, &module, &spec, &[Value::Real(40.0)]), Value::Real(2.0));

        put(&mut runtime, &module, &spec, vec![Value::Real(0.2), Value::Real(7.0)]);
        assert_eq!(get(&mut runtime, &module, &spec, &[Value::Real(0.0)]), Value::Real(7.0));
    }

    #[test]
    fn test_write_rejects_wrong_type() {
        let (module, spec) = cell(StorageKind::Variable, 1);
        let mut runtime = Runtime::default();
        assert!(write(&mut runtime, &module, &spec, vec![Value::Boolean(true)]).is_err());
    }
}
