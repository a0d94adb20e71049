//! Constant terminals.

use crate::error::ExecResult;
use crate::node::Primitive;
use crate::runtime::Args;
use crate::value::{Value, ValueType};
use rand::{Rng, RngCore};

/// How a constant prototype draws values for new trees.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Draw {
    /// Always the stored value.
    Fixed,
    /// A random value of the stored type.
    Random,
    /// A uniform real in `[low, high)`.
    Range(f64, f64),
}

/// A terminal returning a stored value.
///
/// Used both as an ephemeral random constant in primitive sets and as the
/// folded result of a shrink mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: Value,
    draw: Draw,
}

impl Constant {
    /// A constant that always holds `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            draw: Draw::Fixed,
        }
    }

    /// An ephemeral constant drawing a random value of `value_type` each
    /// time it is spawned into a tree.
    #[must_use]
    pub fn ephemeral(value_type: ValueType) -> Self {
        Self {
            value: Value::default_for(value_type),
            draw: Draw::Random,
        }
    }

    /// An ephemeral real constant drawn uniformly from `[low, high)`.
    #[must_use]
    pub fn real_range(low: f64, high: f64) -> Self {
        Self {
            value: Value::Real(low),
            draw: Draw::Range(low, high),
        }
    }

    /// The stored value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Primitive for Constant {
    fn name(&self) -> &str {
        "Constant"
    }

    fn return_type(&self) -> ValueType {
        self.value.value_type()
    }

    fn arg_types(&self) -> &[ValueType] {
        &[]
    }

    fn execute(&self, _args: &mut Args<'_, '_>) -> ExecResult<Value> {
        Ok(self.value.clone())
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(self.clone())
    }

    fn spawn(&self, rng: &mut dyn RngCore) -> Box<dyn Primitive> {
        let value = match self.draw {
            Draw::Fixed => self.value.clone(),
            Draw::Random => Value::random(self.value.value_type(), rng),
            Draw::Range(low, high) if low < high => Value::Real(rng.gen_range(low..high)),
            Draw::Range(low, _) => Value::Real(low),
        };
        Box::new(Self {
            value,
            draw: self.draw,
        })
    }

    fn mutated_copy(&self, rng: &mut dyn RngCore) -> Option<Box<dyn Primitive>> {
        let mut value = self.value.clone();
        value.mutate(rng);
        Some(Box::new(Self {
            value,
            draw: self.draw,
        }))
    }

    fn constant_value(&self) -> Option<&Value> {
        Some(&self.value)
    }

    fn describe(&self) -> String {
        self.value.to_string()
    }
}
