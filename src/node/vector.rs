//! Vector primitives.

// Component lookup rounds a real index with intentional casts
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use crate::error::ExecResult;
use crate::node::Primitive;
use crate::runtime::Args;
use crate::value::{Value, ValueType};

const VECTOR_ONE: [ValueType; 1] = [ValueType::Vector];
const VECTOR_REAL: [ValueType; 2] = [ValueType::Vector, ValueType::Real];

/// Euclidean norm of a vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorNorm;

impl Primitive for VectorNorm {
    fn name(&self) -> &str {
        "VectorNorm"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Real
    }

    fn arg_types(&self) -> &[ValueType] {
        &VECTOR_ONE
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let v = args.vector(0)?;
        Ok(Value::Real(v.iter().map(|x| x * x).sum::<f64>().sqrt()))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// Component of a vector at a real index, rounded and clamped into range.
/// The empty vector yields `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorComponent;

impl Primitive for VectorComponent {
    fn name(&self) -> &str {
        "VectorComponent"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Real
    }

    fn arg_types(&self) -> &[ValueType] {
        &VECTOR_REAL
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let v = args.vector(0)?;
        let index = args.real(1)?;
        if v.is_empty() {
            return Ok(Value::Real(0.0));
        }
        let i = if index.is_nan() {
            0
        } else {
            index.round().clamp(0.0, (v.len() - 1) as f64) as usize
        };
        Ok(Value::Real(v[i]))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// Vector scaled by a real.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorScale;

impl Primitive for VectorScale {
    fn name(&self) -> &str {
        "VectorScale"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Vector
    }

    fn arg_types(&self) -> &[ValueType] {
        &VECTOR_REAL
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let v = args.vector(0)?;
        let k = args.real(1)?;
        Ok(Value::Vector(v.into_iter().map(|x| x * k).collect()))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}
