//! Comparisons, boolean connectives and conditionals.

use crate::error::ExecResult;
use crate::node::Primitive;
use crate::runtime::Args;
use crate::value::{Value, ValueType};

const REAL_PAIR: [ValueType; 2] = [ValueType::Real, ValueType::Real];
const BOOL_ONE: [ValueType; 1] = [ValueType::Boolean];
const BOOL_PAIR: [ValueType; 2] = [ValueType::Boolean, ValueType::Boolean];
const IF_ELSE: [ValueType; 3] = [ValueType::Boolean, ValueType::Real, ValueType::Real];

/// `a > b`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Greater;

impl Primitive for Greater {
    fn name(&self) -> &str {
        "Greater"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn arg_types(&self) -> &[ValueType] {
        &REAL_PAIR
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let a = args.real(0)?;
        let b = args.real(1)?;
        Ok(Value::Boolean(a > b))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// `a < b`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Less;

impl Primitive for Less {
    fn name(&self) -> &str {
        "Less"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn arg_types(&self) -> &[ValueType] {
        &REAL_PAIR
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let a = args.real(0)?;
        let b = args.real(1)?;
        Ok(Value::Boolean(a < b))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// Logical conjunction. Both operands are always evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct And;

impl Primitive for And {
    fn name(&self) -> &str {
        "And"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn arg_types(&self) -> &[ValueType] {
        &BOOL_PAIR
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let a = args.boolean(0)?;
        let b = args.boolean(1)?;
        Ok(Value::Boolean(a && b))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// Logical disjunction. Both operands are always evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Or;

impl Primitive for Or {
    fn name(&self) -> &str {
        "Or"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn arg_types(&self) -> &[ValueType] {
        &BOOL_PAIR
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        let a = args.boolean(0)?;
        let b = args.boolean(1)?;
        Ok(Value::Boolean(a || b))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// Logical negation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Not;

impl Primitive for Not {
    fn name(&self) -> &str {
        "Not"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn arg_types(&self) -> &[ValueType] {
        &BOOL_ONE
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        Ok(Value::Boolean(!args.boolean(0)?))
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}

/// `if c then a else b` over reals. Only the taken branch is evaluated
/// and charged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfElse;

impl Primitive for IfElse {
    fn name(&self) -> &str {
        "IfElse"
    }

    fn return_type(&self) -> ValueType {
        ValueType::Real
    }

    fn arg_types(&self) -> &[ValueType] {
        &IF_ELSE
    }

    fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
        if args.boolean(0)? {
            args.eval(1)
        } else {
            args.eval(2)
        }
    }

    fn boxed_clone(&self) -> Box<dyn Primitive> {
        Box::new(*self)
    }
}
