//! Real-valued arithmetic primitives.

use crate::error::ExecResult;
use crate::node::Primitive;
use crate::runtime::Args;
use crate::value::{Value, ValueType};

const REAL_ONE: [ValueType; 1] = [ValueType::Real];
const REAL_PAIR: [ValueType; 2] = [ValueType::Real, ValueType::Real];

/// Divisors closer to zero than this make [`ProtectedDivide`] return `1`.
const DIVISION_EPSILON: f64 = 1e-9;

macro_rules! real_binary {
    ($(#[$doc:meta])* $name:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Primitive for $name {
            fn name(&self) -> &str {
                stringify!($name)
            }

            fn return_type(&self) -> ValueType {
                ValueType::Real
            }

            fn arg_types(&self) -> &[ValueType] {
                &REAL_PAIR
            }

            fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
                let $a = args.real(0)?;
                let $b = args.real(1)?;
                Ok(Value::Real($body))
            }

            fn boxed_clone(&self) -> Box<dyn Primitive> {
                Box::new(*self)
            }
        }
    };
}

macro_rules! real_unary {
    ($(#[$doc:meta])* $name:ident, |$a:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Primitive for $name {
            fn name(&self) -> &str {
                stringify!($name)
            }

            fn return_type(&self) -> ValueType {
                ValueType::Real
            }

            fn arg_types(&self) -> &[ValueType] {
                &REAL_ONE
            }

            fn execute(&self, args: &mut Args<'_, '_>) -> ExecResult<Value> {
                let $a = args.real(0)?;
                Ok(Value::Real($body))
            }

            fn boxed_clone(&self) -> Box<dyn Primitive> {
                Box::new(*self)
            }
        }
    };
}

real_binary!(
    /// `a + b`
    Sum,
    |a, b| a + b
);
real_binary!(
    /// `a - b`
    Subtract,
    |a, b| a - b
);
real_binary!(
    /// `a * b`
    Multiply,
    |a, b| a * b
);
real_binary!(
    /// `a / b`, or `1` when `b` is (nearly) zero.
    ProtectedDivide,
    |a, b| if b.abs() < DIVISION_EPSILON { 1.0 } else { a / b }
);
real_binary!(
    /// Smaller of two reals.
    Minimum,
    |a, b| a.min(b)
);
real_binary!(
    /// Larger of two reals.
    Maximum,
    |a, b| a.max(b)
);
real_unary!(
    /// `-a`
    Negate,
    |a| -a
);
real_unary!(
    /// `sin(a)`
    Sine,
    |a| a.sin()
);
real_unary!(
    /// `cos(a)`
    Cosine,
    |a| a.cos()
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Constant, Node};
    use crate::runtime::evaluate_detached;
    use crate::tree::Tree;

    fn binary(node: impl Primitive + 'static, a: f64, b: f64) -> f64 {
        let tree = Tree::compose(
            Node::primitive(node),
            vec![
                Tree::leaf(Node::primitive(Constant::new(Value::Real(a)))).unwrap(),
                Tree::leaf(Node::primitive(Constant::new(Value::Real(b)))).unwrap(),
            ],
        )
        .unwrap();
        evaluate_detached(&tree).unwrap().value.as_real().unwrap()
    }

    #[test]
    fn test_binary_ops() {
        assert!((binary(Sum, 1.5, 2.0) - 3.5).abs() < 1e-12);
        assert!((binary(Subtract, 1.5, 2.0) + 0.5).abs() < 1e-12);
        assert!((binary(Multiply, 1.5, 2.0) - 3.0).abs() < 1e-12);
        assert!((binary(Minimum, 1.5, 2.0) - 1.5).abs() < 1e-12);
        assert!((binary(Maximum, 1.5, 2.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_protected_divide() {
        assert!((binary(ProtectedDivide, 3.0, 2.0) - 1.5).abs() < 1e-12);
        assert!((binary(ProtectedDivide, 3.0, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_binary_cost() {
        let tree = Tree::compose(
            Node::primitive(Sum),
            vec![
                Tree::leaf(Node::primitive(Constant::new(Value::Real(1.0)))).unwrap(),
                Tree::leaf(Node::primitive(Constant::new(Value::Real(2.0)))).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(evaluate_detached(&tree).unwrap().cost, 2);
    }
}
