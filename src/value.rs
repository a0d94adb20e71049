//! Value types carried through expression trees.
//!
//! The value hierarchy is closed: real numbers, booleans and real vectors.
//! Two values of different kinds are never type compatible.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    /// Real number.
    Real,
    /// Boolean.
    Boolean,
    /// Vector of real numbers.
    Vector,
}

impl ValueType {
    /// Every value type.
    pub const ALL: [ValueType; 3] = [ValueType::Real, ValueType::Boolean, ValueType::Vector];
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Real => write!(f, "real"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Vector => write!(f, "vector"),
        }
    }
}

/// Relative magnitude of a real perturbation.
const PERTURBATION: f64 = 0.1;

/// A typed payload produced by executing a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Real number.
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Vector of real numbers.
    Vector(Vec<f64>),
}

impl Value {
    /// Type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Real(_) => ValueType::Real,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Vector(_) => ValueType::Vector,
        }
    }

    /// Default value of a type: `0.0`, `false` or the empty vector.
    #[must_use]
    pub fn default_for(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Real => Value::Real(0.0),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Vector => Value::Vector(Vec::new()),
        }
    }

    /// Draw a random value of a type. Reals are uniform in `[-1, 1)`.
    #[must_use]
    pub fn random(value_type: ValueType, rng: &mut dyn RngCore) -> Self {
        match value_type {
            ValueType::Real => Value::Real(rng.gen_range(-1.0..1.0)),
            ValueType::Boolean => Value::Boolean(rng.gen_bool(0.5)),
            ValueType::Vector => {
                let len = rng.gen_range(1..=4);
                Value::Vector((0..len).map(|_| rng.gen_range(-1.0..1.0)).collect())
            }
        }
    }

    /// Whether two values are of the same kind.
    #[must_use]
    pub fn same_type(&self, other: &Value) -> bool {
        self.value_type() == other.value_type()
    }

    /// Perturb the value in place.
    ///
    /// Reals move by up to ten percent of their magnitude (at least `0.1`),
    /// booleans flip, vectors perturb one component.
    pub fn mutate(&mut self, rng: &mut dyn RngCore) {
        match self {
            Value::Real(x) => *x = perturb(*x, rng),
            Value::Boolean(b) => *b = !*b,
            Value::Vector(v) => {
                if v.is_empty() {
                    v.push(rng.gen_range(-1.0..1.0));
                } else {
                    let i = rng.gen_range(0..v.len());
                    v[i] = perturb(v[i], rng);
                }
            }
        }
    }

    /// Truth value: positive reals, `true`, non-empty vectors.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Real(x) => *x > 0.0,
            Value::Boolean(b) => *b,
            Value::Vector(v) => !v.is_empty(),
        }
    }

    /// The real payload, if this is a real.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The vector payload, if this is a vector.
    #[must_use]
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

fn perturb(x: f64, rng: &mut dyn RngCore) -> f64 {
    let scale = (x.abs() * PERTURBATION).max(PERTURBATION);
    x + rng.gen_range(-scale..=scale)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_default_matches_type() {
        for t in ValueType::ALL {
            assert_eq!(Value::default_for(t).value_type(), t);
        }
    }

    #[test]
    fn test_different_kinds_never_compatible() {
        assert!(!Value::Real(1.0).same_type(&Value::Boolean(true)));
        assert!(!Value::Vector(vec![1.0]).same_type(&Value::Real(1.0)));
        assert!(Value::Real(1.0).same_type(&Value::Real(-3.0)));
    }

    #[test]
    fn test_mutate_keeps_type() {
        let mut rng = SmallRng::seed_from_u64(7);
        for t in ValueType::ALL {
            let mut value = Value::random(t, &mut rng);
            let before = value.clone();
            value.mutate(&mut rng);
            assert_eq!(value.value_type(), t);
            if t == ValueType::Boolean {
                assert_ne!(value, before);
            }
        }
    }

    #[test]
    fn test_real_perturbation_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut value = Value::Real(50.0);
            value.mutate(&mut rng);
            let x = value.as_real().unwrap();
            assert!((45.0..=55.0).contains(&x));
        }
    }

    #[test]
    fn test_truthy() {
        assert!(Value::Real(0.5).truthy());
        assert!(!Value::Real(0.0).truthy());
        assert!(!Value::Real(-1.0).truthy());
        assert!(Value::Boolean(true).truthy());
        assert!(!Value::Vector(Vec::new()).truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Vector(vec![1.0, 2.0]).to_string(), "[1 2]");
    }
}
